//! Mirrors the external key-value store into the in-memory [`Collection`]
//! and the two [`Server`]s: an initial hydration pass over the whole tree,
//! then a long-running watch loop applying add/update/delete events as
//! they arrive. Malformed entries are logged and skipped — nothing here
//! except a store-connection failure is fatal, and even that only
//! restarts the watch rather than the process.

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::application::Application;
use crate::collection::Collection;
use crate::errors::TopologyError;
use crate::frontend::Frontend;
use crate::kv::{KvStore, WatchEvent};
use crate::server::Server;
use crate::tls;
use crate::types::{AppId, Backend, BackendId, FrontendId};

#[derive(Deserialize)]
struct BackendPayload {
	url: String,
	#[serde(default)]
	connect_timeout: Option<u64>,
}

#[derive(Deserialize)]
struct FrontendPayload {
	hosts: Vec<String>,
	#[serde(default)]
	tls_crt: Option<String>,
	#[serde(default)]
	tls_key: Option<String>,
}

enum Key {
	App(AppId),
	Backend(AppId, BackendId),
	Frontend(AppId, FrontendId),
}

fn parse_key(root: &str, key: &str) -> Option<Key> {
	let rest = key.strip_prefix(root)?.trim_start_matches('/');
	let parts: Vec<&str> = rest.split('/').filter(|p| !p.is_empty()).collect();
	match parts.as_slice() {
		[app] => Some(Key::App(AppId::from(*app))),
		[app, "backends", id] => Some(Key::Backend(AppId::from(*app), BackendId::from(*id))),
		[app, "frontends", id] => Some(Key::Frontend(AppId::from(*app), FrontendId::from(*id))),
		_ => None,
	}
}

fn parse_backend(id: &BackendId, raw: &[u8]) -> Result<Backend, TopologyError> {
	let payload: BackendPayload = serde_json::from_slice(raw).map_err(|source| TopologyError::Malformed {
		key: id.to_string(),
		source,
	})?;
	if payload.url.is_empty() {
		return Err(TopologyError::EmptyBackendUrl { id: id.to_string() });
	}
	Ok(Backend::new(id.clone(), payload.url, payload.connect_timeout))
}

fn build_frontend(id: &FrontendId, raw: &[u8]) -> Result<Arc<Frontend>, TopologyError> {
	let payload: FrontendPayload = serde_json::from_slice(raw).map_err(|source| TopologyError::Malformed {
		key: id.to_string(),
		source,
	})?;
	let front = Arc::new(Frontend::new(id.clone()));
	let _ = front.set_hosts(payload.hosts);
	match (payload.tls_crt, payload.tls_key) {
		(Some(crt), Some(key)) if !crt.is_empty() && !key.is_empty() => {
			let compiled = tls::compile(id.as_str(), &crt, &key)?;
			let _ = front.set_tls(Some(compiled));
		}
		_ => {}
	}
	Ok(front)
}

pub struct Reconciler {
	kv: Arc<dyn KvStore>,
	root: String,
	collection: Collection,
	insecure: Arc<Server>,
	secure: Arc<Server>,
}

impl Reconciler {
	pub fn new(kv: Arc<dyn KvStore>, root: String, collection: Collection, insecure: Arc<Server>, secure: Arc<Server>) -> Self {
		Reconciler {
			kv,
			root,
			collection,
			insecure,
			secure,
		}
	}

	/// Reads the whole tree once and installs every well-formed application,
	/// backend and frontend. Every secure frontend is registered on both
	/// servers (it is redirected on the insecure one); every frontend,
	/// secure or not, is registered on the insecure server.
	#[instrument(skip(self))]
	pub async fn hydrate(&self) -> anyhow::Result<()> {
		let prefix = format!("{}/", self.root.trim_end_matches('/'));
		let entries = self.kv.get_tree(&prefix).await?;

		let mut pending_backends: std::collections::HashMap<AppId, Vec<(BackendId, Vec<u8>)>> = Default::default();
		let mut pending_frontends: std::collections::HashMap<AppId, Vec<(FrontendId, Vec<u8>)>> = Default::default();
		let mut apps: std::collections::HashSet<AppId> = Default::default();

		for (key, value) in entries {
			match parse_key(&self.root, &key) {
				Some(Key::App(app)) => {
					apps.insert(app);
				}
				Some(Key::Backend(app, id)) => {
					pending_backends.entry(app).or_default().push((id, value.to_vec()));
				}
				Some(Key::Frontend(app, id)) => {
					pending_frontends.entry(app).or_default().push((id, value.to_vec()));
				}
				None => warn!(%key, "unparseable key during hydration, skipping"),
			}
		}

		for app_id in pending_backends.keys().chain(pending_frontends.keys()) {
			apps.insert(app_id.clone());
		}

		for app_id in apps {
			let app = Arc::new(Application::new(app_id.clone()));
			for (id, raw) in pending_backends.remove(&app_id).unwrap_or_default() {
				match parse_backend(&id, &raw) {
					Ok(backend) => {
						app.upsert_backend(backend);
						self.collection.note_backend(&app_id, id);
					}
					Err(e) => warn!(error = %e, "skipping malformed backend during hydration"),
				}
			}
			self.collection.insert_application(app.clone());
			for (id, raw) in pending_frontends.remove(&app_id).unwrap_or_default() {
				match build_frontend(&id, &raw) {
					Ok(front) => self.install_frontend(&app_id, front).await,
					Err(e) => warn!(error = %e, "skipping malformed frontend during hydration"),
				}
			}
		}
		info!("hydration complete");
		Ok(())
	}

	/// Subscribes to the watch prefix and applies events serially until the
	/// stream ends, at which point the caller should reconnect.
	#[instrument(skip(self))]
	pub async fn run_watch(&self) -> anyhow::Result<()> {
		let prefix = format!("{}/", self.root.trim_end_matches('/'));
		let mut stream = self.kv.watch(&prefix).await?;
		while let Some(event) = stream.next().await {
			self.apply(event).await;
		}
		warn!("watch stream ended, caller should reconnect");
		Ok(())
	}

	async fn apply(&self, event: WatchEvent) {
		match event {
			WatchEvent::Delete { key } => self.apply_delete(&key).await,
			WatchEvent::Set { key, value } => self.apply_set(&key, &value).await,
		}
	}

	async fn apply_delete(&self, key: &str) {
		match parse_key(&self.root, key) {
			Some(Key::App(app_id)) => {
				if let Some(app) = self.collection.remove_application(&app_id) {
					for front in app.frontends() {
						self.secure.remove_frontend(&front.id).await;
						self.insecure.remove_frontend(&front.id).await;
					}
				}
			}
			Some(Key::Backend(app_id, id)) => {
				if let Some(app) = self.collection.application(&app_id) {
					app.remove_backend(&id);
				}
				self.collection.forget_backend(&id);
			}
			Some(Key::Frontend(app_id, id)) => {
				self.secure.remove_frontend(&id).await;
				self.insecure.remove_frontend(&id).await;
				self.collection.unregister_frontend(&app_id, &id);
			}
			None => warn!(%key, "unparseable key in delete event, skipping"),
		}
	}

	async fn apply_set(&self, key: &str, value: &[u8]) {
		match parse_key(&self.root, key) {
			Some(Key::App(app_id)) => {
				if self.collection.application(&app_id).is_none() {
					self.collection.insert_application(Arc::new(Application::new(app_id)));
				}
			}
			Some(Key::Backend(app_id, id)) => {
				let Some(app) = self.collection.application(&app_id) else {
					warn!(%app_id, "backend update for unknown application, skipping");
					return;
				};
				match parse_backend(&id, value) {
					Ok(backend) => {
						app.upsert_backend(backend);
						self.collection.note_backend(&app_id, id);
					}
					Err(e) => warn!(error = %e, "skipping malformed backend update"),
				}
			}
			Some(Key::Frontend(app_id, id)) => {
				match build_frontend(&id, value) {
					Ok(front) => self.install_frontend(&app_id, front).await,
					Err(e) => warn!(error = %e, "skipping malformed frontend update"),
				}
			}
			None => warn!(%key, "unparseable key in set event, skipping"),
		}
	}

	/// Registers `front` on the insecure server (always) and the secure
	/// server (iff it carries TLS material), then records it in the
	/// collection under `app_id`. `Server::add_frontend` itself provides the
	/// take-over-before-teardown ordering a live reconfigure needs.
	async fn install_frontend(&self, app_id: &AppId, front: Arc<Frontend>) {
		self.collection.register_frontend(app_id, front.clone());
		if front.is_secure() {
			if let Err(e) = self.secure.add_frontend(front.clone()).await {
				warn!(frontend = %front.id, error = %e, "failed to start frontend on secure server");
			}
		}
		if let Err(e) = self.insecure.add_frontend(front).await {
			warn!(error = %e, "failed to start frontend on insecure server");
		}
	}
}
