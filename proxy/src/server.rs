//! A `Server` owns exactly one bound TCP listener and one demultiplexer
//! (HTTP or TLS), the set of frontends registered on it, and the
//! error-drain task that classifies unroutable connections. Two instances
//! exist per process — secure and insecure — sharing nothing but the
//! `Collection` they both read from.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;
use tracing::{Instrument, debug, info, instrument};

use crate::conn::write_http_1_0_response;
use crate::frontend::Frontend;
use crate::metrics::Metrics;
use crate::mux::{MuxEvent, MuxKind, Muxer};
use crate::types::FrontendId;
use gwcore::drain::DrainWatcher;

/// The state a `Frontend` consults through its weak back-reference: whether
/// this server terminates TLS, and the configured error pages.
pub struct ServerShared {
	pub secure: bool,
	pub error_page_502: Option<Arc<str>>,
	pub error_page_503: Option<Arc<str>>,
	pub muxer: Arc<Muxer>,
	pub metrics: Arc<Metrics>,
}

pub struct Server {
	shared: Arc<ServerShared>,
	listen_addr: SocketAddr,
	frontends: Mutex<HashMap<FrontendId, Arc<Frontend>>>,
}

impl Server {
	pub fn new(listen_addr: SocketAddr, secure: bool, error_page_502: Option<Arc<str>>, error_page_503: Option<Arc<str>>, metrics: Arc<Metrics>) -> (Self, tokio::sync::mpsc::Receiver<MuxEvent>) {
		let kind = if secure { MuxKind::Tls } else { MuxKind::Http };
		let (muxer, err_rx) = Muxer::new(kind);
		let shared = Arc::new(ServerShared {
			secure,
			error_page_502,
			error_page_503,
			muxer: Arc::new(muxer),
			metrics,
		});
		(
			Server {
				shared,
				listen_addr,
				frontends: Mutex::new(HashMap::new()),
			},
			err_rx,
		)
	}

	pub fn is_secure(&self) -> bool {
		self.shared.secure
	}

	pub fn shared(&self) -> &Arc<ServerShared> {
		&self.shared
	}

	/// Registers and starts `frontend`. If a frontend with the same id is
	/// already registered, the new instance takes over that id's hostnames
	/// in the same `listen_replacing` call that registers them — so every
	/// hostname the predecessor held stays continuously routable, not just
	/// the ones the predecessor doesn't share with the replacement — and
	/// only then is the predecessor stopped. This is the registration
	/// barrier spec.md's tie-break calls for (see DESIGN.md).
	#[instrument(skip_all, fields(server = %self.log_name(), frontend = %frontend.id))]
	pub async fn add_frontend(&self, frontend: Arc<Frontend>) -> Result<(), crate::errors::StartError> {
		let predecessor = self.frontends.lock().unwrap().get(&frontend.id).cloned();
		frontend.start(&self.shared, predecessor.as_ref().map(|f| f.token()))?;
		self.frontends.lock().unwrap().insert(frontend.id.clone(), frontend);
		if let Some(previous) = predecessor {
			previous.stop().await;
		}
		Ok(())
	}

	/// Stops and deregisters `id`, if present.
	pub async fn remove_frontend(&self, id: &FrontendId) {
		let removed = self.frontends.lock().unwrap().remove(id);
		if let Some(front) = removed {
			front.stop().await;
		}
	}

	pub fn frontend(&self, id: &FrontendId) -> Option<Arc<Frontend>> {
		self.frontends.lock().unwrap().get(id).cloned()
	}

	fn log_name(&self) -> &'static str {
		if self.shared.secure { "secure" } else { "insecure" }
	}

	/// Binds the listener, starts every already-registered frontend, spawns
	/// the muxer dispatch loop and the error-drain task, and runs until
	/// `drain` is signaled — at which point every frontend is stopped
	/// before this function returns, satisfying "listenAndServe never
	/// returns while any installed frontend is running".
	pub async fn listen_and_serve(self: Arc<Self>, mut err_rx: tokio::sync::mpsc::Receiver<MuxEvent>, drain: DrainWatcher) -> std::io::Result<()> {
		let listener = TcpListener::bind(self.listen_addr).await?;
		info!(server = %self.log_name(), addr = %self.listen_addr, "listening");

		let dispatch = {
			let muxer = self.shared.muxer.clone();
			tokio::spawn(async move { muxer.dispatch_loop(listener).await })
		};

		let error_drain = {
			let shared = self.shared.clone();
			let name = self.log_name();
			tokio::spawn(
				async move {
					while let Some(event) = err_rx.recv().await {
						match event {
							MuxEvent::NotFound { mut stream, host } => {
								debug!(server = name, host = ?host, "unrouted host, responding 503");
								if let Some(page) = &shared.error_page_503 {
									let _ = write_http_1_0_response(&mut stream, "503 Service Unavailable", &[], Some(page)).await;
								}
							}
							MuxEvent::BadRequest { .. } => {
								debug!(server = name, "closing malformed connection");
							}
							MuxEvent::Closed => {
								debug!(server = name, "mux closed, error drain exiting");
								break;
							}
						}
					}
				}
				.in_current_span(),
			)
		};

		let release = drain.wait_for_drain().await;
		info!(server = %self.log_name(), "draining, stopping all frontends");
		let frontends: Vec<_> = self.frontends.lock().unwrap().values().cloned().collect();
		for front in frontends {
			front.stop().await;
		}
		drop(release);
		dispatch.abort();
		error_drain.abort();
		Ok(())
	}
}

impl std::fmt::Debug for Server {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Server").field("secure", &self.shared.secure).field("listen_addr", &self.listen_addr).finish()
	}
}
