//! A named virtual-host endpoint: a set of hostnames, optional TLS material,
//! a backend [`Strategy`], and the per-host accept loops that make up its
//! running state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::conn::{Conn, write_http_1_0_response};
use crate::errors::{DialError, StartError};
use crate::mux::{OwnerToken, SubListener};
use crate::server::ServerShared;
use crate::strategy::Strategy;
use crate::tls::TlsConfig;
use crate::types::{Backend, BackendId, FrontendId};
use gwcore::drain::{self, DrainTrigger, DrainWatcher};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrontendState {
	Stopped,
	Running,
	Stopping,
}

struct RunningState {
	server: Weak<ServerShared>,
	stop_tx: watch::Sender<()>,
	drain_trigger: DrainTrigger,
}

/// `FrontendId`s are reused across a live replace (the reconciler/admin API
/// build a fresh `Frontend` with the same id and hand it to
/// `Server::add_frontend`), so the mux registry can't use the id to tell a
/// predecessor and its successor apart. Each instance gets its own token.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

pub struct Frontend {
	pub id: FrontendId,
	token: OwnerToken,
	hosts: Mutex<Vec<String>>,
	tls: Mutex<Option<TlsConfig>>,
	strategy: Strategy,
	state: Mutex<FrontendState>,
	running: Mutex<Option<RunningState>>,
}

impl Frontend {
	pub fn new(id: impl Into<FrontendId>) -> Self {
		Frontend {
			id: id.into(),
			token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
			hosts: Mutex::new(Vec::new()),
			tls: Mutex::new(None),
			strategy: Strategy::round_robin(),
			state: Mutex::new(FrontendState::Stopped),
			running: Mutex::new(None),
		}
	}

	pub fn state(&self) -> FrontendState {
		*self.state.lock().unwrap()
	}

	pub(crate) fn token(&self) -> OwnerToken {
		self.token
	}

	pub fn is_secure(&self) -> bool {
		self.tls.lock().unwrap().is_some()
	}

	pub fn hosts(&self) -> Vec<String> {
		self.hosts.lock().unwrap().clone()
	}

	/// Only valid while `Stopped`.
	pub fn set_hosts(&self, hosts: Vec<String>) -> Result<(), StartError> {
		if self.state() != FrontendState::Stopped {
			return Err(StartError::AlreadyRunning);
		}
		*self.hosts.lock().unwrap() = hosts.into_iter().map(|h| h.to_ascii_lowercase()).collect();
		Ok(())
	}

	/// Only valid while `Stopped`.
	pub fn set_tls(&self, tls: Option<TlsConfig>) -> Result<(), StartError> {
		if self.state() != FrontendState::Stopped {
			return Err(StartError::AlreadyRunning);
		}
		*self.tls.lock().unwrap() = tls;
		Ok(())
	}

	pub fn add_backend(&self, backend: Backend) {
		self.strategy.add(backend);
	}

	pub fn delete_backend(&self, id: &BackendId) -> bool {
		self.strategy.delete(id)
	}

	pub fn set_backends(&self, backends: Vec<Backend>) {
		self.strategy.replace(backends);
	}

	pub fn upsert_backend(&self, backend: Backend) {
		self.strategy.upsert(backend);
    }

	/// Registers a per-host sub-listener on `server`'s muxer for every
	/// configured hostname and spawns one accept loop per host. Fails with
	/// `AlreadyRunning` unless currently `Stopped`.
	///
	/// `predecessor` is the token of the `Frontend` instance this one is
	/// replacing, if any (same `FrontendId`, different object): passing it
	/// lets a hostname already held by that instance be taken over
	/// atomically instead of requiring it to `unlisten` first, which is
	/// what makes a live swap drop-free (see `Server::add_frontend`).
	#[instrument(skip_all, fields(frontend = %self.id))]
	pub fn start(self: &Arc<Self>, server: &Arc<ServerShared>, predecessor: Option<OwnerToken>) -> Result<(), StartError> {
		let mut state = self.state.lock().unwrap();
		if *state != FrontendState::Stopped {
			return Err(StartError::AlreadyRunning);
		}
		let hosts = self.hosts.lock().unwrap().clone();
		let mut subs = Vec::with_capacity(hosts.len());
		for host in &hosts {
			match server.muxer.listen_replacing(host, self.token, predecessor) {
				Ok(sub) => subs.push((host.clone(), sub)),
				Err(e) => {
					// Roll back any hosts already registered before failing.
					for (h, _) in &subs {
						server.muxer.unlisten(h, self.token);
					}
					return Err(e);
				}
			}
		}

		let (stop_tx, stop_rx) = watch::channel(());
		let (drain_trigger, drain_watcher) = drain::new();

		for (host, sub) in subs {
			let front = self.clone();
			let server_weak = Arc::downgrade(server);
			let stop_rx = stop_rx.clone();
			let drain_watcher = drain_watcher.clone();
			tokio::spawn(
				async move {
					accept_loop(front, server_weak, host, sub, stop_rx, drain_watcher).await;
				}
				.in_current_span(),
			);
		}

		*self.running.lock().unwrap() = Some(RunningState {
			server: Arc::downgrade(server),
			stop_tx,
			drain_trigger,
		});
		*state = FrontendState::Running;
		info!(frontend = %self.id, hosts = ?self.hosts.lock().unwrap(), "frontend started");
		Ok(())
	}

	/// Idempotent: stopping an already-stopped or already-stopping frontend
	/// is a no-op. Transitions `running -> stopping`, closes the stop
	/// signal and every per-host sub-listener (unblocking any pending
	/// accept), then waits for every accept loop and in-flight splice to
	/// finish before transitioning to `stopped`.
	#[instrument(skip_all, fields(frontend = %self.id))]
	pub async fn stop(self: &Arc<Self>) {
		let running = {
			let mut state = self.state.lock().unwrap();
			if *state != FrontendState::Running {
				debug!(frontend = %self.id, state = ?*state, "stop() is a no-op in this state");
				return;
			}
			*state = FrontendState::Stopping;
			self.running.lock().unwrap().take()
		};
		let Some(running) = running else { return };

		let _ = running.stop_tx.send(());
		if let Some(server) = running.server.upgrade() {
			for host in self.hosts.lock().unwrap().iter() {
				// A no-op if a successor has already taken this hostname over.
				server.muxer.unlisten(host, self.token);
			}
		}

		running.drain_trigger.start_drain_and_wait(drain::DrainMode::Graceful).await;

		*self.state.lock().unwrap() = FrontendState::Stopped;
		info!(frontend = %self.id, "frontend stopped");
	}

	/// The splice routine: HTTPS-upgrade redirect, optional TLS handshake,
	/// backend selection, dial, and bidirectional copy.
	async fn proxy_connection(self: Arc<Self>, server: Arc<ServerShared>, host: String, stream: TcpStream, _drain: DrainWatcher) {
		if self.is_secure() && !server.secure {
			let mut stream = stream;
			let _ = write_http_1_0_response(
				&mut stream,
				"301 Moved Permanently",
				&[("Location", &format!("https://{host}/"))],
				None,
			)
			.await;
			return;
		}

		let mut conn = if self.is_secure() && server.secure {
			let tls_cfg = { self.tls.lock().unwrap().clone() };
			let Some(tls_cfg) = tls_cfg else { return };
			let acceptor = tokio_rustls::TlsAcceptor::from(tls_cfg.config);
			match acceptor.accept(stream).await {
				Ok(tls) => Conn::Tls(Box::new(tls)),
				Err(e) => {
					warn!(frontend = %self.id, error = %e, "TLS handshake failed");
					return;
				}
			}
		} else {
			Conn::Plain(stream)
		};

		let backend = match self.strategy.next() {
			Some(b) => b,
			None => {
				let err = DialError::Empty;
				debug!(frontend = %self.id, error = %err, "no backend available");
				if let Some(page) = &server.error_page_502 {
					let _ = write_http_1_0_response(&mut conn, "502 Bad Gateway", &[], Some(page)).await;
				}
				return;
			}
		};

		server.metrics.record_dial(self.id.as_str());
		let dial = timeout(Duration::from_millis(backend.connect_timeout_ms), TcpStream::connect(&backend.address)).await;
		let upstream = match dial {
			Ok(Ok(s)) => s,
			Ok(Err(source)) => {
				let err = DialError::Refused { addr: backend.address.clone(), source };
				debug!(frontend = %self.id, backend = %backend.id, error = %err, "backend dial failed");
				server.metrics.record_dial_failure(self.id.as_str());
				if let Some(page) = &server.error_page_502 {
					// The source contract responds with a literal HTTP/1.0 200 status
					// carrying the 502 page body; see DESIGN.md for why this crate
					// instead emits a proper 502 status.
					let _ = write_http_1_0_response(&mut conn, "502 Bad Gateway", &[], Some(page)).await;
				}
				return;
			}
			Err(_) => {
				let err = DialError::Timeout { addr: backend.address.clone(), timeout_ms: backend.connect_timeout_ms };
				debug!(frontend = %self.id, backend = %backend.id, error = %err, "backend dial timed out");
				server.metrics.record_dial_failure(self.id.as_str());
				if let Some(page) = &server.error_page_502 {
					let _ = write_http_1_0_response(&mut conn, "502 Bad Gateway", &[], Some(page)).await;
				}
				return;
			}
		};

		let mut upstream = upstream;
		server.metrics.splice_started(self.id.as_str());
		let result = tokio::io::copy_bidirectional(&mut conn, &mut upstream).await;
		server.metrics.splice_ended(self.id.as_str());
		match result {
			Ok((from_client, from_backend)) => {
				debug!(frontend = %self.id, backend = %backend.id, from_client, from_backend, "splice closed");
			}
			Err(e) => {
				debug!(frontend = %self.id, backend = %backend.id, error = %e, "splice ended with error");
			}
		}
	}
}

async fn accept_loop(
	front: Arc<Frontend>,
	server: Weak<ServerShared>,
	host: String,
	mut sub: SubListener,
	mut stop_rx: watch::Receiver<()>,
	drain: DrainWatcher,
) {
	loop {
		tokio::select! {
			_ = stop_rx.changed() => {
				debug!(frontend = %front.id, %host, "accept loop observed stop signal");
				break;
			}
			maybe_stream = sub.accept() => {
				let Some(stream) = maybe_stream else {
					debug!(frontend = %front.id, %host, "sub-listener closed");
					break;
				};
				if front.state() == FrontendState::Stopping {
					drop(stream);
					break;
				}
				let Some(server) = server.upgrade() else { break };
				server.metrics.record_accept(front.id.as_str());
				let front2 = front.clone();
				let drain2 = drain.clone();
				let host2 = host.clone();
				tokio::spawn(async move {
					front2.proxy_connection(server, host2, stream, drain2).await;
				}.in_current_span());
			}
		}
	}
}
