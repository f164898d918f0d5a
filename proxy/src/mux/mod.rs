//! The virtual-host demultiplexer. One [`Muxer`] sits in front of each bound
//! TCP listener (plaintext, TLS) and fans connections out to a per-hostname
//! [`SubListener`] based on a non-destructive peek at the first bytes of the
//! stream — `TcpStream::peek` never removes bytes from the kernel receive
//! buffer, so whichever component ultimately owns the connection (the
//! frontend's splice routine) still sees the handshake/request line from
//! byte 0, satisfying the "rewind" requirement without any buffering of our
//! own.

mod http;
mod tls;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::errors::{MuxError, StartError};

/// How long to wait for enough bytes to classify a connection before giving
/// up with `BadRequest`. Matches spec.md's 10 second mux timeout.
pub const MUX_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MuxKind {
	Http,
	Tls,
}

/// A single unroutable-connection event, delivered to the owning `Server`'s
/// error-drain task. `Closed` has no stream attached: it signals that the
/// bound listener itself has shut down and the drain task should exit.
pub enum MuxEvent {
	NotFound { stream: TcpStream, host: Option<String> },
	BadRequest { stream: TcpStream },
	Closed,
}

/// A per-hostname accept queue. FIFO per hostname; `Muxer::dispatch_loop`
/// is the sole producer.
pub struct SubListener {
	rx: mpsc::Receiver<TcpStream>,
}

impl SubListener {
	pub async fn accept(&mut self) -> Option<TcpStream> {
		self.rx.recv().await
	}
}

struct Registration {
	owner: u64,
	tx: mpsc::Sender<TcpStream>,
}

struct Registry {
	by_host: HashMap<String, Registration>,
}

/// Identifies the specific `Frontend` instance that holds a hostname
/// registration. Two `Frontend` objects can share the same `FrontendId`
/// across a live replace, so the registry discriminates by this token
/// (assigned once per instance) rather than by the logical id.
pub type OwnerToken = u64;

/// Owns the hostname registry for one bound listener and the task that
/// reads raw connections off the socket and classifies them.
pub struct Muxer {
	kind: MuxKind,
	registry: Mutex<Registry>,
	err_tx: mpsc::Sender<MuxEvent>,
}

impl Muxer {
	pub fn new(kind: MuxKind) -> (Self, mpsc::Receiver<MuxEvent>) {
		let (err_tx, err_rx) = mpsc::channel(64);
		(
			Muxer {
				kind,
				registry: Mutex::new(Registry { by_host: HashMap::new() }),
				err_tx,
			},
			err_rx,
		)
	}

	/// Registers `hostname` (case-insensitive, stored lower-case) for
	/// `owner` and returns its accept queue. Fails if another owner already
	/// holds the hostname.
	pub fn listen(&self, hostname: &str, owner: OwnerToken) -> Result<SubListener, StartError> {
		self.listen_replacing(hostname, owner, None)
	}

	/// Registers `hostname` for `owner`, atomically taking over the slot if
	/// it is currently held by `predecessor`. Fails with `AlreadyRegistered`
	/// if the hostname is held by anyone other than `predecessor`. This is
	/// the primitive a live frontend swap needs: the new owner claims the
	/// hostname in the same critical section that checks who held it, so
	/// there is no window where the hostname is unregistered and incoming
	/// connections would be misrouted to `NotFound`.
	pub fn listen_replacing(&self, hostname: &str, owner: OwnerToken, predecessor: Option<OwnerToken>) -> Result<SubListener, StartError> {
		let key = hostname.to_ascii_lowercase();
		let mut reg = self.registry.lock().unwrap();
		if let Some(existing) = reg.by_host.get(&key) {
			if Some(existing.owner) != predecessor {
				return Err(StartError::AlreadyRegistered(key));
			}
		}
		let (tx, rx) = mpsc::channel(16);
		reg.by_host.insert(key, Registration { owner, tx });
		Ok(SubListener { rx })
	}

	/// Deregisters `hostname`, but only if `owner` is still the current
	/// registrant. A no-op otherwise — this is what makes a takeover race
	/// safe: a predecessor that has already been superseded by a new owner
	/// must not rip out that owner's registration when it unwinds.
	pub fn unlisten(&self, hostname: &str, owner: OwnerToken) {
		let key = hostname.to_ascii_lowercase();
		let mut reg = self.registry.lock().unwrap();
		if let std::collections::hash_map::Entry::Occupied(entry) = reg.by_host.entry(key) {
			if entry.get().owner == owner {
				entry.remove();
			}
		}
	}

	/// Accepts connections off `listener` until it is closed, classifying
	/// each one and routing it to its sub-listener or the error stream.
	#[instrument(skip_all, fields(kind = ?self.kind))]
	pub async fn dispatch_loop(self: std::sync::Arc<Self>, listener: TcpListener) {
		loop {
			let stream = match listener.accept().await {
				Ok((stream, _addr)) => stream,
				Err(e) => {
					debug!(error = %e, "mux accept loop exiting");
					break;
				}
			};
			let this = self.clone();
			tokio::spawn(async move { this.classify_and_route(stream).await });
		}
		let _ = self.err_tx.send(MuxEvent::Closed).await;
	}

	async fn classify_and_route(&self, stream: TcpStream) {
		let classified = match self.kind {
			MuxKind::Http => http::extract_host(&stream, MUX_TIMEOUT).await,
			MuxKind::Tls => tls::extract_sni(&stream, MUX_TIMEOUT).await,
		};
		match classified {
			Ok(host) => {
				let key = host.to_ascii_lowercase();
				let sender = self.registry.lock().unwrap().by_host.get(&key).map(|r| r.tx.clone());
				match sender {
					Some(tx) => {
						if tx.send(stream).await.is_err() {
							warn!(host = %key, "sub-listener dropped while routing connection");
						}
					}
					None => {
						let _ = self
							.err_tx
							.send(MuxEvent::NotFound {
								stream,
								host: Some(host),
							})
							.await;
					}
				}
			}
			Err(MuxError::NotFound { host }) => {
				let _ = self.err_tx.send(MuxEvent::NotFound { stream, host }).await;
			}
			Err(MuxError::BadRequest(reason)) => {
				debug!(%reason, "rejecting malformed connection");
				let _ = self.err_tx.send(MuxEvent::BadRequest { stream }).await;
			}
			Err(MuxError::Closed) => {}
		}
	}
}
