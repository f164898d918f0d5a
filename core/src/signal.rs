//! OS signal handling: SIGTERM/SIGINT trigger a graceful shutdown; a second
//! Ctrl+C forces an immediate exit.
//!
//! Originally derived from https://github.com/istio/ztunnel (Apache 2.0 licensed)

/// Resolves once the process has received a shutdown signal.
pub struct Shutdown;

impl Shutdown {
	pub fn new() -> Self {
		Shutdown
	}

	/// Waits for SIGTERM/SIGINT (ctrl-c on non-unix targets).
	pub async fn wait(self) {
		imp::shutdown().await
	}
}

impl Default for Shutdown {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(unix)]
mod imp {
	use std::process;

	use tokio::signal::unix::{SignalKind, signal};
	use tracing::info;

	pub(super) async fn shutdown() {
		tokio::select! {
			_ = watch_signal(SignalKind::interrupt(), "SIGINT") => {
				tokio::spawn(async move {
					watch_signal(SignalKind::interrupt(), "SIGINT").await;
					info!("second SIGINT received, exiting immediately");
					process::exit(0);
				});
			}
			_ = watch_signal(SignalKind::terminate(), "SIGTERM") => {}
		};
	}

	async fn watch_signal(kind: SignalKind, name: &'static str) {
		signal(kind)
			.expect("failed to register signal handler")
			.recv()
			.await;
		info!("received {}, starting graceful shutdown", name);
	}
}

#[cfg(not(unix))]
mod imp {
	use tracing::info;

	pub(super) async fn shutdown() {
		tokio::signal::windows::ctrl_c()
			.expect("failed to register signal handler")
			.recv()
			.await;
		info!("received ctrl-c, starting graceful shutdown");
	}
}
