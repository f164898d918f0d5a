//! Process bootstrap telemetry: a structured `tracing` subscriber writing
//! to stderr, and the process start time used by readiness/liveness logs.

use std::time::Instant;

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

pub static APPLICATION_START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Installs the global tracing subscriber. Call once, at the very top of `main`.
pub fn init_logging() {
	Lazy::force(&APPLICATION_START_TIME);
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(false)
		.init();
}
