//! Error taxonomy. `TopologyError` is logged-and-skipped by the reconciler
//! and admin handlers; `DialError` classifies backend-connect failures as
//! 502s; `MuxError` is what the demultiplexer's error stream yields;
//! `StartError` is returned by `Frontend::start`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
	#[error("malformed JSON at {key}: {source}")]
	Malformed {
		key: String,
		#[source]
		source: serde_json::Error,
	},
	#[error("backend {id} has an empty url")]
	EmptyBackendUrl { id: String },
	#[error("invalid TLS certificate for frontend {id}: {source}")]
	InvalidCert { id: String, source: anyhow::Error },
	#[error("invalid TLS key for frontend {id}: {source}")]
	InvalidKey { id: String, source: anyhow::Error },
	#[error("invalid base64 in {field} for frontend {id}: {source}")]
	InvalidBase64 {
		id: String,
		field: &'static str,
		source: base64::DecodeError,
	},
	#[error("unparseable key {key}")]
	UnparseableKey { key: String },
}

#[derive(Debug, Error)]
pub enum DialError {
	#[error("no backends configured")]
	Empty,
	#[error("connect to {addr} timed out after {timeout_ms}ms")]
	Timeout { addr: String, timeout_ms: u64 },
	#[error("connect to {addr} failed: {source}")]
	Refused {
		addr: String,
		#[source]
		source: std::io::Error,
	},
}

#[derive(Debug, Error)]
pub enum MuxError {
	#[error("no frontend registered for host {host:?}")]
	NotFound { host: Option<String> },
	#[error("malformed request: {0}")]
	BadRequest(String),
	#[error("listener closed")]
	Closed,
}

#[derive(Debug, Error)]
pub enum StartError {
	#[error("frontend is already running")]
	AlreadyRunning,
	#[error("hostname {0} already registered on this listener")]
	AlreadyRegistered(String),
}
