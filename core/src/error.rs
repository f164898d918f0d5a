//! The only error type allowed to escape to the process entry point.
//!
//! Everything else in the gateway (malformed key-value entries, transient
//! dial failures, unroutable connections) is classified, logged and
//! swallowed where it occurs. `Error` covers what spec.md calls
//! `ConfigError`: failures that make the process unable to start at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("failed to read config file {path}: {source}")]
	ReadConfig {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse config file {path}: {source}")]
	ParseConfig {
		path: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("failed to read error page {path}: {source}")]
	ReadErrorPage {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to bind {addr}: {source}")]
	Bind {
		addr: String,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid address {addr}: {source}")]
	InvalidAddr {
		addr: String,
		#[source]
		source: std::net::AddrParseError,
	},

	#[error("failed to hydrate topology from key-value store: {0}")]
	Hydrate(#[source] anyhow::Error),
}
