//! The connection-multiplexing and dynamic-reconfiguration engine: backend
//! descriptors, the round-robin strategy, frontends and their accept loops,
//! the HTTP/TLS demultiplexer, servers, the in-memory topology, and the
//! reconciler that mirrors an external key-value store into it.

pub mod admin;
pub mod application;
pub mod collection;
pub mod conn;
pub mod errors;
pub mod frontend;
pub mod kv;
pub mod metrics;
pub mod mux;
pub mod reconciler;
pub mod server;
pub mod strategy;
pub mod tls;
pub mod types;
