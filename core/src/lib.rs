//! Process-wide ambient utilities shared by the gateway binary and the
//! `gwproxy` domain crate: graceful drain, signal handling, readiness
//! tracking, telemetry bootstrap and the fatal-error taxonomy.

pub mod drain;
pub mod error;
pub mod readiness;
pub mod signal;
pub mod telemetry;
