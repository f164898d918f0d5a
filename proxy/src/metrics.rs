//! Connection-level counters, the only observability this proxy ships
//! beyond structured logs (Layer-7 tracing/APM is a Non-goal). Grounded on
//! the teacher's `Deferred`/`Recorder` pattern, trimmed to the handful of
//! gauges/counters a liveness dashboard actually needs.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Creates a gateway-prefixed sub-registry, mirroring the teacher's
/// `sub_registry` helper.
pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("vhost_gateway")
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FrontendLabel {
	pub frontend: String,
}

pub struct Metrics {
	registry: Registry,
	accepted: Family<FrontendLabel, Counter>,
	dialed: Family<FrontendLabel, Counter>,
	dial_failed: Family<FrontendLabel, Counter>,
	active_splices: Family<FrontendLabel, Gauge>,
}

impl Metrics {
	pub fn new() -> Arc<Self> {
		let mut registry = Registry::default();
		let accepted = Family::default();
		let dialed = Family::default();
		let dial_failed = Family::default();
		let active_splices = Family::default();
		{
			let sub = sub_registry(&mut registry);
			sub.register("connections_accepted", "connections accepted by a frontend", accepted.clone());
			sub.register("backend_dials", "backend connect attempts", dialed.clone());
			sub.register("backend_dial_failures", "backend connect failures", dial_failed.clone());
			sub.register("active_splices", "currently spliced connections", active_splices.clone());
		}
		Arc::new(Metrics {
			registry,
			accepted,
			dialed,
			dial_failed,
			active_splices,
		})
	}

	pub fn record_accept(&self, frontend: &str) {
		self.accepted.get_or_create(&FrontendLabel { frontend: frontend.to_string() }).inc();
	}

	pub fn record_dial(&self, frontend: &str) {
		self.dialed.get_or_create(&FrontendLabel { frontend: frontend.to_string() }).inc();
	}

	pub fn record_dial_failure(&self, frontend: &str) {
		self.dial_failed.get_or_create(&FrontendLabel { frontend: frontend.to_string() }).inc();
	}

	pub fn splice_started(&self, frontend: &str) {
		self.active_splices.get_or_create(&FrontendLabel { frontend: frontend.to_string() }).inc();
	}

	pub fn splice_ended(&self, frontend: &str) {
		self.active_splices.get_or_create(&FrontendLabel { frontend: frontend.to_string() }).dec();
	}

	fn encode(&self) -> String {
		let mut buffer = String::new();
		let _ = prometheus_client::encoding::text::encode(&mut buffer, &self.registry);
		buffer
	}
}

pub async fn handler(State(state): State<crate::admin::AdminState>) -> Result<String, StatusCode> {
	Ok(state.metrics.encode())
}
