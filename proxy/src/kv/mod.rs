//! The key-value store abstraction the reconciler depends on. No concrete
//! production backend (etcd, Consul, ...) is wired in — the topology layout
//! of spec.md §6 is the only contract the reconciler needs, and which
//! strongly-consistent store backs it is explicitly out of scope. This
//! trait is the seam; [`memory::MemoryStore`] is the one implementation
//! shipped, and it is what both the tests and the default CLI wiring use.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

#[derive(Clone, Debug)]
pub enum WatchEvent {
	Set { key: String, value: Bytes },
	Delete { key: String },
}

#[async_trait]
pub trait KvStore: Send + Sync {
	/// Returns every key under `prefix` at the time of the call, for startup hydration.
	async fn get_tree(&self, prefix: &str) -> anyhow::Result<Vec<(String, Bytes)>>;

	/// A live stream of subsequent changes under `prefix`, starting from the
	/// moment of subscription. The reconciler processes events serially and
	/// restarts the watch only if the stream ends (the store connection closed).
	async fn watch(&self, prefix: &str) -> anyhow::Result<BoxStream<'static, WatchEvent>>;

	async fn put(&self, key: &str, value: Bytes) -> anyhow::Result<()>;

	async fn delete(&self, key: &str) -> anyhow::Result<()>;
}
