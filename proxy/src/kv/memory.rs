//! An in-process `KvStore` backed by a sorted map and a broadcast channel.
//! Primary and only implementation shipped; see `kv::mod` for why.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;

use super::{KvStore, WatchEvent};

pub struct MemoryStore {
	data: RwLock<BTreeMap<String, Bytes>>,
	tx: broadcast::Sender<WatchEvent>,
}

impl MemoryStore {
	pub fn new() -> Arc<Self> {
		let (tx, _) = broadcast::channel(1024);
		Arc::new(MemoryStore {
			data: RwLock::new(BTreeMap::new()),
			tx,
		})
	}
}

#[async_trait]
impl KvStore for MemoryStore {
	async fn get_tree(&self, prefix: &str) -> anyhow::Result<Vec<(String, Bytes)>> {
		let data = self.data.read().await;
		Ok(data.range(prefix.to_string()..).take_while(|(k, _)| k.starts_with(prefix)).map(|(k, v)| (k.clone(), v.clone())).collect())
	}

	async fn watch(&self, prefix: &str) -> anyhow::Result<BoxStream<'static, WatchEvent>> {
		let prefix = prefix.to_string();
		let rx = self.tx.subscribe();
		let stream = BroadcastStream::new(rx).filter_map(move |res| {
			let prefix = prefix.clone();
			async move {
				match res {
					Ok(event) => {
						let matches = match &event {
							WatchEvent::Set { key, .. } => key.starts_with(&prefix),
							WatchEvent::Delete { key } => key.starts_with(&prefix),
						};
						matches.then_some(event)
					}
					Err(_lagged) => None,
				}
			}
		});
		Ok(Box::pin(stream))
	}

	async fn put(&self, key: &str, value: Bytes) -> anyhow::Result<()> {
		self.data.write().await.insert(key.to_string(), value.clone());
		let _ = self.tx.send(WatchEvent::Set {
			key: key.to_string(),
			value,
		});
		Ok(())
	}

	async fn delete(&self, key: &str) -> anyhow::Result<()> {
		self.data.write().await.remove(key);
		let _ = self.tx.send(WatchEvent::Delete { key: key.to_string() });
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn get_tree_returns_only_matching_prefix() {
		let store = MemoryStore::new();
		store.put("/root/app1/backends/b1", Bytes::from_static(b"{}")).await.unwrap();
		store.put("/root/app2/backends/b1", Bytes::from_static(b"{}")).await.unwrap();
		let got = store.get_tree("/root/app1/").await.unwrap();
		assert_eq!(got.len(), 1);
		assert_eq!(got[0].0, "/root/app1/backends/b1");
	}

	#[tokio::test]
	async fn watch_only_sees_subsequent_events_for_the_prefix() {
		let store = MemoryStore::new();
		let mut stream = store.watch("/root/app1/").await.unwrap();
		store.put("/root/app2/backends/b1", Bytes::from_static(b"{}")).await.unwrap();
		store.put("/root/app1/backends/b1", Bytes::from_static(b"{}")).await.unwrap();
		let event = stream.next().await.unwrap();
		match event {
			WatchEvent::Set { key, .. } => assert_eq!(key, "/root/app1/backends/b1"),
			_ => panic!("expected Set"),
		}
	}
}
