//! Graceful shutdown primitives.
//!
//! A [`DrainTrigger`]/[`DrainWatcher`] pair lets many components register
//! interest in a shutdown without any of them needing to know about the
//! others. Holding a [`DrainWatcher`] (or the [`DrainBlocker`] it resolves
//! to once a drain starts) keeps the process alive; dropping it is how a
//! component signals it has finished unwinding.

pub use internal::{
	DrainMode, ReleaseShutdown as DrainBlocker, Signal as DrainTrigger, Watch as DrainWatcher,
};

/// Constructs a new drain pair. The `DrainTrigger` starts a drain and waits
/// for it to complete; the `DrainWatcher` should be held by anything that
/// wants to participate (it can be cloned — a drain only completes once
/// every outstanding `DrainWatcher` is dropped).
pub fn new() -> (DrainTrigger, DrainWatcher) {
	internal::channel()
}

mod internal {
	use tokio::sync::{mpsc, watch};

	pub fn channel() -> (Signal, Watch) {
		let (signal_tx, signal_rx) = watch::channel(None);
		let (drained_tx, drained_rx) = mpsc::channel(1);
		(
			Signal {
				drained_rx,
				signal_tx,
			},
			Watch {
				drained_tx,
				signal_rx,
			},
		)
	}

	enum Never {}

	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub enum DrainMode {
		Immediate,
		Graceful,
	}

	/// Sends a drain command to all watchers and waits for them all to drop.
	pub struct Signal {
		drained_rx: mpsc::Receiver<Never>,
		signal_tx: watch::Sender<Option<DrainMode>>,
	}

	/// Watches for a drain command. All clones must be dropped for the
	/// matching `Signal::start_drain_and_wait` to complete.
	#[derive(Clone)]
	pub struct Watch {
		drained_tx: mpsc::Sender<Never>,
		signal_rx: watch::Receiver<Option<DrainMode>>,
	}

	#[must_use = "ReleaseShutdown should be held until the unwind is complete, then dropped"]
	#[derive(Clone)]
	#[allow(dead_code)]
	pub struct ReleaseShutdown(mpsc::Sender<Never>, DrainMode);

	impl ReleaseShutdown {
		pub fn mode(&self) -> DrainMode {
			self.1
		}
	}

	impl Signal {
		pub async fn start_drain_and_wait(mut self, mode: DrainMode) {
			let _ = self.signal_tx.send(Some(mode));
			match self.drained_rx.recv().await {
				None => {}
				Some(n) => match n {},
			}
		}
	}

	impl Watch {
		pub async fn wait_for_drain(mut self) -> ReleaseShutdown {
			let mode = self
				.signal_rx
				.wait_for(Option::is_some)
				.await
				.map(|mode| mode.expect("already asserted is_some"))
				.unwrap_or(DrainMode::Immediate);
			ReleaseShutdown(self.drained_tx, mode)
		}
	}

	impl std::fmt::Debug for Signal {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			f.debug_struct("Signal").finish_non_exhaustive()
		}
	}

	impl std::fmt::Debug for Watch {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			f.debug_struct("Watch").finish_non_exhaustive()
		}
	}

	impl std::fmt::Debug for ReleaseShutdown {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			f.debug_struct("ReleaseShutdown").finish_non_exhaustive()
		}
	}
}

#[cfg(test)]
mod test {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn drain_waits_for_all_watchers() {
		let (trigger, watcher) = new();
		let done = Arc::new(AtomicUsize::new(0));
		let (tx, _) = tokio::sync::broadcast::channel(1);

		for i in 1..=3u64 {
			let mut rx = tx.subscribe();
			let done = done.clone();
			let w = watcher.clone();
			tokio::spawn(async move {
				let _blocker = w.wait_for_drain().await;
				tokio::time::sleep(Duration::from_millis(i * 5)).await;
				let _ = rx.recv().await;
				done.fetch_add(1, Ordering::SeqCst);
			});
		}
		drop(watcher);
		tokio::time::sleep(Duration::from_millis(1)).await;
		let _ = tx.send(());
		trigger.start_drain_and_wait(DrainMode::Graceful).await;
		assert_eq!(done.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn dropping_the_trigger_resolves_watchers_immediately() {
		let (trigger, watcher) = new();
		drop(trigger);
		let blocker = watcher.wait_for_drain().await;
		assert_eq!(blocker.mode(), DrainMode::Immediate);
	}
}
