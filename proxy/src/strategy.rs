//! Load-balancing over a frontend's backend pool. Round-robin is the only
//! variant today; `Strategy` is kept as a small closed enum so additional
//! policies (least-connections, weighted) slot in without touching callers.

use std::sync::Arc;

use crate::types::{Backend, BackendId};

#[derive(Debug)]
pub enum Strategy {
	RoundRobin(RoundRobin),
}

impl Strategy {
	pub fn round_robin() -> Self {
		Strategy::RoundRobin(RoundRobin::new())
	}

	pub fn next(&self) -> Option<Arc<Backend>> {
		match self {
			Strategy::RoundRobin(rr) => rr.next(),
		}
	}

	pub fn add(&self, backend: Backend) {
		match self {
			Strategy::RoundRobin(rr) => rr.add(backend),
		}
	}

	pub fn delete(&self, id: &BackendId) -> bool {
		match self {
			Strategy::RoundRobin(rr) => rr.delete(id),
		}
	}

	pub fn replace(&self, backends: Vec<Backend>) {
		match self {
			Strategy::RoundRobin(rr) => rr.replace(backends),
		}
	}

	/// Deletes then re-adds `backend`, moving it to the tail of the pool and
	/// leaving the cursor wherever `delete` left it. See DESIGN.md for why
	/// this crate keeps the source's delete-then-add semantics rather than
	/// an in-place replace.
	pub fn upsert(&self, backend: Backend) {
		self.delete(&backend.id);
		self.add(backend);
	}

	pub fn snapshot(&self) -> Vec<Arc<Backend>> {
		match self {
			Strategy::RoundRobin(rr) => rr.snapshot(),
		}
	}

	pub fn is_empty(&self) -> bool {
		match self {
			Strategy::RoundRobin(rr) => rr.is_empty(),
		}
	}
}

/// `backends` is insertion-ordered; `cursor` points at the backend that will
/// be returned by the *next* call to `next()`. `next()` advances the cursor
/// before returning, matching the literal b2,b1,b2,b1 sequence spec.md's
/// end-to-end scenario 1 requires for a starting cursor of 0 and two backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
	inner: std::sync::Mutex<RoundRobinState>,
}

#[derive(Debug, Default)]
struct RoundRobinState {
	backends: Vec<Arc<Backend>>,
	cursor: usize,
}

impl RoundRobin {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn next(&self) -> Option<Arc<Backend>> {
		let mut state = self.inner.lock().unwrap();
		let n = state.backends.len();
		if n == 0 {
			return None;
		}
		if n == 1 {
			return Some(state.backends[0].clone());
		}
		state.cursor = (state.cursor + 1) % n;
		Some(state.backends[state.cursor].clone())
	}

	pub fn add(&self, backend: Backend) {
		let mut state = self.inner.lock().unwrap();
		state.backends.push(Arc::new(backend));
	}

	pub fn delete(&self, id: &BackendId) -> bool {
		let mut state = self.inner.lock().unwrap();
		let before = state.backends.len();
		state.backends.retain(|b| &b.id != id);
		let removed = state.backends.len() != before;
		if removed {
			state.cursor = 0;
		}
		removed
	}

	pub fn replace(&self, backends: Vec<Backend>) {
		let mut state = self.inner.lock().unwrap();
		state.backends = backends.into_iter().map(Arc::new).collect();
		state.cursor = 0;
	}

	pub fn snapshot(&self) -> Vec<Arc<Backend>> {
		self.inner.lock().unwrap().backends.clone()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.lock().unwrap().backends.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn backend(id: &str) -> Backend {
		Backend::new(id, "127.0.0.1:0", None)
	}

	#[test]
	fn empty_pool_yields_none() {
		let rr = RoundRobin::new();
		assert!(rr.next().is_none());
	}

	#[test]
	fn single_backend_never_advances() {
		let rr = RoundRobin::new();
		rr.add(backend("b1"));
		for _ in 0..5 {
			assert_eq!(rr.next().unwrap().id, BackendId::from("b1"));
		}
	}

	#[test]
	fn two_backends_advance_before_returning() {
		let rr = RoundRobin::new();
		rr.add(backend("b1"));
		rr.add(backend("b2"));
		let seq: Vec<String> = (0..4).map(|_| rr.next().unwrap().id.to_string()).collect();
		assert_eq!(seq, vec!["b2", "b1", "b2", "b1"]);
	}

	#[test]
	fn delete_resets_cursor() {
		let rr = RoundRobin::new();
		rr.add(backend("b1"));
		rr.add(backend("b2"));
		rr.add(backend("b3"));
		rr.next(); // cursor -> 1 (b2)
		assert!(rr.delete(&BackendId::from("b2")));
		// cursor reset to 0; remaining order is [b1, b3]
		assert_eq!(rr.next().unwrap().id, BackendId::from("b3"));
	}

	#[test]
	fn create_then_delete_is_a_no_op() {
		let rr = RoundRobin::new();
		rr.add(backend("b1"));
		let before = rr.snapshot().len();
		rr.add(backend("b2"));
		assert!(rr.delete(&BackendId::from("b2")));
		assert_eq!(rr.snapshot().len(), before);
	}
}
