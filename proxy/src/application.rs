//! A named grouping of frontends sharing a pool of backends. Backend
//! mutations applied to the `Application` are fanned out to every
//! contained frontend's [`Strategy`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::frontend::Frontend;
use crate::types::{AppId, Backend, BackendId, FrontendId};

pub struct Application {
	pub id: AppId,
	frontends: Mutex<HashMap<FrontendId, Arc<Frontend>>>,
	backends: Mutex<HashMap<BackendId, Backend>>,
}

impl Application {
	pub fn new(id: impl Into<AppId>) -> Self {
		Application {
			id: id.into(),
			frontends: Mutex::new(HashMap::new()),
			backends: Mutex::new(HashMap::new()),
		}
	}

	pub fn frontend(&self, id: &FrontendId) -> Option<Arc<Frontend>> {
		self.frontends.lock().unwrap().get(id).cloned()
	}

	pub fn frontends(&self) -> Vec<Arc<Frontend>> {
		self.frontends.lock().unwrap().values().cloned().collect()
	}

	pub fn backends(&self) -> Vec<Backend> {
		self.backends.lock().unwrap().values().cloned().collect()
	}

	/// Registers `frontend`, installing the application's current backend
	/// pool into its strategy.
	pub fn insert_frontend(&self, frontend: Arc<Frontend>) {
		let backends: Vec<Backend> = self.backends.lock().unwrap().values().cloned().collect();
		frontend.set_backends(backends);
		self.frontends.lock().unwrap().insert(frontend.id.clone(), frontend);
	}

	pub fn remove_frontend(&self, id: &FrontendId) -> Option<Arc<Frontend>> {
		self.frontends.lock().unwrap().remove(id)
	}

	/// Adds or replaces `backend` by id and fans the change out to every
	/// frontend's strategy.
	pub fn upsert_backend(&self, backend: Backend) {
		self.backends.lock().unwrap().insert(backend.id.clone(), backend.clone());
		for front in self.frontends() {
			front.upsert_backend(backend.clone());
		}
	}

	/// Removes a backend by id from the application and every frontend's strategy.
	pub fn remove_backend(&self, id: &BackendId) {
		self.backends.lock().unwrap().remove(id);
		for front in self.frontends() {
			front.delete_backend(id);
		}
	}
}

impl std::fmt::Debug for Application {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Application").field("id", &self.id).finish()
	}
}
