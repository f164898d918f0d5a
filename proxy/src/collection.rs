//! The process-wide in-memory topology: applications, and the flattened
//! global frontend/backend maps used for O(1) admin lookups. Mutated only
//! by the [`crate::reconciler::Reconciler`] and the admin API — every
//! mutator here takes the single internal lock, consolidating what the
//! design notes call out as a known defect in the source (scattered map
//! locks) behind one place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::instrument;

use crate::application::Application;
use crate::frontend::Frontend;
use crate::types::{AppId, BackendId, FrontendId};

#[derive(Default)]
struct Inner {
	applications: HashMap<AppId, Arc<Application>>,
	frontends: HashMap<FrontendId, Arc<Frontend>>,
	backends: HashMap<BackendId, AppId>,
}

#[derive(Clone, Default)]
pub struct Collection {
	inner: Arc<Mutex<Inner>>,
}

impl Collection {
	pub fn new() -> Self {
		Self::default()
	}

	#[instrument(skip(self))]
	pub fn insert_application(&self, app: Arc<Application>) {
		self.inner.lock().unwrap().applications.insert(app.id.clone(), app);
	}

	#[instrument(skip(self))]
	pub fn remove_application(&self, id: &AppId) -> Option<Arc<Application>> {
		let mut inner = self.inner.lock().unwrap();
		let app = inner.applications.remove(id)?;
		inner.frontends.retain(|_, f| app.frontend(&f.id).is_none());
		inner.backends.retain(|_, owner| owner != id);
		Some(app)
	}

	pub fn application(&self, id: &AppId) -> Option<Arc<Application>> {
		self.inner.lock().unwrap().applications.get(id).cloned()
	}

	pub fn applications(&self) -> Vec<Arc<Application>> {
		self.inner.lock().unwrap().applications.values().cloned().collect()
	}

	#[instrument(skip(self, frontend))]
	pub fn register_frontend(&self, app_id: &AppId, frontend: Arc<Frontend>) {
		let mut inner = self.inner.lock().unwrap();
		inner.frontends.insert(frontend.id.clone(), frontend.clone());
		if let Some(app) = inner.applications.get(app_id).cloned() {
			app.insert_frontend(frontend);
		}
	}

	#[instrument(skip(self))]
	pub fn unregister_frontend(&self, app_id: &AppId, id: &FrontendId) -> Option<Arc<Frontend>> {
		let mut inner = self.inner.lock().unwrap();
		inner.frontends.remove(id);
		inner.applications.get(app_id).and_then(|app| app.remove_frontend(id))
	}

	pub fn frontend(&self, id: &FrontendId) -> Option<Arc<Frontend>> {
		self.inner.lock().unwrap().frontends.get(id).cloned()
	}

	pub fn frontends(&self) -> Vec<Arc<Frontend>> {
		self.inner.lock().unwrap().frontends.values().cloned().collect()
	}

	#[instrument(skip(self))]
	pub fn note_backend(&self, app_id: &AppId, id: BackendId) {
		self.inner.lock().unwrap().backends.insert(id, app_id.clone());
	}

	#[instrument(skip(self))]
	pub fn forget_backend(&self, id: &BackendId) {
		self.inner.lock().unwrap().backends.remove(id);
	}
}
