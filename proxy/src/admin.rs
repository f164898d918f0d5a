//! The administrative REST surface: a thin CRUD facade over the same
//! `Collection` the reconciler mutates. Every response is `200 OK` with a
//! `{"status":true}` / `{"status":false,"error":"..."}` envelope; GET
//! handlers additionally nest the requested data under `data` (the source
//! this is modeled on returns the bare envelope even for reads — this
//! crate's choice to add `data` is documented in DESIGN.md).

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::application::Application;
use crate::collection::Collection;
use crate::frontend::Frontend;
use crate::metrics::Metrics;
use crate::server::Server;
use crate::types::{AppId, Backend, BackendId, FrontendId};

#[derive(Clone)]
pub struct AdminState {
	pub collection: Collection,
	pub insecure: Arc<Server>,
	pub secure: Arc<Server>,
	pub metrics: Arc<Metrics>,
}

pub fn router(state: AdminState) -> Router {
	Router::new()
		.route("/v1/", get(list_applications).post(create_application))
		.route("/v1/{id}", get(get_application).delete(delete_application))
		.route("/v1/{id}/frontend/{fid}", get(get_frontend).post(upsert_frontend).delete(delete_frontend))
		.route("/v1/{id}/backend/{bid}", get(get_backend).post(upsert_backend).delete(delete_backend))
		.route("/metrics", get(crate::metrics::handler))
		.with_state(state)
}

fn ok() -> impl IntoResponse {
	Json(json!({"status": true}))
}

fn ok_data(data: serde_json::Value) -> impl IntoResponse {
	Json(json!({"status": true, "data": data}))
}

fn err(message: impl std::fmt::Display) -> impl IntoResponse {
	Json(json!({"status": false, "error": message.to_string()}))
}

#[derive(Serialize)]
struct AppSummary {
	id: String,
	frontends: Vec<String>,
	backends: Vec<String>,
}

fn summarize(app: &Application) -> AppSummary {
	AppSummary {
		id: app.id.to_string(),
		frontends: app.frontends().iter().map(|f| f.id.to_string()).collect(),
		backends: app.backends().iter().map(|b| b.id.to_string()).collect(),
	}
}

async fn list_applications(State(state): State<AdminState>) -> impl IntoResponse {
	let apps: Vec<AppSummary> = state.collection.applications().iter().map(|a| summarize(a)).collect();
	ok_data(serde_json::to_value(apps).unwrap_or(json!([])))
}

#[derive(Deserialize)]
struct CreateApp {
	id: String,
}

async fn create_application(State(state): State<AdminState>, Json(body): Json<CreateApp>) -> impl IntoResponse {
	let id = AppId::from(body.id);
	state.collection.insert_application(Arc::new(Application::new(id)));
	ok()
}

async fn get_application(State(state): State<AdminState>, Path(id): Path<String>) -> impl IntoResponse {
	match state.collection.application(&AppId::from(id)) {
		Some(app) => ok_data(serde_json::to_value(summarize(&app)).unwrap_or(json!({}))).into_response(),
		None => err("application not found").into_response(),
	}
}

async fn delete_application(State(state): State<AdminState>, Path(id): Path<String>) -> impl IntoResponse {
	let app_id = AppId::from(id);
	match state.collection.remove_application(&app_id) {
		Some(app) => {
			for front in app.frontends() {
				state.secure.remove_frontend(&front.id).await;
				state.insecure.remove_frontend(&front.id).await;
			}
			ok().into_response()
		}
		None => err("application not found").into_response(),
	}
}

#[derive(Serialize)]
struct FrontendSummary {
	id: String,
	hosts: Vec<String>,
	secure: bool,
}

async fn get_frontend(State(state): State<AdminState>, Path((app_id, fid)): Path<(String, String)>) -> impl IntoResponse {
	let _ = AppId::from(app_id);
	match state.collection.frontend(&FrontendId::from(fid)) {
		Some(front) => ok_data(
			serde_json::to_value(FrontendSummary {
				id: front.id.to_string(),
				hosts: front.hosts(),
				secure: front.is_secure(),
			})
			.unwrap_or(json!({})),
		)
		.into_response(),
		None => err("frontend not found").into_response(),
	}
}

#[derive(Deserialize)]
struct FrontendBody {
	hosts: Vec<String>,
	#[serde(default)]
	tls_crt: Option<String>,
	#[serde(default)]
	tls_key: Option<String>,
}

async fn upsert_frontend(State(state): State<AdminState>, Path((app_id, fid)): Path<(String, String)>, Json(body): Json<FrontendBody>) -> impl IntoResponse {
	let app_id = AppId::from(app_id);
	let front = Arc::new(Frontend::new(FrontendId::from(fid)));
	if front.set_hosts(body.hosts).is_err() {
		return err("failed to set hosts").into_response();
	}
	if let (Some(crt), Some(key)) = (body.tls_crt, body.tls_key) {
		if !crt.is_empty() && !key.is_empty() {
			match crate::tls::compile(front.id.as_str(), &crt, &key) {
				Ok(tls) => {
					let _ = front.set_tls(Some(tls));
				}
				Err(e) => return err(e).into_response(),
			}
		}
	}
	state.collection.register_frontend(&app_id, front.clone());
	if front.is_secure() {
		if let Err(e) = state.secure.add_frontend(front.clone()).await {
			return err(e).into_response();
		}
	}
	if let Err(e) = state.insecure.add_frontend(front).await {
		return err(e).into_response();
	}
	ok().into_response()
}

async fn delete_frontend(State(state): State<AdminState>, Path((app_id, fid)): Path<(String, String)>) -> impl IntoResponse {
	let fid = FrontendId::from(fid);
	state.secure.remove_frontend(&fid).await;
	state.insecure.remove_frontend(&fid).await;
	state.collection.unregister_frontend(&AppId::from(app_id), &fid);
	ok().into_response()
}

async fn get_backend(State(state): State<AdminState>, Path((app_id, bid)): Path<(String, String)>) -> impl IntoResponse {
	match state.collection.application(&AppId::from(app_id)) {
		Some(app) => match app.backends().into_iter().find(|b| b.id == BackendId::from(bid.clone())) {
			Some(b) => ok_data(json!({"id": b.id.to_string(), "url": b.address, "connect_timeout": b.connect_timeout_ms})).into_response(),
			None => err("backend not found").into_response(),
		},
		None => err("application not found").into_response(),
	}
}

#[derive(Deserialize)]
struct BackendBody {
	url: String,
	#[serde(default)]
	connect_timeout: Option<u64>,
}

async fn upsert_backend(State(state): State<AdminState>, Path((app_id, bid)): Path<(String, String)>, Json(body): Json<BackendBody>) -> impl IntoResponse {
	let app_id = AppId::from(app_id);
	match state.collection.application(&app_id) {
		Some(app) => {
			let backend = Backend::new(BackendId::from(bid.clone()), body.url, body.connect_timeout);
			app.upsert_backend(backend);
			state.collection.note_backend(&app_id, BackendId::from(bid));
			ok().into_response()
		}
		None => err("application not found").into_response(),
	}
}

async fn delete_backend(State(state): State<AdminState>, Path((app_id, bid)): Path<(String, String)>) -> impl IntoResponse {
	let bid = BackendId::from(bid);
	if let Some(app) = state.collection.application(&AppId::from(app_id)) {
		app.remove_backend(&bid);
	}
	state.collection.forget_backend(&bid);
	ok().into_response()
}
