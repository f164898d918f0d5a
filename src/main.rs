mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use gwcore::drain::{self, DrainMode};
use gwcore::error::Error;
use gwcore::readiness::Ready;
use gwcore::signal::Shutdown;
use gwproxy::admin::{self, AdminState};
use gwproxy::collection::Collection;
use gwproxy::kv::KvStore;
use gwproxy::kv::memory::MemoryStore;
use gwproxy::metrics::Metrics;
use gwproxy::reconciler::Reconciler;
use gwproxy::server::Server;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "dynamically reconfigurable L4/7 reverse proxy", long_about = None)]
struct Args {
	/// Path to the JSON configuration file.
	#[arg(long, value_name = "file")]
	path: Option<PathBuf>,
}

async fn load_error_page(path: &Option<String>) -> Result<Option<Arc<str>>, Error> {
	match path {
		None => Ok(None),
		Some(p) => {
			let contents = tokio::fs::read_to_string(p).await.map_err(|source| Error::ReadErrorPage { path: p.clone(), source })?;
			Ok(Some(Arc::from(contents.as_str())))
		}
	}
}

fn parse_addr(addr: &str) -> Result<SocketAddr, Error> {
	addr.parse().map_err(|source| Error::InvalidAddr { addr: addr.to_string(), source })
}

async fn run(config: Config) -> Result<(), Error> {
	let ready = Ready::new();

	let secure_addr = parse_addr(&config.secure_bind_addr)?;
	let insecure_addr = parse_addr(&config.insecure_bind_addr)?;
	let admin_addr = parse_addr(&config.api_server_addr)?;

	let error_page_502 = load_error_page(&config.error_page_502).await?;
	let error_page_503 = load_error_page(&config.error_page_503).await?;

	let metrics = Metrics::new();
	let collection = Collection::new();
	let kv: Arc<dyn KvStore> = MemoryStore::new();

	let (secure_server, secure_err_rx) = Server::new(secure_addr, true, error_page_502.clone(), error_page_503.clone(), metrics.clone());
	let (insecure_server, insecure_err_rx) = Server::new(insecure_addr, false, error_page_502, error_page_503, metrics.clone());
	let secure_server = Arc::new(secure_server);
	let insecure_server = Arc::new(insecure_server);

	let reconciler = Arc::new(Reconciler::new(kv.clone(), config.etcd_key.clone(), collection.clone(), insecure_server.clone(), secure_server.clone()));

	{
		let hydrate_task = ready.register_task("hydrate");
		reconciler.hydrate().await.map_err(Error::Hydrate)?;
		drop(hydrate_task);
	}

	let (drain_trigger, drain_watcher) = drain::new();
	let secure_drain = drain_watcher.clone();
	let insecure_drain = drain_watcher.clone();
	let admin_drain = drain_watcher;

	let mut run_set = JoinSet::new();

	{
		let secure_server = secure_server.clone();
		let block = ready.register_task("secure_server");
		let addr = secure_addr;
		run_set.spawn(async move {
			let result = secure_server.listen_and_serve(secure_err_rx, secure_drain).await;
			drop(block);
			result.map_err(|source| Error::Bind { addr: addr.to_string(), source }).map_err(anyhow::Error::from)
		});
	}
	{
		let insecure_server = insecure_server.clone();
		let block = ready.register_task("insecure_server");
		let addr = insecure_addr;
		run_set.spawn(async move {
			let result = insecure_server.listen_and_serve(insecure_err_rx, insecure_drain).await;
			drop(block);
			result.map_err(|source| Error::Bind { addr: addr.to_string(), source }).map_err(anyhow::Error::from)
		});
	}
	{
		let state = AdminState {
			collection: collection.clone(),
			insecure: insecure_server.clone(),
			secure: secure_server.clone(),
			metrics: metrics.clone(),
		};
		let block = ready.register_task("admin");
		run_set.spawn(async move {
			let listener = match tokio::net::TcpListener::bind(admin_addr).await {
				Ok(listener) => listener,
				Err(source) => {
					drop(block);
					return Err(anyhow::Error::from(Error::Bind { addr: admin_addr.to_string(), source }));
				}
			};
			info!(addr = %admin_addr, "admin api listening");
			drop(block);
			axum::serve(listener, admin::router(state))
				.with_graceful_shutdown(async move {
					admin_drain.wait_for_drain().await;
				})
				.await?;
			Ok::<(), anyhow::Error>(())
		});
	}

	let watch_handle = {
		let reconciler = reconciler.clone();
		tokio::spawn(async move {
			loop {
				if let Err(e) = reconciler.run_watch().await {
					warn!(error = %e, "watch loop failed, retrying");
					tokio::time::sleep(std::time::Duration::from_secs(1)).await;
				}
			}
		})
	};

	let liveness_handle = {
		let collection = collection.clone();
		tokio::spawn(async move {
			let mut tick = tokio::time::interval(std::time::Duration::from_secs(30));
			loop {
				tick.tick().await;
				let apps = collection.applications();
				let frontends = collection.frontends().len();
				let backends: usize = apps.iter().map(|a| a.backends().len()).sum();
				info!(
					uptime = ?gwcore::telemetry::APPLICATION_START_TIME.elapsed(),
					applications = apps.len(),
					frontends,
					backends,
					"alive"
				);
			}
		})
	};

	let shutdown = Shutdown::new();
	tokio::spawn(async move {
		shutdown.wait().await;
		info!("shutdown requested, draining");
		drain_trigger.start_drain_and_wait(DrainMode::Graceful).await;
	});

	while let Some(result) = run_set.join_next().await {
		match result {
			Ok(Ok(())) => {}
			Ok(Err(e)) => error!(error = %e, "task failed"),
			Err(e) => error!(error = %e, "task panicked"),
		}
	}

	watch_handle.abort();
	liveness_handle.abort();
	info!(pending = ?ready.pending(), "shutdown complete");
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
	gwcore::telemetry::init_logging();

	let args = Args::parse();
	let Some(path) = args.path else {
		eprintln!("Usage: vhost-gateway --path <file>");
		std::process::exit(0);
	};

	let path_str = path.display().to_string();
	let raw = tokio::fs::read_to_string(&path).await.map_err(|source| Error::ReadConfig { path: path_str.clone(), source })?;
	let config: Config = serde_json::from_str(&raw).map_err(|source| Error::ParseConfig { path: path_str.clone(), source })?;

	run(config).await
}
