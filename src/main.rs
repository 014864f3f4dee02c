use offline_transfer_sync::config::AppConfig;
use offline_transfer_sync::connectivity::{ConnectivityMonitor, ConnectivityProbe};
use offline_transfer_sync::ledger::GraphQlLedgerClient;
use offline_transfer_sync::store::{OfflineStore, TransferStatus};
use offline_transfer_sync::sync::{SyncEngine, SyncNotification, spawn_auto_sync};

use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	if let Err(e) = run().await {
		error!("Offline sync service failed: {}", e);
		std::process::exit(1);
	}
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
	info!("Starting offline sync service");

	let config = AppConfig::from_env()?;
	info!("Configuration:");
	info!("  Data directory: {:?}", config.data_dir);
	info!("  Ledger: {}", config.ledger_url);
	info!(
		"  Probe: {}",
		config.probe.as_ref().map_or("disabled", |probe| probe.url.as_str())
	);

	let store = Arc::new(OfflineStore::open_file(&config.data_dir, config.store.clone()).await?);
	let device_id = store.device_id().await?;
	info!("Device id {}", device_id);

	let queued = store.list_all().await;
	let failed = queued
		.iter()
		.filter(|transfer| transfer.status == TransferStatus::Failed)
		.count();
	info!(
		"{} transfers queued ({} pending, {} failed)",
		queued.len(),
		store.pending_count().await,
		failed
	);

	let ledger = Arc::new(GraphQlLedgerClient::new(
		config.ledger_url.clone(),
		config.sync.remote_call_timeout,
	)?);
	info!("Created ledger client");

	let monitor = Arc::new(ConnectivityMonitor::new(config.probe.is_none()));
	let probe_task = match config.probe.clone() {
		Some(probe_config) => {
			let probe = ConnectivityProbe::new(probe_config)?;
			probe.check_and_report(&monitor).await;
			Some(probe.spawn(monitor.clone()))
		}
		None => {
			warn!("No connectivity probe configured, assuming online");
			None
		}
	};

	let engine = Arc::new(SyncEngine::new(store.clone(), ledger, config.sync.clone()));
	engine.register_observer(|notification: &SyncNotification| match notification {
		SyncNotification::Syncing { pending } => info!("Syncing {} offline transfers", pending),
		SyncNotification::Success { synced } => info!("{} offline transfers synced", synced),
		SyncNotification::Error { failed } => warn!("{} offline transfers failed to sync", failed),
	});

	let auto_sync = spawn_auto_sync(engine.clone(), &monitor, config.auto_sync.clone());
	info!("Auto-sync running, press Ctrl-C to stop");

	tokio::signal::ctrl_c().await?;
	info!("Shutting down");

	auto_sync.shutdown();
	if let Some(task) = probe_task {
		task.abort();
	}
	Ok(())
}
