//! Database Backup Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client,
//! registers the backup informer and handler, and runs the dispatch loop.

use std::sync::Arc;

use kube::{Api, Client};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use db_backup_operator::{
    backend::NoopBackend,
    crd::DatabaseBackup,
    metrics,
    operator::{Operator, OperatorConfig},
    reconcilers::backup::BackupHandler,
    store::KubeBackupStore,
    watch::WatchSource,
};

/// Default metrics port
const METRICS_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting Database Backup Operator");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Wire the operator core
    let operator = Arc::new(Operator::new("db-backup-operator", OperatorConfig::default()));

    let api: Api<DatabaseBackup> = Api::all(client.clone());
    let source = Arc::new(WatchSource::new(api));
    operator.register_informer(source.clone(), DatabaseBackup::gvk())?;
    operator.register_starter(source)?;

    let store = Arc::new(KubeBackupStore::new(client.clone()));
    let handler = Arc::new(BackupHandler::new(store, Arc::new(NoopBackend)));
    operator.register_handler(handler)?;

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(METRICS_PORT));
    info!("Metrics server starting on port {}", METRICS_PORT);

    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Received shutdown signal, stopping operator");
            stop.cancel();
        });
    }

    tokio::select! {
        result = operator.run(stop.clone()) => {
            if let Err(e) = result {
                error!(error = %e, "Operator exited with error");
            }
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
            stop.cancel();
        }
    }

    info!("Database Backup Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
