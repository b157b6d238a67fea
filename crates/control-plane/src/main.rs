//! Migration Control Plane Server
//!
//! Serves the migration API and runs batch jobs, either on the in-process
//! queue or through NATS JetStream for the migration workers.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use migration_control_plane::{
    batch::{JobRunner, JobScheduler, LocalJobQueue},
    config::{AppConfig, DatabaseConfig},
    db::{create_pool, schema, PgStore},
    handlers,
    migration::DelegateRegistry,
    nats::NatsJobScheduler,
    services::{MigrationService, MigrationSettings},
    state::AppState,
};

/// Initialize tracing/logging.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,migration_control_plane=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Connect to NATS if configured.
async fn connect_nats(config: &AppConfig) -> Option<async_nats::Client> {
    if let Some(ref nats_url) = config.nats_url {
        match async_nats::connect(nats_url).await {
            Ok(client) => {
                tracing::info!(url = %nats_url, "Connected to NATS");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %nats_url, "Failed to connect to NATS, running jobs in-process");
                None
            }
        }
    } else {
        tracing::info!("NATS not configured, running jobs in-process");
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Migration Control Plane"
    );

    let app_config = AppConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load app config, using defaults");
        AppConfig::default()
    });

    let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load database config, using defaults");
        DatabaseConfig::default()
    });

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        history_level = ?app_config.history_level,
        status_cycle_secs = app_config.batch_status_cycle_secs,
        "Configuration loaded"
    );

    let db_pool = create_pool(&db_config).await?;
    if app_config.init_schema {
        schema::init_schema(&db_pool).await?;
    }

    let settings = MigrationSettings {
        history_level: app_config.history_level,
        batch_status_cycle: app_config.batch_status_cycle(),
    };
    let store = PgStore::new(db_pool.clone());

    let (service, runner) = match connect_nats(&app_config).await {
        Some(client) => {
            let scheduler =
                NatsJobScheduler::new(client, &app_config.nats_subject, &app_config.nats_stream).await?;
            let service = MigrationService::with_store(
                store,
                Arc::new(scheduler),
                DelegateRegistry::default(),
                settings,
            );
            (service, None)
        }
        None => {
            let (queue, receiver) = LocalJobQueue::new();
            let scheduler: Arc<dyn JobScheduler> = Arc::new(queue.clone());
            let service =
                MigrationService::with_store(store, scheduler, DelegateRegistry::default(), settings);
            let runner = JobRunner::new(
                queue,
                Arc::new(service.clone()),
                app_config.local_workers,
                app_config.job_max_retries,
            );
            tracing::info!(workers = app_config.local_workers, "In-process job runner started");
            (service, Some(runner.spawn(receiver)))
        }
    };

    let nats = runner.is_none();
    let state = AppState::new(service, Some(db_pool), app_config.clone(), nats);
    let app = handlers::router(state);

    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(runner) = runner {
        runner.abort();
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
