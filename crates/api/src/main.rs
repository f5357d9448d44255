//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use event_bus::{EventBus, InMemoryEventBus, PostgresEventBus};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::describe_metrics();

    // 3. Storage and bus: PostgreSQL when configured, in-memory otherwise
    let policy = config.retry_policy();
    let state = match config.database_url.as_deref() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            sqlx::migrate!("../../migrations")
                .run(&pool)
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL stores and bus");

            let bus: Arc<dyn EventBus> =
                Arc::new(PostgresEventBus::with_policy(pool.clone(), policy));
            api::create_postgres_state(pool, bus)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stores and bus");
            let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::with_policy(policy));
            api::create_default_state(bus)
        }
    };

    api::bind_queues(state.bus.as_ref())
        .await
        .expect("failed to bind queues");

    // 4. Start one worker per consumer
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers: Vec<_> = api::consumer_workers(&state, config.worker_poll_interval())
        .into_iter()
        .map(|worker| tokio::spawn(worker.run(shutdown_rx.clone())))
        .collect();

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop workers after the server has drained
    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "consumer worker panicked");
        }
    }

    tracing::info!("server shut down gracefully");
}
