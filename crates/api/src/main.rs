//! API server entry point.

use api::config::{Config, LogFormat, Seed};
use domain::{InMemoryCatalog, InMemoryWarehouses, ProcessorConfig};
use ledger::{InMemoryStockStore, PostgresStockStore, StockStore};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
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
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<S: StockStore + Clone + 'static>(
    store: S,
    backend: &'static str,
    seed: Seed,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let catalog: InMemoryCatalog = seed.items.into_iter().collect();
    let warehouses: InMemoryWarehouses = seed.warehouses.into_iter().collect();
    tracing::info!(
        backend,
        items = catalog.len(),
        warehouses = warehouses.len(),
        "lookup data loaded"
    );

    let processor_config = ProcessorConfig {
        max_attempts: config.max_commit_attempts,
    };
    let state = api::create_state(store, backend, catalog, warehouses, processor_config);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::routes::metrics::describe();

    // 3. Load catalog items and warehouses
    let seed = match &config.seed_file {
        Some(path) => Seed::load(path).expect("failed to load seed file"),
        None => Seed::default(),
    };

    // 4. Pick the store and start serving
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStockStore::new(pool).with_lock_timeout(config.lock_timeout);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            serve(store, "postgres", seed, &config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            let store = InMemoryStockStore::new().with_lock_timeout(config.lock_timeout);
            serve(store, "memory", seed, &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
