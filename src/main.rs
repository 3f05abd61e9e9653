use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use parkpal::config::{AppConfig, StoreBackend};
use parkpal::db;
use parkpal::handlers;
use parkpal::services::flow_registry::SWEEP_INTERVAL;
use parkpal::services::notices::NoticeBus;
use parkpal::services::session::{InMemorySessionProvider, SessionProvider};
use parkpal::services::sync::SyncAdapter;
use parkpal::state::AppState;
use parkpal::store::rest::RestStore;
use parkpal::store::sqlite::SqliteStore;
use parkpal::store::ParkingStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let store: Arc<dyn ParkingStore> = match config.store_backend {
        StoreBackend::Rest => {
            anyhow::ensure!(!config.store_url.is_empty(), "STORE_URL must be set when STORE_BACKEND=rest");
            tracing::info!("using REST store (url: {})", config.store_url);
            Arc::new(RestStore::new(config.store_url.clone(), config.store_api_key.clone()))
        }
        StoreBackend::Sqlite => {
            tracing::info!("using SQLite store (path: {})", config.database_url);
            let conn = db::init_db(&config.database_url)?;
            db::seed_sample_lots(&conn)?;
            Arc::new(SqliteStore::new(Arc::new(Mutex::new(conn))))
        }
    };

    let notices = NoticeBus::default();
    let sync = SyncAdapter::new(store, notices, config.store_timeout);

    let sessions = Arc::new(InMemorySessionProvider::new());
    let _session_log = sessions.subscribe(Box::new(|_, session| match session {
        Some(s) => tracing::debug!(user_id = %s.user_id, "session opened"),
        None => tracing::debug!("session closed"),
    }));

    let state = Arc::new(AppState::new(config.clone(), sync, sessions));
    let _flow_sweeper = state.flows.spawn_sweeper(SWEEP_INTERVAL);
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
