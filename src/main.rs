use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotbook::config::{AppConfig, StorageBackend};
use slotbook::db::{self, BookingStore, MemoryBookingStore, SqliteBookingStore};
use slotbook::handlers;
use slotbook::services::clock::SystemClock;
use slotbook::services::notify::LogNotifier;
use slotbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env()?;

    let store: Arc<dyn BookingStore> = match config.storage {
        StorageBackend::Sqlite => {
            tracing::info!("using SQLite booking store ({})", config.database_url);
            Arc::new(SqliteBookingStore::new(db::init_db(&config.database_url)?))
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory booking store; bookings are lost on restart");
            Arc::new(MemoryBookingStore::new())
        }
    };

    tracing::info!(
        timezone = %config.schedule.session.timezone,
        session_minutes = config.schedule.session.session_minutes,
        buffer_minutes = config.schedule.session.buffer_minutes,
        weeks_forward = config.schedule.session.weeks_forward,
        "schedule: {}",
        config.schedule.to_human_readable()
    );

    let notifier = LogNotifier::new(config.provider_name.clone());
    let port = config.port;
    let state = Arc::new(AppState::new(
        config,
        store,
        Arc::new(SystemClock),
        Box::new(notifier),
    ));

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/slots", get(handlers::slots::list_slots))
        .route("/api/slots/next", get(handlers::slots::next_slot))
        .route("/api/slots/weeks", get(handlers::slots::list_weeks))
        .route("/api/slots/:date/:time", get(handlers::slots::slot_status))
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route("/api/admin/bookings", get(handlers::admin::list_bookings))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
