//! Read-only HTTP API over stored briefings.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /api/latest_briefing?keyword=&category=` | newest matching briefing, 404 if none |
//! | `GET /api/briefings?limit=&keyword=&category=` | up to `limit` (default 10, max 50) briefings, newest first |
//! | `GET /api/categories` | `{"categories": [...]}` in configured order |
//! | `GET /api/status` | current ingestion status snapshot |
//! | `GET /health` | `ok` |

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::CategoryTable;
use crate::events::StatusHandle;
use crate::store::BriefingStore;

mod error;
mod handlers;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub store: BriefingStore,
    pub categories: Arc<CategoryTable>,
    pub status: StatusHandle,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/latest_briefing", get(handlers::latest_briefing))
        .route("/briefings", get(handlers::briefings))
        .route("/categories", get(handlers::categories))
        .route("/status", get(handlers::status));

    let routes = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api);
    with_layers(routes).with_state(state)
}

/// Request tracing, and a JSON 500 instead of a dropped connection when a
/// handler panics.
fn with_layers(routes: Router<AppState>) -> Router<AppState> {
    routes
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C.
pub async fn serve(bind: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "Read API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
        return;
    }
    info!("Shutdown signal received");
}
