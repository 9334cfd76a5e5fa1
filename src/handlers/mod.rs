use axum::{
    middleware::from_fn,
    response::Json,
    routing::get,
    Router,
};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::Level;

use crate::models::HealthCheck;
use crate::service::PriceHistory;

mod history;

pub use history::{discount_handler, price_handler, price_old_handler, records_handler};

/// Liveness probe. Does not touch the store.
pub async fn health_handler() -> Json<HealthCheck> {
    Json(HealthCheck { status: "OK" })
}

pub fn router(history: PriceHistory) -> Router {
    Router::new()
        .route("/price/:id", get(price_handler))
        .route("/discount/:id", get(discount_handler))
        .route("/price_old/:id", get(price_old_handler))
        .route("/get/:id", get(records_handler))
        .route("/health", get(health_handler))
        .layer(from_fn(crate::middleware::logging))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::DEBUG)))
        .with_state(history)
}
