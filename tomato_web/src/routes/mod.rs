mod health;
mod labels;
mod metrics;
mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/labels", get(labels::list_labels))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/predict", post(predict::predict_image))
}
