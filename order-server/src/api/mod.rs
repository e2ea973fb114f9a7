//! HTTP API routes

pub mod health;
pub mod metrics;
pub mod orders;

use axum::routing::get;
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::AppState;

/// Build the service router.
pub fn router(state: AppState, cfg: &Config) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/order", get(orders::missing_id))
        .route("/order/", get(orders::missing_id))
        .route("/order/{order_uid}", get(orders::get_order));

    if cfg.telemetry.enabled {
        router = router.route(&cfg.telemetry.metrics_path, get(metrics::serve));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(cfg.server.write_timeout))
        .with_state(state)
}
