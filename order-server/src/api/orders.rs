//! Order lookup endpoint
//!
//! The read path: cache first, store fallback, populate on miss. Not-found
//! and invalid-id are disjoint from internal failures — only the latter
//! produce a 500, and the cause goes to the log, not the body.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use shared::models::Order;
use uuid::Uuid;

use crate::db::StoreError;
use crate::error::ApiError;
use crate::state::AppState;

/// `GET /order/{order_uid}`
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Arc<Order>>, ApiError> {
    if order_uid.is_empty() {
        return Err(ApiError::MissingId);
    }
    if Uuid::parse_str(&order_uid).is_err() {
        return Err(ApiError::InvalidId);
    }

    let started = Instant::now();

    if let Some(order) = state.cache.get(&order_uid).await {
        state.metrics.cache_requests.with_label_values(&["hit"]).inc();
        state
            .metrics
            .lookup_duration
            .with_label_values(&["cache"])
            .observe(started.elapsed().as_secs_f64());
        return Ok(Json(order));
    }
    state.metrics.cache_requests.with_label_values(&["miss"]).inc();

    let Some(store) = &state.store else {
        return Err(ApiError::NotFound);
    };

    tracing::debug!(order_uid = %order_uid, "cache miss, falling back to store");
    match store.get_order_by_id(&order_uid).await {
        Ok(order) => {
            let order = Arc::new(order);
            state.cache.save(order.clone()).await;
            state
                .metrics
                .cache_populations
                .with_label_values(&["read_through"])
                .inc();
            state
                .metrics
                .lookup_duration
                .with_label_values(&["store"])
                .observe(started.elapsed().as_secs_f64());
            Ok(Json(order))
        }
        Err(StoreError::NotFound) => Err(ApiError::NotFound),
        Err(err) => {
            tracing::error!(order_uid = %order_uid, error = %err, "order lookup failed");
            Err(ApiError::Internal)
        }
    }
}

/// `GET /order` and `GET /order/` — the id segment is required.
pub async fn missing_id() -> ApiError {
    ApiError::MissingId
}
