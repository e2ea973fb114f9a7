//! Metrics exposition endpoint

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn serve(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.metrics.render().map_err(|err| {
        tracing::error!(error = %err, "failed to render metrics");
        ApiError::Internal
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
