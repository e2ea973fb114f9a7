//! Health check endpoint

pub async fn healthz() -> &'static str {
    "OK"
}
