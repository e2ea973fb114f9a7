//! Dead-letter envelope
//!
//! A DLQ message is the original message byte-for-byte (key, payload, and
//! headers) plus six diagnostic headers describing why and where it was
//! rejected. Envelope construction is pure so the contract is testable
//! without a broker.

use chrono::{DateTime, SecondsFormat, Utc};

/// Pipeline stage at which the message was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqStage {
    Unmarshal,
    Validation,
    Db,
}

impl DlqStage {
    pub fn as_str(self) -> &'static str {
        match self {
            DlqStage::Unmarshal => "unmarshal",
            DlqStage::Validation => "validation",
            DlqStage::Db => "db",
        }
    }
}

/// Build the full header set for a DLQ message: the original headers in
/// their original order, followed by the `dlq_*` diagnostics.
pub fn envelope_headers(
    original: &[(String, Option<Vec<u8>>)],
    stage: DlqStage,
    error: &str,
    topic: &str,
    partition: i32,
    offset: i64,
    decided_at: DateTime<Utc>,
) -> Vec<(String, Option<Vec<u8>>)> {
    let mut headers: Vec<(String, Option<Vec<u8>>)> = original.to_vec();
    let ts = decided_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
    headers.push(("dlq_error".into(), Some(error.as_bytes().to_vec())));
    headers.push(("dlq_stage".into(), Some(stage.as_str().as_bytes().to_vec())));
    headers.push(("dlq_ts".into(), Some(ts.into_bytes())));
    headers.push(("dlq_topic".into(), Some(topic.as_bytes().to_vec())));
    headers.push(("dlq_partition".into(), Some(partition.to_string().into_bytes())));
    headers.push(("dlq_offset".into(), Some(offset.to_string().into_bytes())));
    headers
}
