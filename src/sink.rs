//! The downstream message bus contract (§6 "Downstream sink contract") and
//! a reference in-memory implementation used by tests and examples.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::error;

use crate::emit::Record;
use crate::error::EmitError;

/// Accepts batches of records for a topic. Implementations are assumed
/// thread-safe for concurrent batch append (`spec.md` §5).
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Publish `records` under `topic`, returning how many were accepted.
    /// A return value less than `records.len()` means the tail was
    /// partially or wholly rejected; this crate logs but does not retry
    /// rejected records (retry policy is the sink's concern).
    async fn publish_batch(&self, topic: &str, records: &[Record]) -> usize;
}

/// Log one `EmitError` per record past `accepted`, per `spec.md` §4.H.5
/// ("failed records are logged individually and their payloads freed") and
/// §7 (`EmitError` — "sink rejection — logged, payload freed"). Rust's
/// ownership model frees a rejected `Record` the moment its caller drops
/// it, so this only performs the logging half.
pub fn log_rejected(records: &[Record], accepted: usize) {
    for record in &records[accepted..] {
        let monitor = record
            .field("monitor")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_owned();
        error!(
            "{}",
            EmitError::Rejected {
                monitor,
                reason: "sink did not accept record".to_owned(),
            }
        );
    }
}

/// An in-memory sink that accepts everything and remembers it, for tests
/// and examples. Not a production client — the real bus client is an
/// external collaborator (§1).
#[derive(Default)]
pub struct InMemorySink {
    published: Mutex<Vec<(String, Record)>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<(String, Record)> {
        std::mem::take(&mut self.published.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageSink for InMemorySink {
    async fn publish_batch(&self, topic: &str, records: &[Record]) -> usize {
        let mut published = self.published.lock().unwrap();
        published.extend(records.iter().cloned().map(|r| (topic.to_owned(), r)));
        records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Monitor;
    use crate::value::Value;
    use serde_json::{json, Map};

    #[tokio::test]
    async fn accepts_and_remembers_everything() {
        let sink = InMemorySink::new();
        let m = Monitor::from_json(&json!({"name": "x", "system": "echo 1"}), &Map::new()).unwrap();
        let mut records = Vec::new();
        crate::emit::emit(&Value::Number(1.0), &m, 0, &mut records);

        let accepted = sink.publish_batch("metrics", &records).await;
        assert_eq!(accepted, 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn log_rejected_does_not_panic_on_a_partial_accept() {
        let m = Monitor::from_json(&json!({"name": "x", "system": "echo 1"}), &Map::new()).unwrap();
        let mut records = Vec::new();
        crate::emit::emit(&Value::Number(1.0), &m, 0, &mut records);
        crate::emit::emit(&Value::Number(2.0), &m, 0, &mut records);

        // Only the first record was accepted; the rest must be logged
        // individually, not panic on an out-of-bounds slice.
        log_rejected(&records, 1);
    }
}
