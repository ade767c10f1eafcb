//! Failure log hook for deliveries that exhausted the gateway catalog.
//!
//! The engine hands one [`FailedDeliveryRecord`] to a [`FailedDeliverySink`]
//! per failed send. Where the record ends up is the sink's concern; this
//! module ships a tracing-backed sink and an append-only JSONL file sink.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDeliveryRecord {
    pub timestamp: String,
    pub recipient: String,
    pub message_text: String,
    pub error_reason: String,
    pub fallback_url: Option<String>,
    pub status: String,
}

impl FailedDeliveryRecord {
    pub fn new(
        recipient: &str,
        message_text: &str,
        error_reason: &str,
        fallback_url: Option<&str>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            recipient: recipient.to_string(),
            message_text: message_text.to_string(),
            error_reason: error_reason.to_string(),
            fallback_url: fallback_url.map(str::to_string),
            status: "failed".to_string(),
        }
    }
}

/// Destination for failed-delivery records.
pub trait FailedDeliverySink: Send + Sync {
    fn record_failure(&self, record: &FailedDeliveryRecord) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
/// Emits each record as a structured `warn` event.
pub struct TracingFailureSink;

impl FailedDeliverySink for TracingFailureSink {
    fn record_failure(&self, record: &FailedDeliveryRecord) -> Result<()> {
        tracing::warn!(
            target: "storefront_notify::failed_delivery",
            timestamp = %record.timestamp,
            recipient = %record.recipient,
            error_reason = %record.error_reason,
            fallback_url = record.fallback_url.as_deref().unwrap_or(""),
            message_chars = record.message_text.chars().count(),
            "message delivery failed; manual follow-up required"
        );
        Ok(())
    }
}

#[derive(Clone)]
/// Appends one JSON object per line to a file for manual processing.
pub struct JsonlFailureLog {
    path: PathBuf,
    file: Arc<Mutex<std::fs::File>>,
}

impl JsonlFailureLog {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "failed to create failure log directory {}",
                        parent.display()
                    )
                })?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open failure log {}", path.display()))?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FailedDeliverySink for JsonlFailureLog {
    fn record_failure(&self, record: &FailedDeliveryRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("failed to encode failure record")?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("failure log file lock is poisoned"))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to write failure log {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush failure log {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tempfile::tempdir;

    use super::{FailedDeliveryRecord, FailedDeliverySink, JsonlFailureLog, TracingFailureSink};

    #[test]
    fn unit_record_carries_failed_status_and_rfc3339_timestamp() {
        let record = FailedDeliveryRecord::new("+919876543210", "hi", "all failed", None);
        assert_eq!(record.status, "failed");
        assert!(chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok());
        TracingFailureSink
            .record_failure(&record)
            .expect("tracing sink never fails");
    }

    #[test]
    fn functional_jsonl_log_appends_one_line_per_record() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("failed-messages.jsonl");
        let log = JsonlFailureLog::open(path.clone()).expect("open log");

        for index in 0..2 {
            let record = FailedDeliveryRecord::new(
                "+919876543210",
                &format!("message {index}"),
                "catalog exhausted",
                Some("https://wa.me/919876543210?text=x"),
            );
            log.record_failure(&record).expect("write record");
        }

        let raw = std::fs::read_to_string(&path).expect("read log");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let second: Value = serde_json::from_str(lines[1]).expect("json line");
        assert_eq!(second["message_text"], "message 1");
        assert_eq!(second["status"], "failed");
        assert_eq!(
            second["fallback_url"],
            "https://wa.me/919876543210?text=x"
        );
        assert_eq!(log.path(), path.as_path());
    }
}
