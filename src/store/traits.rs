//! `CorrelationStore` trait — the async interface the pipeline persists through.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// Values written back to a correlation record once its message arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryUpdate {
    /// Token the record is keyed by.
    pub guid: String,
    /// Seconds between the earliest and latest `Received:` timestamp.
    pub delay_secs: i64,
    /// Raw header block.
    pub header: String,
    /// Raw body.
    pub body: String,
    /// Wall-clock time the message was processed.
    pub processed_at: DateTime<Utc>,
}

/// A message accepted for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMail {
    pub subject: Option<String>,
    pub raw: String,
    pub received_at: DateTime<Utc>,
}

/// Storage backing the GUID filter and the mail saver.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Confirm the lookup table is readable. Used as the startup probe.
    async fn check_access(&self) -> Result<(), DatabaseError>;

    /// Look up an unseen record by token, returning the configured lookup field.
    ///
    /// `Ok(None)` means no record exists or it was already seen.
    async fn find_unseen(&self, guid: &str) -> Result<Option<String>, DatabaseError>;

    /// Store the delivery metrics and mark the record seen.
    /// Returns the number of rows updated.
    async fn record_delivery(&self, update: &DeliveryUpdate) -> Result<u64, DatabaseError>;

    /// Persist an accepted message. Returns the generated id.
    async fn insert_mail(&self, mail: &NewMail) -> Result<String, DatabaseError>;
}
