//! Shared types for the message processing pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Annotation key telling downstream storage stages to skip the message.
pub const IGNORE_KEY: &str = "ignore";

// ── Envelope ────────────────────────────────────────────────────────

/// One inbound email travelling through the pipeline.
///
/// Stages treat `raw` and `subject` as read-only; the only thing they are
/// expected to change is the `values` annotation map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Full RFC 5322 text as received.
    pub raw: String,
    /// Decoded subject line, filled by the headers parser.
    pub subject: Option<String>,
    /// Annotations written by stages for stages further down the chain.
    pub values: HashMap<String, serde_json::Value>,
    /// When the message arrived.
    pub received_at: DateTime<Utc>,
}

impl Envelope {
    /// Wrap a raw message received now.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            subject: None,
            values: HashMap::new(),
            received_at: Utc::now(),
        }
    }

    /// Set an already-parsed subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Mark the envelope so storage stages skip it.
    pub fn mark_ignored(&mut self) {
        self.values
            .insert(IGNORE_KEY.to_string(), serde_json::Value::Bool(true));
    }

    /// Whether some stage asked for this envelope not to be stored.
    pub fn is_ignored(&self) -> bool {
        self.values
            .get(IGNORE_KEY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

// ── Task ────────────────────────────────────────────────────────────

/// What the pipeline is being asked to do with an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Persist a fully received message.
    SaveMail,
    /// Check a recipient before data is accepted.
    ValidateRecipient,
}

// ── Stage outcome ───────────────────────────────────────────────────

/// Why the GUID filter asked for a message to be suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuppressReason {
    /// Subject carries no correlation token.
    NoToken,
    /// No unseen record exists for the token.
    NotFound { guid: String },
    /// The store could not be queried.
    LookupFailed { guid: String, error: String },
}

impl SuppressReason {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoToken => "no_token",
            Self::NotFound { .. } => "not_found",
            Self::LookupFailed { .. } => "lookup_failed",
        }
    }
}

/// What a single stage did with an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Stage does not handle this task.
    Passed,
    /// Stage handled the envelope and let it proceed.
    Proceed,
    /// Stage annotated the envelope for suppression.
    Suppressed(SuppressReason),
    /// Envelope was written to storage under this id.
    Saved { id: String },
    /// Storage stage skipped an ignored envelope.
    Skipped,
}

impl StageOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Proceed => "proceed",
            Self::Suppressed(_) => "suppressed",
            Self::Saved { .. } => "saved",
            Self::Skipped => "skipped",
        }
    }
}

// ── Stage trait ─────────────────────────────────────────────────────

/// One link in the processing chain.
///
/// Stages never call each other; the `Pipeline` driver invokes them in order
/// and every stage gets to see the envelope unless an earlier one errors.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logging.
    fn name(&self) -> &str;

    /// Handle one envelope for the given task.
    async fn process(
        &self,
        envelope: &mut Envelope,
        task: Task,
    ) -> Result<StageOutcome, PipelineError>;
}
