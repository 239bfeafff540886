//! GUID filter — gates persistence on a correlation record and records
//! delivery delay for the messages that match one.
//!
//! Flow for `Task::SaveMail`:
//! 1. Extract the token from the subject → none: suppress
//! 2. Look up an unseen record → missing or store error: suppress
//! 3. Parse `Received:` timestamps → delay in seconds
//! 4. Split header/body and write everything back, marking the record seen
//!
//! Nothing here halts the chain. Suppression is an annotation on the envelope
//! that the mail saver honours further down.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::FilterConfig;
use crate::error::{ConfigError, Error, PipelineError};
use crate::pipeline::split::{MessageSplitter, parse_message};
use crate::pipeline::token::TokenExtractor;
use crate::pipeline::trace::{Timestamps, TraceTimeParser};
use crate::pipeline::types::{Envelope, Stage, StageOutcome, SuppressReason, Task};
use crate::store::{CorrelationStore, DeliveryUpdate};

/// Header carrying per-hop transport timestamps.
const TRACE_HEADER: &str = "Received";

/// Stage that correlates inbound mail with records in the lookup table.
pub struct GuidFilter {
    store: Arc<dyn CorrelationStore>,
    tokens: TokenExtractor,
    trace_times: TraceTimeParser,
    splitter: MessageSplitter,
}

impl GuidFilter {
    /// Build the filter. Patterns are compiled here, once.
    pub fn new(
        store: Arc<dyn CorrelationStore>,
        config: &FilterConfig,
    ) -> Result<Self, ConfigError> {
        let tokens = TokenExtractor::new(&config.marker).map_err(|e| ConfigError::InvalidValue {
            key: "GUID_FILTER_MARKER".into(),
            message: e.to_string(),
        })?;

        Ok(Self {
            store,
            tokens,
            trace_times: TraceTimeParser::new(),
            splitter: MessageSplitter::new(),
        })
    }

    /// Build the filter and probe the lookup table.
    ///
    /// A store that cannot read the table keeps the stage from activating.
    pub async fn activate(
        store: Arc<dyn CorrelationStore>,
        config: &FilterConfig,
    ) -> Result<Self, Error> {
        info!(table = %config.lookup_table, "Initializing GUID filter");
        let filter = Self::new(store, config)?;
        filter.store.check_access().await?;
        Ok(filter)
    }

    /// Decide whether the envelope may be stored, annotating it if not.
    pub async fn filter(&self, envelope: &mut Envelope) -> StageOutcome {
        let subject = envelope.subject.as_deref().unwrap_or_default();

        let Some(guid) = self.tokens.extract(subject).map(str::to_string) else {
            warn!(subject = %subject, "Could not extract GUID from the subject");
            return suppress(envelope, SuppressReason::NoToken);
        };

        match self.store.find_unseen(&guid).await {
            Ok(Some(value)) => {
                debug!(guid = %guid, value = %value, "GUID matched an unseen record");
            }
            Ok(None) => {
                info!(guid = %guid, "GUID not found or it was already seen");
                return suppress(envelope, SuppressReason::NotFound { guid });
            }
            Err(e) => {
                // Store outages suppress too; see DESIGN.md.
                error!(guid = %guid, error = %e, "Could not lookup GUID");
                return suppress(
                    envelope,
                    SuppressReason::LookupFailed {
                        guid,
                        error: e.to_string(),
                    },
                );
            }
        }

        let delay_secs = self.received_times(&envelope.raw).delay_secs();

        let parts = match self.splitter.split(&envelope.raw) {
            Ok(parts) => parts,
            Err(failure) => {
                error!(guid = %guid, error = %failure, "Could not parse header and body of email");
                failure.partial
            }
        };

        let update = DeliveryUpdate {
            guid,
            delay_secs,
            header: parts.header,
            body: parts.body,
            processed_at: Utc::now(),
        };

        match self.store.record_delivery(&update).await {
            Ok(0) => warn!(guid = %update.guid, "Delay update matched no record"),
            Ok(_) => info!(
                guid = %update.guid,
                delay_secs = update.delay_secs,
                "Updated delay"
            ),
            Err(e) => error!(guid = %update.guid, error = %e, "Could not update delay"),
        }

        StageOutcome::Proceed
    }

    /// Timestamps from every parseable `Received:` header.
    fn received_times(&self, raw: &str) -> Timestamps {
        match parse_message(raw) {
            Ok(parsed) => self.trace_times.collect(parsed.header_values(TRACE_HEADER)),
            Err(e) => {
                debug!(error = %e, "No trace headers readable");
                Timestamps::default()
            }
        }
    }
}

fn suppress(envelope: &mut Envelope, reason: SuppressReason) -> StageOutcome {
    envelope.mark_ignored();
    StageOutcome::Suppressed(reason)
}

#[async_trait]
impl Stage for GuidFilter {
    fn name(&self) -> &str {
        "guid_filter"
    }

    async fn process(
        &self,
        envelope: &mut Envelope,
        task: Task,
    ) -> Result<StageOutcome, PipelineError> {
        if task != Task::SaveMail {
            return Ok(StageOutcome::Passed);
        }
        Ok(self.filter(envelope).await)
    }
}
