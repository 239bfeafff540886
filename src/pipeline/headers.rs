//! Headers parser stage — decodes the subject line so later stages can read it.

use async_trait::async_trait;
use mail_parser::MessageParser;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::types::{Envelope, Stage, StageOutcome, Task};

/// Fills `Envelope::subject` from the raw message when it isn't set yet.
#[derive(Debug, Default)]
pub struct HeadersParser;

impl HeadersParser {
    pub fn new() -> Self {
        Self
    }
}

/// Decoded subject of a raw message, if it has one.
pub fn parse_subject(raw: &str) -> Option<String> {
    MessageParser::default()
        .parse(raw.as_bytes())
        .and_then(|parsed| parsed.subject().map(|s| s.trim().to_string()))
}

#[async_trait]
impl Stage for HeadersParser {
    fn name(&self) -> &str {
        "headers_parser"
    }

    async fn process(
        &self,
        envelope: &mut Envelope,
        task: Task,
    ) -> Result<StageOutcome, PipelineError> {
        if task != Task::SaveMail || envelope.subject.is_some() {
            return Ok(StageOutcome::Passed);
        }

        envelope.subject = parse_subject(&envelope.raw);
        debug!(subject = ?envelope.subject, "Parsed subject");
        Ok(StageOutcome::Proceed)
    }
}
