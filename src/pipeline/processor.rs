//! Pipeline driver — runs an envelope through an ordered list of stages.
//!
//! Every stage sees the envelope in turn; a stage's decision travels as an
//! annotation, not by stopping the chain. Only a stage error halts it.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::FilterConfig;
use crate::error::{Error, PipelineError};
use crate::pipeline::guid_filter::GuidFilter;
use crate::pipeline::headers::HeadersParser;
use crate::pipeline::saver::MailSaver;
use crate::pipeline::types::{Envelope, Stage, StageOutcome, Task};
use crate::store::CorrelationStore;

/// What happened to one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// `(stage name, outcome)` in execution order.
    pub outcomes: Vec<(String, StageOutcome)>,
    /// Whether the envelope ended up annotated `ignore`.
    pub suppressed: bool,
}

impl PipelineReport {
    /// Outcome reported by the named stage, if it ran.
    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, outcome)| outcome)
    }
}

/// Ordered list of stages built by the host.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage.
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Assemble `headers_parser → guid_filter → mail_saver`.
    ///
    /// Fails if the GUID filter cannot activate against the store.
    pub async fn standard(
        config: &FilterConfig,
        store: Arc<dyn CorrelationStore>,
    ) -> Result<Self, Error> {
        let filter = GuidFilter::activate(Arc::clone(&store), config).await?;
        let pipeline = Self::new()
            .with_stage(Arc::new(HeadersParser::new()))
            .with_stage(Arc::new(filter))
            .with_stage(Arc::new(MailSaver::new(store)));
        info!(stages = ?pipeline.stage_names(), "Pipeline assembled");
        Ok(pipeline)
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one envelope through every stage.
    pub async fn process(
        &self,
        envelope: &mut Envelope,
        task: Task,
    ) -> Result<PipelineReport, PipelineError> {
        let mut outcomes = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            match stage.process(envelope, task).await {
                Ok(outcome) => {
                    debug!(stage = stage.name(), outcome = outcome.label(), "Stage complete");
                    outcomes.push((stage.name().to_string(), outcome));
                }
                Err(e) => {
                    error!(stage = stage.name(), error = %e, "Stage failed");
                    return Err(e);
                }
            }
        }

        Ok(PipelineReport {
            outcomes,
            suppressed: envelope.is_ignored(),
        })
    }

    /// Process a batch of envelopes independently.
    ///
    /// Failures on individual envelopes are logged but don't fail the batch.
    pub async fn process_batch(
        &self,
        envelopes: Vec<Envelope>,
        task: Task,
    ) -> Vec<(Envelope, Result<PipelineReport, PipelineError>)> {
        let count = envelopes.len();
        info!(count, "Processing envelope batch");

        let mut results = Vec::with_capacity(count);
        for mut envelope in envelopes {
            let result = self.process(&mut envelope, task).await;
            results.push((envelope, result));
        }

        info!(
            succeeded = results.iter().filter(|(_, r)| r.is_ok()).count(),
            total = count,
            "Batch processing complete"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::pipeline::guid_filter::tests::{RecordingStore, TWO_HOP_MESSAGE, test_config};

    /// Stage that always fails.
    struct Broken;

    #[async_trait]
    impl Stage for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn process(
            &self,
            _envelope: &mut Envelope,
            _task: Task,
        ) -> Result<StageOutcome, PipelineError> {
            Err(PipelineError::Stage {
                stage: "broken".into(),
                reason: "always fails".into(),
            })
        }
    }

    #[tokio::test]
    async fn standard_pipeline_order() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = Pipeline::standard(&test_config(), store).await.unwrap();
        assert_eq!(
            pipeline.stage_names(),
            vec!["headers_parser", "guid_filter", "mail_saver"]
        );
    }

    #[tokio::test]
    async fn standard_pipeline_refuses_unreadable_store() {
        let store = Arc::new(RecordingStore {
            fail_access: true,
            ..RecordingStore::default()
        });
        assert!(Pipeline::standard(&test_config(), store).await.is_err());
    }

    #[tokio::test]
    async fn matched_message_is_saved() {
        let store = Arc::new(RecordingStore::with_unseen("XYZ", "acme"));
        let pipeline = Pipeline::standard(&test_config(), store.clone())
            .await
            .unwrap();
        let mut envelope = Envelope::new(TWO_HOP_MESSAGE);

        let report = pipeline.process(&mut envelope, Task::SaveMail).await.unwrap();

        assert!(!report.suppressed);
        assert_eq!(report.outcome("guid_filter"), Some(&StageOutcome::Proceed));
        assert!(matches!(
            report.outcome("mail_saver"),
            Some(StageOutcome::Saved { .. })
        ));
        assert_eq!(store.writes.lock().unwrap()[0].delay_secs, 60);
        assert_eq!(store.mails.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn suppressed_message_still_reaches_saver() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = Pipeline::standard(&test_config(), store.clone())
            .await
            .unwrap();
        let mut envelope = Envelope::new("Subject: no token\n\nbody");

        let report = pipeline.process(&mut envelope, Task::SaveMail).await.unwrap();

        assert!(report.suppressed);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcome("mail_saver"), Some(&StageOutcome::Skipped));
        assert!(store.mails.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stage_error_halts_chain() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = Pipeline::new()
            .with_stage(Arc::new(Broken))
            .with_stage(Arc::new(MailSaver::new(store.clone())));
        let mut envelope = Envelope::new("Subject: x\n\nbody");

        let err = pipeline
            .process(&mut envelope, Task::SaveMail)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Stage { .. }));
        assert!(store.mails.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_keeps_going_after_failure() {
        let pipeline = Pipeline::new().with_stage(Arc::new(Broken));
        let results = pipeline
            .process_batch(
                vec![Envelope::new("a"), Envelope::new("b")],
                Task::SaveMail,
            )
            .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_err()));
    }

    #[tokio::test]
    async fn empty_pipeline_reports_nothing() {
        let mut envelope = Envelope::new("x");
        let report = Pipeline::new()
            .process(&mut envelope, Task::ValidateRecipient)
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert!(!report.suppressed);
    }
}
