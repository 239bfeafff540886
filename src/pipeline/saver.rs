//! Mail saver stage — persists accepted messages, skipping ignored ones.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::pipeline::types::{Envelope, Stage, StageOutcome, Task};
use crate::store::{CorrelationStore, NewMail};

/// Writes every envelope not annotated `ignore` to the mail table.
pub struct MailSaver {
    store: Arc<dyn CorrelationStore>,
}

impl MailSaver {
    pub fn new(store: Arc<dyn CorrelationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for MailSaver {
    fn name(&self) -> &str {
        "mail_saver"
    }

    async fn process(
        &self,
        envelope: &mut Envelope,
        task: Task,
    ) -> Result<StageOutcome, PipelineError> {
        if task != Task::SaveMail {
            return Ok(StageOutcome::Passed);
        }

        if envelope.is_ignored() {
            debug!(subject = ?envelope.subject, "Envelope marked ignore, not saving");
            return Ok(StageOutcome::Skipped);
        }

        let id = self
            .store
            .insert_mail(&NewMail {
                subject: envelope.subject.clone(),
                raw: envelope.raw.clone(),
                received_at: envelope.received_at,
            })
            .await?;

        info!(id = %id, "Saved mail");
        Ok(StageOutcome::Saved { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::guid_filter::tests::RecordingStore;

    #[tokio::test]
    async fn saves_accepted_envelope() {
        let store = Arc::new(RecordingStore::default());
        let saver = MailSaver::new(store.clone());
        let mut envelope = Envelope::new("Subject: hi\n\nbody").with_subject("hi");

        let outcome = saver.process(&mut envelope, Task::SaveMail).await.unwrap();

        assert_eq!(outcome, StageOutcome::Saved { id: "mail-1".into() });
        let mails = store.mails.lock().unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].subject.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn skips_ignored_envelope() {
        let store = Arc::new(RecordingStore::default());
        let saver = MailSaver::new(store.clone());
        let mut envelope = Envelope::new("Subject: hi\n\nbody");
        envelope.mark_ignored();

        let outcome = saver.process(&mut envelope, Task::SaveMail).await.unwrap();

        assert_eq!(outcome, StageOutcome::Skipped);
        assert!(store.mails.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_tasks_pass_through() {
        let store = Arc::new(RecordingStore::default());
        let saver = MailSaver::new(store.clone());
        let mut envelope = Envelope::new("Subject: hi\n\nbody");

        let outcome = saver
            .process(&mut envelope, Task::ValidateRecipient)
            .await
            .unwrap();

        assert_eq!(outcome, StageOutcome::Passed);
        assert!(store.mails.lock().unwrap().is_empty());
    }
}
