use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use guid_filter::config::FilterConfig;
use guid_filter::pipeline::{Envelope, Pipeline, Task};
use guid_filter::store::{CorrelationStore, LibSqlStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = FilterConfig::from_env().context("Failed to load configuration")?;

    let store: Arc<dyn CorrelationStore> = Arc::new(
        LibSqlStore::connect(&config)
            .await
            .context("Failed to open correlation store")?,
    );

    let pipeline = Pipeline::standard(&config, store)
        .await
        .context("GUID filter could not be activated")?;

    let envelopes = read_envelopes().await?;
    let results = pipeline.process_batch(envelopes, Task::SaveMail).await;

    let mut failed = 0;
    for (envelope, result) in &results {
        let subject = envelope.subject.as_deref().unwrap_or("(no subject)");
        match result {
            Ok(report) => {
                let outcomes: Vec<String> = report
                    .outcomes
                    .iter()
                    .map(|(stage, outcome)| format!("{stage}={}", outcome.label()))
                    .collect();
                println!(
                    "{} | {} | {}",
                    if report.suppressed { "suppressed" } else { "accepted" },
                    subject,
                    outcomes.join(" ")
                );
            }
            Err(e) => {
                failed += 1;
                println!("failed | {subject} | {e}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} message(s) failed", results.len());
    }
    Ok(())
}

/// Messages to process: one per path argument, or a single one from stdin.
async fn read_envelopes() -> anyhow::Result<Vec<Envelope>> {
    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();

    if paths.is_empty() {
        let mut raw = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut raw)
            .await
            .context("Failed to read message from stdin")?;
        return Ok(vec![Envelope::new(String::from_utf8_lossy(&raw))]);
    }

    let mut envelopes = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        envelopes.push(Envelope::new(String::from_utf8_lossy(&raw)));
    }
    Ok(envelopes)
}

/// Log to stderr, plus a file when `GUID_FILTER_LOG_DIR` is set.
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let log_dir = std::env::var("GUID_FILTER_LOG_DIR")
        .ok()
        .and_then(prepare_log_dir);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, "guid-filter.log");
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

/// Create the log directory, or warn and fall back to stderr-only logging.
///
/// Runs before the subscriber exists, so the warning goes straight to stderr.
fn prepare_log_dir(dir: String) -> Option<String> {
    match std::fs::create_dir_all(&dir) {
        Ok(()) => Some(dir),
        Err(e) => {
            eprintln!(
                "Warning: could not create log directory {dir}: {e}; logging to stderr only"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs/nested");
        let dir = dir.to_string_lossy().into_owned();

        assert_eq!(prepare_log_dir(dir.clone()), Some(dir.clone()));
        assert!(std::path::Path::new(&dir).is_dir());
    }

    #[test]
    fn unusable_log_dir_falls_back() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        // A regular file cannot hold a subdirectory.
        let dir = tmp.path().join("logs").to_string_lossy().into_owned();

        assert_eq!(prepare_log_dir(dir), None);
    }
}
