//! Inbound mail processing pipeline.
//!
//! Every message flows through an ordered list of stages:
//! 1. `HeadersParser` — decodes the subject
//! 2. `GuidFilter` — correlates the subject token with a lookup record,
//!    records delivery delay, annotates the envelope if it must not be kept
//! 3. `MailSaver` — stores envelopes that were not annotated `ignore`
//!
//! Stages never stop the chain to express a decision; the `Pipeline` driver
//! always calls the next one.

pub mod guid_filter;
pub mod headers;
pub mod processor;
pub mod saver;
pub mod split;
pub mod token;
pub mod trace;
pub mod types;

pub use guid_filter::GuidFilter;
pub use headers::HeadersParser;
pub use processor::{Pipeline, PipelineReport};
pub use saver::MailSaver;
pub use split::MessageSplitter;
pub use token::TokenExtractor;
pub use trace::{Timestamps, TraceTimeParser};
pub use types::{Envelope, Stage, StageOutcome, SuppressReason, Task};
