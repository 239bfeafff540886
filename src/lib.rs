//! GUID filter — correlates inbound mail with lookup records and measures
//! delivery delay from transport-trace headers.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
