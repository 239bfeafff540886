//! Persistence layer — correlation records and accepted mail.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{CorrelationStore, DeliveryUpdate, NewMail};
