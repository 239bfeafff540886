//! Schema bootstrap for local libSQL databases.
//!
//! The correlation table normally belongs to whoever issues the tokens, so
//! remote stores are never touched. Local files and in-memory databases get
//! the tables created if they are missing, which is what development and
//! tests run against.

use libsql::Connection;
use tracing::info;

use crate::error::DatabaseError;

/// Columns the filter reads and writes on the correlation table.
const CORRELATION_COLUMNS: &[&str] = &[
    "guid",
    "seen",
    "time_taken",
    "header",
    "body",
    "received_time",
];

/// Table and column names the schema is built for.
#[derive(Debug, Clone, Copy)]
pub struct SchemaNames<'a> {
    pub lookup_table: &'a str,
    pub lookup_field: &'a str,
    pub mail_table: &'a str,
}

/// SQL creating both tables. Names must already be validated identifiers.
pub fn schema_sql(names: SchemaNames<'_>) -> String {
    let extra_field = if CORRELATION_COLUMNS.contains(&names.lookup_field) {
        String::new()
    } else {
        format!("{} TEXT,\n                ", names.lookup_field)
    };

    format!(
        r#"
            CREATE TABLE IF NOT EXISTS {lookup} (
                guid TEXT PRIMARY KEY,
                {extra_field}seen INTEGER NOT NULL DEFAULT 0,
                time_taken INTEGER,
                header TEXT,
                body TEXT,
                received_time TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_{lookup}_seen ON {lookup}(seen);

            CREATE TABLE IF NOT EXISTS {mail} (
                id TEXT PRIMARY KEY,
                subject TEXT,
                raw TEXT NOT NULL,
                received_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{mail}_received_at ON {mail}(received_at);
        "#,
        lookup = names.lookup_table,
        mail = names.mail_table,
    )
}

/// Create the correlation and mail tables if they don't exist.
pub async fn init_schema(conn: &Connection, names: SchemaNames<'_>) -> Result<(), DatabaseError> {
    conn.execute_batch(&schema_sql(names))
        .await
        .map_err(|e| DatabaseError::Migration(format!("init_schema: {e}")))?;

    info!(
        lookup_table = names.lookup_table,
        mail_table = names.mail_table,
        "Schema ready"
    );
    Ok(())
}
