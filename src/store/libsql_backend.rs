//! libSQL backend — async `CorrelationStore` implementation.
//!
//! Supports local files, in-memory databases and remote libSQL servers.
//! Table and column names come from configuration and are interpolated into
//! the SQL text, so they must be validated identifiers (see
//! `FilterConfig::validate`).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::ExposeSecret;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{DatabaseConfig, FilterConfig};
use crate::error::DatabaseError;
use crate::store::migrations::{self, SchemaNames};
use crate::store::traits::{CorrelationStore, DeliveryUpdate, NewMail};

/// libSQL-backed correlation store.
///
/// Holds one connection reused for every query. `libsql::Connection` is
/// `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    lookup_table: String,
    lookup_field: String,
    mail_table: String,
}

impl LibSqlStore {
    /// Open the store described by `config`.
    ///
    /// Local databases get their schema created if missing; remote ones are
    /// used as-is.
    pub async fn connect(config: &FilterConfig) -> Result<Self, DatabaseError> {
        match &config.database {
            DatabaseConfig::Local { path } => Self::new_local(path, config).await,
            DatabaseConfig::Remote { url, auth_token } => {
                let db = libsql::Builder::new_remote(
                    url.clone(),
                    auth_token.expose_secret().to_string(),
                )
                .build()
                .await
                .map_err(|e| {
                    DatabaseError::Connection(format!("Failed to open remote database: {e}"))
                })?;
                let store = Self::from_database(db, config)?;
                info!(url = %url, "Connected to remote libSQL database");
                Ok(store)
            }
        }
    }

    /// Open (or create) a local database file and create missing tables.
    pub async fn new_local(path: &Path, config: &FilterConfig) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open libSQL database: {e}"))
            })?;

        let store = Self::from_database(db, config)?;
        store.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(config: &FilterConfig) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let store = Self::from_database(db, config)?;
        store.init_schema().await?;
        Ok(store)
    }

    fn from_database(db: LibSqlDatabase, config: &FilterConfig) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        Ok(Self {
            db: Arc::new(db),
            conn,
            lookup_table: config.lookup_table.clone(),
            lookup_field: config.lookup_field.clone(),
            mail_table: config.mail_table.clone(),
        })
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::init_schema(
            self.conn(),
            SchemaNames {
                lookup_table: &self.lookup_table,
                lookup_field: &self.lookup_field,
                mail_table: &self.mail_table,
            },
        )
        .await
    }

    /// Get the connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Render whatever type the lookup column holds as text.
fn value_to_string(value: libsql::Value) -> String {
    match value {
        libsql::Value::Null => String::new(),
        libsql::Value::Integer(i) => i.to_string(),
        libsql::Value::Real(f) => f.to_string(),
        libsql::Value::Text(s) => s,
        libsql::Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl CorrelationStore for LibSqlStore {
    async fn check_access(&self) -> Result<(), DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT * FROM {} LIMIT 1", self.lookup_table), ())
            .await
            .map_err(|e| DatabaseError::Access {
                table: self.lookup_table.clone(),
                reason: e.to_string(),
            })?;

        rows.next().await.map_err(|e| DatabaseError::Access {
            table: self.lookup_table.clone(),
            reason: e.to_string(),
        })?;

        debug!(table = %self.lookup_table, "Lookup table is readable");
        Ok(())
    }

    async fn find_unseen(&self, guid: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {} FROM {} WHERE guid = ?1 AND seen = 0",
                    self.lookup_field, self.lookup_table
                ),
                params![guid],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_unseen: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value = row
                    .get_value(0)
                    .map_err(|e| DatabaseError::Query(format!("find_unseen row parse: {e}")))?;
                Ok(Some(value_to_string(value)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_unseen: {e}"))),
        }
    }

    async fn record_delivery(&self, update: &DeliveryUpdate) -> Result<u64, DatabaseError> {
        let stmt = self
            .conn()
            .prepare(&format!(
                "UPDATE {} SET time_taken = ?1, header = ?2, body = ?3, received_time = ?4, seen = 1 WHERE guid = ?5",
                self.lookup_table
            ))
            .await
            .map_err(|e| DatabaseError::Prepare(format!("record_delivery: {e}")))?;

        let updated = stmt
            .execute(params![
                update.delay_secs,
                update.header.as_str(),
                update.body.as_str(),
                update.processed_at.to_rfc3339(),
                update.guid.as_str(),
            ])
            .await
            .map_err(|e| DatabaseError::Query(format!("record_delivery: {e}")))?;

        debug!(guid = %update.guid, rows = updated, "Delivery recorded");
        Ok(updated as u64)
    }

    async fn insert_mail(&self, mail: &NewMail) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO {} (id, subject, raw, received_at, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    self.mail_table
                ),
                params![
                    id.clone(),
                    opt_text(mail.subject.as_deref()),
                    mail.raw.as_str(),
                    mail.received_at.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_mail: {e}")))?;

        debug!(id = %id, table = %self.mail_table, "Mail inserted into DB");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config() -> FilterConfig {
        FilterConfig {
            lookup_table: "pings".into(),
            lookup_field: "account".into(),
            marker: "guid:".into(),
            mail_table: "mails".into(),
            database: DatabaseConfig::Local {
                path: PathBuf::from(":memory:"),
            },
        }
    }

    async fn test_db() -> LibSqlStore {
        LibSqlStore::new_memory(&test_config()).await.unwrap()
    }

    async fn seed(db: &LibSqlStore, guid: &str, account: &str, seen: i64) {
        db.conn()
            .execute(
                "INSERT INTO pings (guid, account, seen) VALUES (?1, ?2, ?3)",
                params![guid, account, seen],
            )
            .await
            .unwrap();
    }

    async fn fetch_delivery(db: &LibSqlStore, guid: &str) -> (i64, i64, String, String, String) {
        let mut rows = db
            .conn()
            .query(
                "SELECT seen, time_taken, header, body, received_time FROM pings WHERE guid = ?1",
                params![guid],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        (
            row.get(0).unwrap(),
            row.get(1).unwrap(),
            row.get(2).unwrap(),
            row.get(3).unwrap(),
            row.get(4).unwrap(),
        )
    }

    #[tokio::test]
    async fn check_access_on_existing_table() {
        let db = test_db().await;
        db.check_access().await.unwrap();
    }

    #[tokio::test]
    async fn check_access_fails_for_missing_table() {
        let db = test_db().await;
        db.conn().execute("DROP TABLE pings", ()).await.unwrap();
        let err = db.check_access().await.unwrap_err();
        assert!(matches!(err, DatabaseError::Access { ref table, .. } if table == "pings"));
    }

    #[tokio::test]
    async fn find_unseen_returns_lookup_field() {
        let db = test_db().await;
        seed(&db, "abc", "acme", 0).await;
        assert_eq!(db.find_unseen("abc").await.unwrap().as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn find_unseen_ignores_seen_records() {
        let db = test_db().await;
        seed(&db, "abc", "acme", 1).await;
        assert!(db.find_unseen("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_unseen_unknown_guid() {
        let db = test_db().await;
        assert!(db.find_unseen("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_unseen_renders_integer_field() {
        let mut config = test_config();
        config.lookup_field = "seen".into();
        let db = LibSqlStore::new_memory(&config).await.unwrap();
        db.conn()
            .execute("INSERT INTO pings (guid, seen) VALUES ('g', 0)", ())
            .await
            .unwrap();
        assert_eq!(db.find_unseen("g").await.unwrap().as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn record_delivery_marks_seen() {
        let db = test_db().await;
        seed(&db, "abc", "acme", 0).await;

        let processed_at = Utc::now();
        let updated = db
            .record_delivery(&DeliveryUpdate {
                guid: "abc".into(),
                delay_secs: 42,
                header: "Subject: hi".into(),
                body: "hello".into(),
                processed_at,
            })
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let (seen, time_taken, header, body, received_time) = fetch_delivery(&db, "abc").await;
        assert_eq!(seen, 1);
        assert_eq!(time_taken, 42);
        assert_eq!(header, "Subject: hi");
        assert_eq!(body, "hello");
        assert_eq!(received_time, processed_at.to_rfc3339());

        // Once seen, the record no longer matches the lookup.
        assert!(db.find_unseen("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_delivery_unknown_guid_updates_nothing() {
        let db = test_db().await;
        let updated = db
            .record_delivery(&DeliveryUpdate {
                guid: "ghost".into(),
                delay_secs: 1,
                header: String::new(),
                body: String::new(),
                processed_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn record_delivery_prepare_failure() {
        let db = test_db().await;
        db.conn().execute("DROP TABLE pings", ()).await.unwrap();
        let err = db
            .record_delivery(&DeliveryUpdate {
                guid: "abc".into(),
                delay_secs: 1,
                header: String::new(),
                body: String::new(),
                processed_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Prepare(_)));
    }

    #[tokio::test]
    async fn insert_mail_returns_id() {
        let db = test_db().await;
        let id = db
            .insert_mail(&NewMail {
                subject: Some("hello".into()),
                raw: "Subject: hello\n\nbody".into(),
                received_at: Utc::now(),
            })
            .await
            .unwrap();

        let mut rows = db
            .conn()
            .query("SELECT subject, raw FROM mails WHERE id = ?1", params![id])
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let subject: String = row.get(0).unwrap();
        let raw: String = row.get(1).unwrap();
        assert_eq!(subject, "hello");
        assert_eq!(raw, "Subject: hello\n\nbody");
    }

    #[tokio::test]
    async fn new_local_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("test.db");
        let db = LibSqlStore::new_local(&db_path, &test_config()).await.unwrap();
        db.check_access().await.unwrap();
        assert!(db_path.exists());
    }
}
