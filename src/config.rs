//! Configuration types.
//!
//! Everything is read from environment variables at startup. The `from_lookup`
//! constructors take a lookup closure so tests don't have to touch the process
//! environment.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Default correlation marker searched for in the subject.
pub const DEFAULT_MARKER: &str = "guid:";

/// Default table the mail saver writes accepted messages into.
pub const DEFAULT_MAIL_TABLE: &str = "mails";

/// Default local database path.
pub const DEFAULT_DB_PATH: &str = "./data/guid-filter.db";

/// Where the correlation store lives.
#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    /// Local libSQL/SQLite file.
    Local { path: PathBuf },
    /// Remote libSQL server.
    Remote { url: String, auth_token: SecretString },
}

/// GUID filter configuration.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// Table holding correlation records.
    pub lookup_table: String,
    /// Column read back when a record matches.
    pub lookup_field: String,
    /// Literal marker that precedes the token in the subject.
    pub marker: String,
    /// Table accepted messages are saved into.
    pub mail_table: String,
    /// Store connection.
    pub database: DatabaseConfig,
}

impl FilterConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let lookup_table = required("GUID_FILTER_LOOKUP_TABLE")?;
        let lookup_field = required("GUID_FILTER_LOOKUP_FIELD")?;

        let marker = lookup("GUID_FILTER_MARKER")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_MARKER.to_string());

        let mail_table =
            lookup("GUID_FILTER_MAIL_TABLE").unwrap_or_else(|| DEFAULT_MAIL_TABLE.to_string());

        let database = match lookup("GUID_FILTER_DB_URL") {
            Some(url) => DatabaseConfig::Remote {
                url,
                auth_token: SecretString::from(
                    lookup("GUID_FILTER_DB_AUTH_TOKEN").unwrap_or_default(),
                ),
            },
            None => DatabaseConfig::Local {
                path: lookup("GUID_FILTER_DB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            },
        };

        let config = Self {
            lookup_table,
            lookup_field,
            marker,
            mail_table,
            database,
        };
        config.validate()?;
        Ok(config)
    }

    /// Table and column names end up inside SQL text, so they must be plain identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("GUID_FILTER_LOOKUP_TABLE", &self.lookup_table)?;
        check_identifier("GUID_FILTER_LOOKUP_FIELD", &self.lookup_field)?;
        check_identifier("GUID_FILTER_MAIL_TABLE", &self.mail_table)?;
        if self.lookup_table == self.mail_table {
            return Err(ConfigError::InvalidValue {
                key: "GUID_FILTER_MAIL_TABLE".into(),
                message: "must differ from the lookup table".into(),
            });
        }
        Ok(())
    }
}

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

fn check_identifier(key: &str, value: &str) -> Result<(), ConfigError> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{value:?} is not a valid SQL identifier"),
        })
    }
}
