//! Error types for ingestion, persistence, querying and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort an ingestion run.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The raw source file does not exist
    #[error("source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// The raw source could not be read as delimited text
    #[error("malformed source {}: {reason}", path.display())]
    MalformedSource { path: PathBuf, reason: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors raised while writing the normalized table to the store.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The database file's parent directory is not there
    #[error("parent directory of {} does not exist", path.display())]
    MissingParent { path: PathBuf },

    /// Open, lock, DDL or append failure reported by DuckDB
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
}

/// Errors returned by the query service.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The queried table (or the database file holding it) does not exist
    #[error("catalog object missing: {object}: {message}")]
    CatalogMissing { object: String, message: String },

    /// Any other failure reported by the engine, with its diagnostic text
    #[error("{message}")]
    Execution { message: String },

    /// Result conversion panicked; the panic was contained
    #[error("query aborted: {message}")]
    Panicked { message: String },
}

impl QueryError {
    pub fn is_catalog_missing(&self) -> bool {
        matches!(self, QueryError::CatalogMissing { .. })
    }

    /// Engine diagnostic, suitable for showing to the user verbatim.
    pub fn message(&self) -> &str {
        match self {
            QueryError::CatalogMissing { message, .. }
            | QueryError::Execution { message }
            | QueryError::Panicked { message } => message,
        }
    }
}

/// DuckDB tags catalog lookups that fail with this error class.
const CATALOG_ERROR_CLASS: &str = "Catalog Error";

/// Catalog entries whose absence means "no data", as opposed to a missing
/// function or type, which is a plain query mistake.
const MISSING_RELATION_KINDS: &[&str] = &["Table with name", "View with name"];

fn is_missing_relation(message: &str) -> bool {
    message
        .strip_prefix(CATALOG_ERROR_CLASS)
        .map(|rest| rest.trim_start_matches(':').trim_start())
        .is_some_and(|rest| MISSING_RELATION_KINDS.iter().any(|k| rest.starts_with(k)))
}

impl From<duckdb::Error> for QueryError {
    fn from(err: duckdb::Error) -> Self {
        let message = match &err {
            duckdb::Error::DuckDBFailure(_, Some(msg)) => msg.clone(),
            other => other.to_string(),
        };
        if is_missing_relation(&message) {
            QueryError::CatalogMissing {
                object: catalog_object(&message).unwrap_or_default(),
                message,
            }
        } else {
            QueryError::Execution { message }
        }
    }
}

/// Pulls `x` out of "Catalog Error: Table with name x does not exist!".
fn catalog_object(message: &str) -> Option<String> {
    let rest = message.split(" with name ").nth(1)?;
    let name = rest.split_whitespace().next()?;
    Some(name.trim_end_matches('!').to_string())
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Table names are embedded into SQL, so only plain identifiers are accepted
    #[error("invalid table name '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTableName(String),

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}
