use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex should parse"));

/// Env var naming an optional YAML config file.
pub const CONFIG_FILE_VAR: &str = "CHURNSTORE_CONFIG";

/// A table name known at configuration time.
///
/// Only plain identifiers are accepted, so a `TableName` can be embedded into
/// SQL text (always quoted, see [`crate::duck::quote_ident`]).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if IDENTIFIER.is_match(&name) {
            Ok(TableName(name))
        } else {
            Err(ConfigError::InvalidTableName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TableName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TableName::new(value)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What ingestion does when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingTable {
    /// Leave the table and its rows as they are
    #[default]
    Keep,
    /// Drop and rebuild the table from the current source
    Replace,
}

impl FromStr for ExistingTable {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(ExistingTable::Keep),
            "replace" => Ok(ExistingTable::Replace),
            _ => Err(ConfigError::InvalidValue {
                key: "on_existing".into(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raw delimited input
    pub source_csv: PathBuf,
    /// Single-file DuckDB database
    pub db_path: PathBuf,
    /// Table holding the normalized records
    pub table: TableName,
    pub on_existing: ExistingTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_csv: PathBuf::from("infrastructure/data/raw/telco_customer_churn.csv"),
            db_path: PathBuf::from("infrastructure/data/duckdb/decision_systems.duckdb"),
            table: TableName("telco_churn_clean".into()),
            on_existing: ExistingTable::Keep,
        }
    }
}

impl Config {
    /// Defaults, or the YAML file named by `CHURNSTORE_CONFIG`, then
    /// `CHURNSTORE_*` overrides from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match env::var_os(CONFIG_FILE_VAR) {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None => Self::default(),
        };
        base.with_overrides(|key| env::var(key).ok())
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `CHURNSTORE_*` overrides resolved through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHURNSTORE_SOURCE_CSV") {
            self.source_csv = PathBuf::from(v);
        }
        if let Some(v) = lookup("CHURNSTORE_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CHURNSTORE_TABLE") {
            self.table = TableName::new(v)?;
        }
        if let Some(v) = lookup("CHURNSTORE_ON_EXISTING") {
            self.on_existing = v.parse()?;
        }
        Ok(self)
    }
}
