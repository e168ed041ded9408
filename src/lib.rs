//! Ingest a customer-churn CSV into a single-file DuckDB store and serve
//! read queries over it.
//!
//! Ingestion: [`ingest::read_csv`] → [`ingest::normalize`] → [`duck::write_table`],
//! driven end to end by [`ingest::run_ingestion`]. Serving: [`duck::QueryService`]
//! on top of [`duck::run_query`].

pub mod config;
pub mod duck;
pub mod error;
pub mod ingest;

pub use config::{Config, ExistingTable, TableName};
pub use error::{ConfigError, IngestError, PersistenceError, QueryError};

/// Install the fmt subscriber used by the binaries, filtered by `RUST_LOG`.
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .try_init();
}
