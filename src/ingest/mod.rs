pub mod normalize;
pub mod reader;
pub mod utils;

use tracing::{info, warn};

pub use normalize::{normalize, NormalizedTable};
pub use reader::{read_csv, RawTable, RawValue};

use crate::{
    config::Config,
    duck::{write_table, WriteOutcome},
    error::IngestError,
};

/// Read → normalize → write, as configured. Any error aborts the run
/// before anything is committed.
#[tracing::instrument(level = "info", skip(config), fields(source = %config.source_csv.display(), db = %config.db_path.display(), table = %config.table))]
pub fn run_ingestion(config: &Config) -> Result<WriteOutcome, IngestError> {
    let raw = read_csv(&config.source_csv)?;
    info!(rows = raw.num_rows(), columns = raw.headers.len(), "read source");

    let normalized = normalize(&raw).map_err(|e| IngestError::MalformedSource {
        path: config.source_csv.clone(),
        reason: e.to_string(),
    })?;
    for column in &normalized.missing_columns {
        warn!(column, "designated column absent from source; transform skipped");
    }
    for (column, failures) in &normalized.numeric_failures {
        if *failures > 0 {
            info!(column = %column, failures, "unparseable numeric cells set to null");
        }
    }
    if normalized.unrecognized_labels > 0 {
        warn!(
            count = normalized.unrecognized_labels,
            "churn labels outside {{Yes, No}} encoded as NULL"
        );
    }

    let outcome = write_table(
        &config.db_path,
        config.table.as_str(),
        &normalized,
        config.on_existing,
    )?;
    info!(rows = outcome.rows, created = outcome.created, "rows in table");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ExistingTable, duck::QueryService, error::PersistenceError};
    use anyhow::Result;
    use duckdb::arrow::array::{Array, Float64Array, Int64Array};
    use std::{fs, path::Path};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,churnstore=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const TELCO_SAMPLE: &str = "\
customerID,gender,SeniorCitizen,tenure,MonthlyCharges,TotalCharges,Churn
7590-VHVEG,Female,0,1,29.85,29.85,No
5575-GNVDE,Male,0,34,56.95,1889.5,Yes
4472-LVYGI,Female,0,0,52.55, ,No
3668-QPYBK,Male,1,2,53.85,108.15,Yes
";

    fn config_in(dir: &Path, csv: &str) -> Config {
        let source = dir.join("raw.csv");
        fs::write(&source, csv).unwrap();
        Config {
            source_csv: source,
            db_path: dir.join("decision_systems.duckdb"),
            ..Config::default()
        }
    }

    #[test]
    fn ingests_end_to_end() -> Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let config = config_in(dir.path(), TELCO_SAMPLE);

        let out = run_ingestion(&config)?;
        assert_eq!(out, WriteOutcome { rows: 4, created: true });

        let svc = QueryService::new(&config);
        let res = svc.table_query(|t| {
            format!("SELECT customerid, seniorcitizen, totalcharges, churn FROM {t} ORDER BY customerid")
        })?;
        assert_eq!(res.num_rows(), 4);
        let batch = &res.batches[0];
        let senior = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(senior.values().to_vec(), vec![1, 0, 0, 0]);
        // the blank TotalCharges cell of 4472-LVYGI was filled with 0
        let total = batch.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(total.values().to_vec(), vec![108.15, 0.0, 1889.5, 29.85]);
        assert_eq!(svc.churn_summary()?.churned, 2);
        Ok(())
    }

    #[test]
    fn rerun_does_not_duplicate_rows() -> Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let config = config_in(dir.path(), TELCO_SAMPLE);
        run_ingestion(&config)?;
        let again = run_ingestion(&config)?;
        assert_eq!(again, WriteOutcome { rows: 4, created: false });
        Ok(())
    }

    #[test]
    fn replace_mode_refreshes_from_source() -> Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let mut config = config_in(dir.path(), TELCO_SAMPLE);
        run_ingestion(&config)?;

        let shorter: String = TELCO_SAMPLE.lines().take(3).map(|l| format!("{l}\n")).collect();
        fs::write(&config.source_csv, shorter)?;
        config.on_existing = ExistingTable::Replace;
        assert_eq!(run_ingestion(&config)?.rows, 2);
        Ok(())
    }

    #[test]
    fn trailing_delimiter_header_still_ingests() -> Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let config = config_in(dir.path(), "tenure,Churn,\n1,No,\n2,Yes,\n");
        assert_eq!(run_ingestion(&config)?.rows, 2);

        let svc = QueryService::new(&config);
        let res = svc.table_query(|t| format!("SELECT unnamed_2 FROM {t}"))?;
        assert_eq!(res.num_rows(), 2);
        let nulls: usize = res.batches.iter().map(|b| b.column(0).null_count()).sum();
        assert_eq!(nulls, 2);
        Ok(())
    }

    #[test]
    fn malformed_source_writes_nothing() -> Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let config = config_in(dir.path(), "tenure,churn\n1,No\n2\n");
        let err = run_ingestion(&config).unwrap_err();
        assert!(matches!(err, IngestError::MalformedSource { .. }), "{err:?}");
        assert!(!config.db_path.exists());
        Ok(())
    }

    #[test]
    fn missing_source_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config {
            source_csv: dir.path().join("absent.csv"),
            db_path: dir.path().join("db.duckdb"),
            ..Config::default()
        };
        assert!(matches!(
            run_ingestion(&config),
            Err(IngestError::SourceNotFound { .. })
        ));
        Ok(())
    }

    #[test]
    fn missing_db_parent_is_persistence_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = config_in(dir.path(), TELCO_SAMPLE);
        config.db_path = dir.path().join("missing").join("db.duckdb");
        assert!(matches!(
            run_ingestion(&config),
            Err(IngestError::Persistence(PersistenceError::MissingParent { .. }))
        ));
        Ok(())
    }
}
