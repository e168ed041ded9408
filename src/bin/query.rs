//! Ad-hoc query console: runs one SQL statement read-only against the store.
//!
//!   query "SELECT contract, AVG(churn) FROM telco_churn_clean GROUP BY 1"
//!   echo "SELECT COUNT(*) FROM telco_churn_clean" | query

use anyhow::{Context, Result};
use churnstore::{duck::QueryService, init_logging, Config, QueryError};
use std::{
    env,
    io::{self, Read},
    process::ExitCode,
};

fn main() -> Result<ExitCode> {
    init_logging("warn");

    let config = Config::from_env().context("loading configuration")?;
    let service = QueryService::new(&config);

    let args: Vec<String> = env::args().skip(1).collect();
    let sql = if args.is_empty() {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("reading SQL from stdin")?;
        buf
    } else {
        args.join(" ")
    };

    match service.free_text(&sql) {
        Ok(result) => {
            println!("{}", result.pretty());
            println!("({} rows)", result.num_rows());
            Ok(ExitCode::SUCCESS)
        }
        Err(err @ QueryError::CatalogMissing { .. }) => {
            eprintln!(
                "no data yet: run ingestion into {} first ({})",
                service.db_path().display(),
                err.message()
            );
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            eprintln!("{}", err.message());
            Ok(ExitCode::FAILURE)
        }
    }
}
