use clap::Subcommand;
use coinsmith_core::Database;

use super::CliResult;

#[derive(Subcommand)]
pub enum ResultsAction {
    /// List stored session results, newest first
    List {
        /// Maximum number of results
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

pub fn run(action: ResultsAction) -> CliResult {
    let db = Database::open()?;
    match action {
        ResultsAction::List { limit } => {
            let results = db.recent_results(limit)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }
    Ok(())
}
