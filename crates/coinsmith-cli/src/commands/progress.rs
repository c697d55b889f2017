use clap::Subcommand;
use coinsmith_core::{Database, Progression, ProgressionStore};

use super::CliResult;

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Print streak level and personal best as JSON
    Show,
    /// Reset streak and personal best to zero
    Reset,
}

pub fn run(action: ProgressAction) -> CliResult {
    let db = Database::open()?;
    match action {
        ProgressAction::Show => {
            let state = db.load()?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        ProgressAction::Reset => {
            let mut progression = Progression::load(Box::new(db));
            progression.reset()?;
            println!("progression reset");
        }
    }
    Ok(())
}
