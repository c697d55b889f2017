pub mod config;
pub mod play;
pub mod progress;
pub mod results;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;
