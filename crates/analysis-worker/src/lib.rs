pub mod classifier;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod opening;
pub mod oracle;
pub mod orchestrator;
pub mod report;
pub mod stockfish;

pub use error::AnalysisError;
