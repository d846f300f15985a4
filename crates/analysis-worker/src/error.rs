//! Analysis error types

use thiserror::Error;

use crate::oracle::RequestTag;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stockfish error: {0}")]
    Stockfish(String),

    #[error("Oracle timed out after {timeout_ms}ms on ply {ply} (request {tag})")]
    OracleTimeout {
        ply: usize,
        tag: RequestTag,
        timeout_ms: u128,
    },

    #[error("Oracle failed on ply {ply}: {reason}")]
    OracleFailure { ply: usize, reason: String },

    #[error("Analysis run {run} was superseded by a newer run")]
    Superseded { run: u64 },

    #[error("Illegal move {notation} at ply {ply}: {source}")]
    IllegalMove {
        ply: usize,
        notation: String,
        #[source]
        source: chess_core::RulesError,
    },

    #[error("Invalid starting position: {0}")]
    Rules(#[from] chess_core::RulesError),

    #[error("Opening dataset error: {0}")]
    Dataset(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
