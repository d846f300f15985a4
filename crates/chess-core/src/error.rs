use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Unparseable move notation: {0}")]
    BadNotation(String),

    #[error("Illegal move {notation} in position {fen}")]
    IllegalMove { notation: String, fen: String },
}
