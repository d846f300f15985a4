//! Chess value types and rules adapter shared by the analysis crates.
//!
//! Everything downstream of this crate works on plain values
//! (`PositionKey`, `MoveRecord`, `PlayedMove`) and the `MoveGenerator`
//! trait; only `rules` knows about shakmaty.

pub mod error;
pub mod game_data;
pub mod moves;
pub mod opening_tree;
pub mod pgn;
pub mod position;
pub mod rules;

pub use error::RulesError;
pub use moves::{MoveRecord, PieceKind, PlayedMove};
pub use position::{normalize_fen, PositionKey, Side, START_FEN};
pub use rules::{GameStatus, MoveGenerator, ShakmatyBoard};
