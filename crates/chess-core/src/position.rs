//! Position identity and side-to-move.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Canonical position identifier: board, turn, castling and en-passant
/// fields of a FEN. Two FENs differing only in move counters share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey(String);

impl PositionKey {
    pub fn from_fen(fen: &str) -> Self {
        Self(normalize_fen(fen))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Side to move encoded in the key. Falls back to White for malformed keys.
    pub fn side_to_move(&self) -> Side {
        self.0
            .split_whitespace()
            .nth(1)
            .and_then(Side::from_fen_field)
            .unwrap_or(Side::White)
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// Parse the FEN turn field ("w" / "b").
    pub fn from_fen_field(field: &str) -> Option<Self> {
        match field {
            "w" => Some(Side::White),
            "b" => Some(Side::Black),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Side::White => 'w',
            Side::Black => 'b',
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fen() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let normalized = normalize_fen(fen);
        assert_eq!(normalized, "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3");
    }

    #[test]
    fn test_key_ignores_move_counters() {
        let a = PositionKey::from_fen("8/8/8/8/8/8/8/K6k w - - 0 1");
        let b = PositionKey::from_fen("8/8/8/8/8/8/8/K6k w - - 37 80");
        assert_eq!(a, b);
        assert_ne!(a, PositionKey::from_fen("8/8/8/8/8/8/8/K6k b - - 0 1"));
    }

    #[test]
    fn test_key_side_to_move() {
        assert_eq!(PositionKey::from_fen(START_FEN).side_to_move(), Side::White);
        let key = PositionKey::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
        assert_eq!(key.side_to_move(), Side::Black);
        assert_eq!(Side::Black.opposite(), Side::White);
    }
}
