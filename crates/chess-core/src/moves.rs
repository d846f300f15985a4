//! Move value types independent of any rules engine.

use serde::{Deserialize, Serialize};

// Piece values for material calculation
pub const PAWN_VALUE: i32 = 1;
pub const KNIGHT_VALUE: i32 = 3;
pub const BISHOP_VALUE: i32 = 3;
pub const ROOK_VALUE: i32 = 5;
pub const QUEEN_VALUE: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    /// Nominal material value (king counts as 0).
    pub fn value(self) -> i32 {
        match self {
            PieceKind::Pawn => PAWN_VALUE,
            PieceKind::Knight => KNIGHT_VALUE,
            PieceKind::Bishop => BISHOP_VALUE,
            PieceKind::Rook => ROOK_VALUE,
            PieceKind::Queen => QUEEN_VALUE,
            PieceKind::King => 0,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }
}

/// A move as a plain record: squares, optional promotion, optional SAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub from: String,
    pub to: String,
    pub promotion: Option<PieceKind>,
    pub san: Option<String>,
}

impl MoveRecord {
    /// Parse compact UCI notation (`e2e4`, `e7e8q`). Only the shape is
    /// checked, not legality.
    pub fn parse_uci(uci: &str) -> Option<Self> {
        let bytes = uci.as_bytes();
        if !(bytes.len() == 4 || bytes.len() == 5) || !uci.is_ascii() {
            return None;
        }
        let from = &uci[0..2];
        let to = &uci[2..4];
        if !is_square(from) || !is_square(to) {
            return None;
        }
        let promotion = match uci[4..].chars().next() {
            Some(c) => match PieceKind::from_char(c) {
                Some(PieceKind::Pawn) | Some(PieceKind::King) | None => return None,
                Some(kind) => Some(kind),
            },
            None => None,
        };
        Some(Self {
            from: from.to_string(),
            to: to.to_string(),
            promotion,
            san: None,
        })
    }

    /// Compact from-to-promotion id, the format engines report moves in.
    pub fn uci(&self) -> String {
        match self.promotion {
            Some(p) => format!("{}{}{}", self.from, self.to, p.as_char()),
            None => format!("{}{}", self.from, self.to),
        }
    }

    pub fn with_san(mut self, san: impl Into<String>) -> Self {
        self.san = Some(san.into());
        self
    }
}

fn is_square(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 2 && (b'a'..=b'h').contains(&b[0]) && (b'1'..=b'8').contains(&b[1])
}

/// Result of applying a move: the move itself plus what moved and what was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    pub record: MoveRecord,
    pub piece: PieceKind,
    pub captured: Option<PieceKind>,
}

impl PlayedMove {
    pub fn san(&self) -> &str {
        self.record.san.as_deref().unwrap_or("")
    }

    pub fn uci(&self) -> String {
        self.record.uci()
    }
}
