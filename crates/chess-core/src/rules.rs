//! Move generator boundary.
//!
//! The analysis pipeline treats the rules engine as an authoritative black
//! box behind `MoveGenerator`. `ShakmatyBoard` is the production
//! implementation.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role};

use crate::error::RulesError;
use crate::moves::{MoveRecord, PieceKind, PlayedMove};
use crate::position::{PositionKey, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    Checkmate,
    /// Stalemate or insufficient material.
    Draw,
}

impl GameStatus {
    pub fn is_over(self) -> bool {
        !matches!(self, GameStatus::Ongoing)
    }
}

pub trait MoveGenerator {
    /// Full FEN of the current position.
    fn fen(&self) -> String;

    fn key(&self) -> PositionKey {
        PositionKey::from_fen(&self.fen())
    }

    fn side_to_move(&self) -> Side;

    /// Full-move counter (starts at 1, increments after Black moves).
    fn fullmove_number(&self) -> u32;

    fn legal_moves(&self) -> Vec<MoveRecord>;

    fn status(&self) -> GameStatus;

    /// Apply a move given in SAN or UCI notation.
    fn play(&mut self, notation: &str) -> Result<PlayedMove, RulesError>;

    /// Validate an engine-reported UCI move against the current position.
    /// Returns the move with its SAN filled in, or None if it is not legal here.
    fn resolve(&self, uci: &str) -> Option<MoveRecord>;
}

/// `MoveGenerator` backed by shakmaty's standard chess rules.
#[derive(Debug, Clone, Default)]
pub struct ShakmatyBoard {
    pos: Chess,
}

impl ShakmatyBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let parsed: Fen = fen
            .parse()
            .map_err(|_| RulesError::InvalidFen(fen.to_string()))?;
        let pos: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|_| RulesError::InvalidFen(fen.to_string()))?;
        Ok(Self { pos })
    }

    fn find_move(&self, notation: &str) -> Result<Move, RulesError> {
        let notation = notation.trim();
        if let Ok(uci) = notation.parse::<UciMove>() {
            if let Ok(mv) = uci.to_move(&self.pos) {
                return Ok(mv);
            }
        }

        let san: SanPlus = notation
            .parse()
            .map_err(|_| RulesError::BadNotation(notation.to_string()))?;
        san.san.to_move(&self.pos).map_err(|_| RulesError::IllegalMove {
            notation: notation.to_string(),
            fen: self.fen(),
        })
    }

    fn record(&self, mv: &Move) -> Option<MoveRecord> {
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let san = San::from_move(&self.pos, mv.clone()).to_string();
        MoveRecord::parse_uci(&uci).map(|r| r.with_san(san))
    }
}

fn piece_kind(role: Role) -> PieceKind {
    match role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    }
}

impl MoveGenerator for ShakmatyBoard {
    fn fen(&self) -> String {
        Fen::from_position(&self.pos, EnPassantMode::Legal).to_string()
    }

    fn side_to_move(&self) -> Side {
        match self.pos.turn() {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }

    fn fullmove_number(&self) -> u32 {
        self.pos.fullmoves().get()
    }

    fn legal_moves(&self) -> Vec<MoveRecord> {
        self.pos
            .legal_moves()
            .iter()
            .filter_map(|mv| self.record(mv))
            .collect()
    }

    fn status(&self) -> GameStatus {
        if self.pos.is_checkmate() {
            GameStatus::Checkmate
        } else if self.pos.is_stalemate() || self.pos.is_insufficient_material() {
            GameStatus::Draw
        } else {
            GameStatus::Ongoing
        }
    }

    fn play(&mut self, notation: &str) -> Result<PlayedMove, RulesError> {
        let mv = self.find_move(notation)?;
        let record = self
            .record(&mv)
            .ok_or_else(|| RulesError::BadNotation(notation.to_string()))?;
        let played = PlayedMove {
            record,
            piece: piece_kind(mv.role()),
            captured: mv.capture().map(piece_kind),
        };
        self.pos.play_unchecked(mv);
        Ok(played)
    }

    fn resolve(&self, uci: &str) -> Option<MoveRecord> {
        let parsed: UciMove = uci.parse().ok()?;
        let mv = parsed.to_move(&self.pos).ok()?;
        self.record(&mv)
    }
}
