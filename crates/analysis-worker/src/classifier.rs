//! Move quality classification.
//!
//! A played move is judged from two evaluations: the position before the
//! move from the mover's perspective, and the position after it from the
//! opponent's perspective. Their sum is the mover's raw loss in pawns.

use std::fmt;

use chess_core::PieceKind;
use serde::{Deserialize, Serialize};

use crate::oracle::EngineLine;

/// Last full move that counts as book.
pub const BOOK_MOVE_LIMIT: u32 = 10;

/// Last full move that gets the opening-phase leniency.
pub const OPENING_PHASE_LIMIT: u32 = 8;

/// Minimum search depth for a Brilliant verdict.
pub const BRILLIANT_MIN_DEPTH: u32 = 15;

/// Rank reported for a move the engine did not list.
pub const UNRANKED: u32 = 999;

// cp loss thresholds, inclusive upper bounds
const BRILLIANT_MAX_LOSS: i32 = 20;
const GREAT_MAX_LOSS: i32 = 15;
const EXCELLENT_MAX_LOSS: i32 = 0;
const BEST_MAX_LOSS: i32 = 5;
const GOOD_MAX_LOSS: i32 = 25;
const INACCURACY_MAX_LOSS: i32 = 60;
const MISTAKE_MAX_LOSS: i32 = 120;

/// Quality tiers, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityLabel {
    Brilliant,
    Great,
    Excellent,
    Best,
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl QualityLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityLabel::Brilliant => "Brilliant",
            QualityLabel::Great => "Great",
            QualityLabel::Excellent => "Excellent",
            QualityLabel::Best => "Best",
            QualityLabel::Good => "Good",
            QualityLabel::Inaccuracy => "Inaccuracy",
            QualityLabel::Mistake => "Mistake",
            QualityLabel::Blunder => "Blunder",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ContextTag {
    #[serde(rename = "Book Move")]
    BookMove,
    #[serde(rename = "Forced Move")]
    ForcedMove,
    #[serde(rename = "Missed Win")]
    MissedWin,
    #[serde(rename = "Missed Draw")]
    MissedDraw,
}

impl ContextTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextTag::BookMove => "Book Move",
            ContextTag::ForcedMove => "Forced Move",
            ContextTag::MissedWin => "Missed Win",
            ContextTag::MissedDraw => "Missed Draw",
        }
    }
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position bucket by pawn-equivalent evaluation, mover's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionCategory {
    DecisiveWinning,
    Winning,
    Advantage,
    Equal,
    Disadvantage,
    Losing,
    DecisiveLosing,
}

impl PositionCategory {
    pub fn from_eval(evaluation: f64) -> Self {
        if evaluation >= 7.0 {
            PositionCategory::DecisiveWinning
        } else if evaluation >= 2.0 {
            PositionCategory::Winning
        } else if evaluation >= 0.8 {
            PositionCategory::Advantage
        } else if evaluation > -0.8 {
            PositionCategory::Equal
        } else if evaluation > -2.0 {
            PositionCategory::Disadvantage
        } else if evaluation > -7.0 {
            PositionCategory::Losing
        } else {
            PositionCategory::DecisiveLosing
        }
    }
}

/// Everything the classifier needs to know about one played move.
#[derive(Debug, Clone)]
pub struct MoveContext<'a> {
    /// Mover's perspective.
    pub eval_before: f64,
    /// Opponent's perspective (the side to move after the move).
    pub eval_after: f64,
    pub depth: u32,
    /// Full-move number of the move.
    pub move_number: u32,
    pub played_uci: &'a str,
    pub piece: PieceKind,
    pub captured: Option<PieceKind>,
    /// Engine lines for the pre-move position.
    pub lines: &'a [EngineLine],
    /// Legal moves available before the move was played.
    pub legal_move_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveQualityVerdict {
    pub label: QualityLabel,
    /// Negated raw loss, undampened.
    pub evaluation_delta: f64,
    /// Dampened loss in centipawns.
    pub cp_loss: i32,
    pub tags: Vec<ContextTag>,
}

impl MoveQualityVerdict {
    pub fn has_tag(&self, tag: ContextTag) -> bool {
        self.tags.contains(&tag)
    }
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Apply the positional and opening-phase dampening to a raw loss.
pub fn dampened_loss(
    raw_loss: f64,
    before: PositionCategory,
    after: PositionCategory,
    move_number: u32,
) -> f64 {
    use PositionCategory::*;

    let positional = match (before, after) {
        (DecisiveWinning, DecisiveWinning | Winning) => 0.0,
        (Winning, Winning | DecisiveWinning) => raw_loss * 0.2,
        (DecisiveLosing, DecisiveLosing) => 0.0,
        (Losing, Losing | DecisiveLosing) if raw_loss < 0.5 => raw_loss * 0.5,
        _ => raw_loss,
    };

    if move_number <= OPENING_PHASE_LIMIT {
        positional * 0.8
    } else {
        positional
    }
}

/// 1-based rank of the played move among the engine lines, or [`UNRANKED`].
pub fn played_rank(played_uci: &str, lines: &[EngineLine]) -> u32 {
    lines
        .iter()
        .find(|line| line.first_move == played_uci)
        .map(|line| line.rank + 1)
        .unwrap_or(UNRANKED)
}

pub fn is_best_move(played_uci: &str, lines: &[EngineLine]) -> bool {
    lines
        .iter()
        .find(|line| line.rank == 0)
        .is_some_and(|line| line.first_move == played_uci)
}

/// A capture where the capturing piece is worth more than what it took.
pub fn is_material_sacrifice(piece: PieceKind, captured: Option<PieceKind>) -> bool {
    captured.is_some_and(|taken| piece.value() > taken.value())
}

pub fn is_book_move(move_number: u32) -> bool {
    move_number <= BOOK_MOVE_LIMIT
}

pub fn classify_move(ctx: &MoveContext<'_>) -> MoveQualityVerdict {
    let eval_before = finite_or_zero(ctx.eval_before);
    let eval_after = finite_or_zero(ctx.eval_after);

    let raw_loss = eval_before + eval_after;
    let before = PositionCategory::from_eval(eval_before);
    let after = PositionCategory::from_eval(-eval_after);

    let dampened = dampened_loss(raw_loss, before, after, ctx.move_number);
    let cp_loss = (dampened * 100.0).round() as i32;

    let is_best = is_best_move(ctx.played_uci, ctx.lines);
    let rank = played_rank(ctx.played_uci, ctx.lines);
    let sacrifice = is_material_sacrifice(ctx.piece, ctx.captured);

    let missed_win = matches!(
        before,
        PositionCategory::Winning | PositionCategory::DecisiveWinning
    ) && matches!(
        after,
        PositionCategory::Equal | PositionCategory::Disadvantage | PositionCategory::Losing
    );
    let missed_draw = before == PositionCategory::Equal
        && matches!(
            after,
            PositionCategory::Losing | PositionCategory::DecisiveLosing
        );

    let mut tags = Vec::new();
    if is_book_move(ctx.move_number) {
        tags.push(ContextTag::BookMove);
    }
    if ctx.legal_move_count == 1 {
        tags.push(ContextTag::ForcedMove);
    }
    if missed_win {
        tags.push(ContextTag::MissedWin);
    }
    if missed_draw {
        tags.push(ContextTag::MissedDraw);
    }

    let label = if missed_win || missed_draw {
        QualityLabel::Blunder
    } else if ctx.depth >= BRILLIANT_MIN_DEPTH
        && !is_best
        && sacrifice
        && cp_loss <= BRILLIANT_MAX_LOSS
    {
        QualityLabel::Brilliant
    } else if !is_best && rank == 2 && cp_loss <= GREAT_MAX_LOSS {
        QualityLabel::Great
    } else if is_best && cp_loss <= EXCELLENT_MAX_LOSS {
        QualityLabel::Excellent
    } else if is_best || cp_loss <= BEST_MAX_LOSS {
        QualityLabel::Best
    } else if cp_loss <= GOOD_MAX_LOSS {
        QualityLabel::Good
    } else if cp_loss <= INACCURACY_MAX_LOSS {
        QualityLabel::Inaccuracy
    } else if cp_loss <= MISTAKE_MAX_LOSS {
        QualityLabel::Mistake
    } else {
        QualityLabel::Blunder
    };

    MoveQualityVerdict {
        label,
        evaluation_delta: -raw_loss,
        cp_loss,
        tags,
    }
}

/// One-line summary, e.g. `Inaccuracy (Book Move) [-0.70]`.
pub fn describe(verdict: &MoveQualityVerdict) -> String {
    let mut out = verdict.label.to_string();
    if !verdict.tags.is_empty() {
        let tags: Vec<&str> = verdict.tags.iter().map(|t| t.as_str()).collect();
        out.push_str(&format!(" ({})", tags.join(", ")));
    }
    out.push_str(&format!(" [{:+.2}]", verdict.evaluation_delta));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(rank: u32, first_move: &str) -> EngineLine {
        EngineLine {
            rank,
            moves: vec![first_move.to_string()],
            evaluation: 0.0,
            depth: 20,
            mate: None,
            first_move: first_move.to_string(),
        }
    }

    fn ctx<'a>(before: f64, after: f64, played: &'a str, lines: &'a [EngineLine]) -> MoveContext<'a> {
        MoveContext {
            eval_before: before,
            eval_after: after,
            depth: 20,
            move_number: 20,
            played_uci: played,
            piece: PieceKind::Knight,
            captured: None,
            lines,
            legal_move_count: 30,
        }
    }

    #[test]
    fn test_buckets() {
        assert_eq!(PositionCategory::from_eval(7.0), PositionCategory::DecisiveWinning);
        assert_eq!(PositionCategory::from_eval(6.99), PositionCategory::Winning);
        assert_eq!(PositionCategory::from_eval(2.0), PositionCategory::Winning);
        assert_eq!(PositionCategory::from_eval(0.8), PositionCategory::Advantage);
        assert_eq!(PositionCategory::from_eval(0.79), PositionCategory::Equal);
        assert_eq!(PositionCategory::from_eval(-0.79), PositionCategory::Equal);
        assert_eq!(PositionCategory::from_eval(-0.8), PositionCategory::Disadvantage);
        assert_eq!(PositionCategory::from_eval(-2.0), PositionCategory::Losing);
        assert_eq!(PositionCategory::from_eval(-7.0), PositionCategory::DecisiveLosing);
    }

    #[test]
    fn test_decisive_win_loss_is_zeroed() {
        let lines = [line(0, "e2e4")];
        let verdict = classify_move(&ctx(8.0, -3.0, "d2d4", &lines));
        assert_eq!(verdict.cp_loss, 0);
        assert_eq!(verdict.label, QualityLabel::Best);
        assert_eq!(verdict.evaluation_delta, -5.0);
        assert!(verdict.tags.is_empty());
    }

    #[test]
    fn test_missed_win_forces_blunder() {
        let lines = [line(0, "d2d4")];
        let verdict = classify_move(&ctx(3.0, 1.0, "d2d4", &lines));
        assert_eq!(verdict.label, QualityLabel::Blunder);
        assert!(verdict.has_tag(ContextTag::MissedWin));
    }

    #[test]
    fn test_missed_draw_forces_blunder() {
        let verdict = classify_move(&ctx(0.0, 2.5, "a2a3", &[]));
        assert_eq!(verdict.label, QualityLabel::Blunder);
        assert!(verdict.has_tag(ContextTag::MissedDraw));
        assert!(!verdict.has_tag(ContextTag::MissedWin));
    }

    #[test]
    fn test_best_move_in_equal_position() {
        let lines = [line(0, "g1f3"), line(1, "d2d4")];
        let verdict = classify_move(&ctx(0.2, 0.2, "g1f3", &lines));
        assert!(matches!(verdict.label, QualityLabel::Excellent | QualityLabel::Best));

        let perfect = classify_move(&ctx(0.2, -0.2, "g1f3", &lines));
        assert_eq!(perfect.label, QualityLabel::Excellent);
    }

    #[test]
    fn test_queen_sacrifice_is_brilliant() {
        let lines = [line(0, "e2e4")];
        let mut c = ctx(0.5, -0.4, "d1h7", &lines);
        c.depth = 18;
        c.piece = PieceKind::Queen;
        c.captured = Some(PieceKind::Pawn);
        let verdict = classify_move(&c);
        assert_eq!(verdict.cp_loss, 10);
        assert_eq!(verdict.label, QualityLabel::Brilliant);

        c.depth = 12;
        assert_ne!(classify_move(&c).label, QualityLabel::Brilliant);
    }

    #[test]
    fn test_second_line_is_great() {
        let lines = [line(0, "e2e4"), line(1, "d2d4"), line(2, "c2c4")];
        let verdict = classify_move(&ctx(0.3, -0.2, "d2d4", &lines));
        assert_eq!(verdict.label, QualityLabel::Great);
        assert_eq!(played_rank("c2c4", &lines), 3);
        assert_eq!(played_rank("h2h4", &lines), UNRANKED);
    }

    #[test]
    fn test_opening_scale_crosses_tier() {
        let mut c = ctx(0.2, 0.5, "a2a3", &[]);
        assert_eq!(classify_move(&c).label, QualityLabel::Mistake);

        c.move_number = 3;
        let verdict = classify_move(&c);
        assert_eq!(verdict.cp_loss, 56);
        assert_eq!(verdict.label, QualityLabel::Inaccuracy);
        assert!(verdict.has_tag(ContextTag::BookMove));
    }

    #[test]
    fn test_dampening_rules() {
        use PositionCategory::*;
        assert_eq!(dampened_loss(2.0, Winning, Winning, 20), 2.0 * 0.2);
        assert_eq!(dampened_loss(3.0, DecisiveLosing, DecisiveLosing, 20), 0.0);
        assert_eq!(dampened_loss(0.4, Losing, Losing, 20), 0.2);
        assert_eq!(dampened_loss(0.6, Losing, Losing, 20), 0.6);
        assert_eq!(dampened_loss(1.0, Advantage, Equal, 8), 0.8);
        assert_eq!(dampened_loss(1.0, Advantage, Equal, 9), 1.0);
    }

    #[test]
    fn test_no_engine_lines_still_labels() {
        let verdict = classify_move(&ctx(0.1, 3.0, "e2e4", &[]));
        assert_eq!(verdict.label, QualityLabel::Blunder);
        let quiet = classify_move(&ctx(0.1, -0.1, "e2e4", &[]));
        assert_eq!(quiet.label, QualityLabel::Best);
    }

    #[test]
    fn test_forced_move_tag() {
        let mut c = ctx(-0.5, 0.6, "e1f1", &[]);
        c.legal_move_count = 1;
        assert!(classify_move(&c).has_tag(ContextTag::ForcedMove));
    }

    #[test]
    fn test_classifier_is_deterministic() {
        let lines = [line(0, "e2e4"), line(1, "d2d4")];
        let c = ctx(1.1, -0.4, "d2d4", &lines);
        assert_eq!(classify_move(&c), classify_move(&c));
    }

    #[test]
    fn test_sacrifice_detection() {
        assert!(is_material_sacrifice(PieceKind::Rook, Some(PieceKind::Knight)));
        assert!(!is_material_sacrifice(PieceKind::Knight, Some(PieceKind::Bishop)));
        assert!(!is_material_sacrifice(PieceKind::Queen, None));
        assert!(!is_material_sacrifice(PieceKind::King, Some(PieceKind::Pawn)));
    }

    #[test]
    fn test_describe() {
        let verdict = MoveQualityVerdict {
            label: QualityLabel::Inaccuracy,
            evaluation_delta: -0.7,
            cp_loss: 56,
            tags: vec![ContextTag::BookMove],
        };
        assert_eq!(describe(&verdict), "Inaccuracy (Book Move) [-0.70]");
    }

    #[test]
    fn test_tag_serialization() {
        let json = serde_json::to_string(&ContextTag::MissedWin).unwrap();
        assert_eq!(json, "\"Missed Win\"");
    }
}
