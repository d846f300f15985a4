//! Per-game summary built from an analysed timeline.

use std::collections::BTreeMap;

use chess_core::game_data::GameMetadata;
use chess_core::Side;
use serde::{Deserialize, Serialize};

use crate::classifier::{ContextTag, QualityLabel};
use crate::evaluation::format_evaluation;
use crate::orchestrator::{AnalysisMode, AnalyzedMove};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideSummary {
    pub moves: u32,
    pub labels: BTreeMap<QualityLabel, u32>,
    pub book: u32,
    pub forced: u32,
    pub total_cp_loss: i32,
    pub average_cp_loss: f64,
    pub accuracy: f64,
}

impl SideSummary {
    pub fn count(&self, label: QualityLabel) -> u32 {
        self.labels.get(&label).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameReport {
    pub white: String,
    pub black: String,
    pub result: String,
    pub mode: AnalysisMode,
    /// Last named opening reached in the game.
    pub opening: Option<String>,
    pub white_summary: SideSummary,
    pub black_summary: SideSummary,
    /// White-relative evaluation after each ply, formatted for display.
    pub evaluations: Vec<String>,
    pub moves: Vec<AnalyzedMove>,
}

/// Accuracy from average centipawn loss, 100 for a perfect game.
pub fn calculate_accuracy(total_cp_loss: i32, move_count: u32) -> f64 {
    if move_count == 0 {
        return 100.0;
    }
    let acpl = total_cp_loss.max(0) as f64 / move_count as f64;
    let accuracy = 100.0 * (1.0 / (1.0 + acpl / 100.0)).sqrt();
    accuracy.clamp(0.0, 100.0)
}

fn summarize(timeline: &[AnalyzedMove], side: Side) -> SideSummary {
    let mut summary = SideSummary::default();

    for mv in timeline.iter().filter(|m| m.side == side) {
        summary.moves += 1;
        *summary.labels.entry(mv.verdict.label).or_insert(0) += 1;
        if mv.verdict.has_tag(ContextTag::BookMove) {
            summary.book += 1;
        }
        if mv.verdict.has_tag(ContextTag::ForcedMove) {
            summary.forced += 1;
        }
        // Gains do not offset losses.
        summary.total_cp_loss += mv.verdict.cp_loss.max(0);
    }

    if summary.moves > 0 {
        summary.average_cp_loss = summary.total_cp_loss as f64 / summary.moves as f64;
    }
    summary.accuracy = calculate_accuracy(summary.total_cp_loss, summary.moves);
    summary
}

impl GameReport {
    pub fn build(metadata: &GameMetadata, mode: AnalysisMode, timeline: Vec<AnalyzedMove>) -> Self {
        let evaluations = timeline
            .iter()
            .map(|m| format_evaluation(m.white_evaluation(), m.mate))
            .collect();

        Self {
            white: metadata.white.clone(),
            black: metadata.black.clone(),
            result: metadata.result.clone(),
            mode,
            opening: timeline
                .iter()
                .rev()
                .find_map(|m| m.opening.clone())
                .or_else(|| metadata.opening.clone()),
            white_summary: summarize(&timeline, Side::White),
            black_summary: summarize(&timeline, Side::Black),
            evaluations,
            moves: timeline,
        }
    }

    pub fn summary(&self, side: Side) -> &SideSummary {
        match side {
            Side::White => &self.white_summary,
            Side::Black => &self.black_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::MoveQualityVerdict;
    use chess_core::PositionKey;

    fn analyzed(ply: usize, label: QualityLabel, cp_loss: i32, tags: Vec<ContextTag>) -> AnalyzedMove {
        AnalyzedMove {
            ply,
            move_number: (ply / 2 + 1) as u32,
            side: if ply % 2 == 0 { Side::White } else { Side::Black },
            san: "e4".into(),
            uci: "e2e4".into(),
            position_key: PositionKey::from_fen(chess_core::START_FEN),
            evaluation: -0.3,
            mate: None,
            depth: 12,
            verdict: MoveQualityVerdict {
                label,
                evaluation_delta: -(cp_loss as f64) / 100.0,
                cp_loss,
                tags,
            },
            lines: vec![],
            opening: None,
        }
    }

    #[test]
    fn test_calculate_accuracy() {
        assert!((calculate_accuracy(0, 20) - 100.0).abs() < 0.1);
        assert!((calculate_accuracy(500, 20) - 89.4).abs() < 1.0);
        assert!((calculate_accuracy(2000, 20) - 70.7).abs() < 1.0);
        assert_eq!(calculate_accuracy(0, 0), 100.0);
    }

    #[test]
    fn test_summaries_split_by_side() {
        let timeline = vec![
            analyzed(0, QualityLabel::Best, 0, vec![ContextTag::BookMove]),
            analyzed(1, QualityLabel::Blunder, 300, vec![]),
            analyzed(2, QualityLabel::Good, 20, vec![ContextTag::ForcedMove]),
            analyzed(3, QualityLabel::Best, -10, vec![]),
        ];
        let report = GameReport::build(&GameMetadata::default(), AnalysisMode::Fast, timeline);

        let white = report.summary(Side::White);
        assert_eq!(white.moves, 2);
        assert_eq!(white.book, 1);
        assert_eq!(white.forced, 1);
        assert_eq!(white.total_cp_loss, 20);
        assert_eq!(white.average_cp_loss, 10.0);

        let black = report.summary(Side::Black);
        assert_eq!(black.count(QualityLabel::Blunder), 1);
        assert_eq!(black.count(QualityLabel::Best), 1);
        assert_eq!(black.total_cp_loss, 300);
        assert!(black.accuracy < white.accuracy);
    }

    #[test]
    fn test_mate_evaluations_format_as_distance() {
        let mut mated = analyzed(0, QualityLabel::Best, 0, vec![]);
        mated.evaluation = -15.0;
        mated.mate = Some(-3);
        let report = GameReport::build(&GameMetadata::default(), AnalysisMode::Fast, vec![mated]);
        assert_eq!(report.evaluations, vec!["M3"]);
    }

    #[test]
    fn test_evaluations_are_white_relative() {
        let timeline = vec![analyzed(0, QualityLabel::Best, 0, vec![])];
        let report = GameReport::build(&GameMetadata::default(), AnalysisMode::Full, timeline);
        // -0.3 for Black to move is +0.3 for White
        assert_eq!(report.evaluations, vec!["+0.3"]);
    }
}
