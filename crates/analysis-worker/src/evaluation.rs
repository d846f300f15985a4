//! Evaluation normalization, depth-gated caching and display smoothing.
//!
//! All scores here are relative to the side to move. Conversion to a
//! White-relative number happens only in the presentation helpers at the
//! bottom of this module.

use std::collections::HashMap;
use std::sync::Mutex;

use chess_core::{PositionKey, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::oracle::EngineLine;

/// Normalized value reserved for a forced mate.
pub const MATE_SCORE: f64 = 15.0;

/// Clamp for centipawn-derived values, in pawns.
pub const MAX_PAWNS: f64 = 10.0;

/// Gap below which smoothing snaps to the target.
const SNAP_EPSILON: f64 = 0.01;

/// Reference frame length for smoothing, in milliseconds.
const FRAME_MS: f64 = 16.0;

/// Depth at which smoothing speed saturates.
const SATURATION_DEPTH: f64 = 20.0;

/// Raw engine score, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum EngineScore {
    Centipawns(i32),
    /// Mate in N; positive = side to move mates.
    Mate(i32),
}

impl EngineScore {
    pub fn from_parts(cp: Option<i32>, mate: Option<i32>) -> Self {
        match (mate, cp) {
            (Some(m), _) => EngineScore::Mate(m),
            (None, Some(cp)) => EngineScore::Centipawns(cp),
            (None, None) => EngineScore::Centipawns(0),
        }
    }

    pub fn mate(self) -> Option<i32> {
        match self {
            EngineScore::Mate(m) => Some(m),
            EngineScore::Centipawns(_) => None,
        }
    }

    pub fn normalized(self) -> f64 {
        match self {
            EngineScore::Centipawns(cp) => normalize(cp, None),
            EngineScore::Mate(m) => normalize(0, Some(m)),
        }
    }
}

/// Map raw engine output to a bounded scalar in pawns.
///
/// Mate scores map to ±15 and never blend with centipawn values; everything
/// else is `cp / 100` clamped to ±10.
pub fn normalize(centipawns: i32, mate: Option<i32>) -> f64 {
    if let Some(m) = mate {
        return if m > 0 { MATE_SCORE } else { -MATE_SCORE };
    }
    (centipawns as f64 / 100.0).clamp(-MAX_PAWNS, MAX_PAWNS)
}

pub fn is_mate_value(evaluation: f64) -> bool {
    evaluation.abs() == MATE_SCORE
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Advance a displayed value toward its target. Display only, never used
/// for classification.
pub fn interpolate(current: f64, target: f64, depth: u32, elapsed_ms: f64) -> f64 {
    let current = finite_or_zero(current);
    let target = finite_or_zero(target);

    if is_mate_value(target) {
        return target;
    }

    let gap = target - current;
    if gap.abs() < SNAP_EPSILON {
        return target;
    }

    let depth_factor = (depth as f64 / SATURATION_DEPTH).min(1.0);
    let speed = 0.1 + depth_factor * 0.15;
    let fraction = (speed * finite_or_zero(elapsed_ms).max(0.0) / FRAME_MS).min(1.0);

    current + gap * fraction
}

/// White-positive value of an evaluation for the given side.
pub fn perspective(evaluation: f64, side: Side) -> f64 {
    match side {
        Side::White => evaluation,
        Side::Black => -evaluation,
    }
}

/// Cached evaluation for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEvaluation {
    pub evaluation: f64,
    pub depth: u32,
    pub mate: Option<i32>,
    /// Ranked lines of the search this evaluation came from.
    #[serde(default)]
    pub lines: Vec<EngineLine>,
    pub timestamp: DateTime<Utc>,
}

/// Session-wide evaluation cache.
///
/// Writes go through [`EvaluationCache::should_accept`] (or its variant
/// carrying engine lines), which refuses shallower results for a position
/// already evaluated deeper. The lines are replaced together with the value.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    entries: Mutex<HashMap<PositionKey, PositionEvaluation>>,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<PositionKey, PositionEvaluation>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store the evaluation if the key is new or `depth` is at least the
    /// cached depth. Returns whether it was stored.
    pub fn should_accept(
        &self,
        key: &PositionKey,
        depth: u32,
        evaluation: f64,
        mate: Option<i32>,
    ) -> bool {
        self.should_accept_with_lines(key, depth, evaluation, mate, Vec::new())
    }

    pub fn should_accept_with_lines(
        &self,
        key: &PositionKey,
        depth: u32,
        evaluation: f64,
        mate: Option<i32>,
        lines: Vec<EngineLine>,
    ) -> bool {
        let mut entries = self.entries();
        if let Some(cached) = entries.get(key) {
            if depth < cached.depth {
                debug!(key = %key, depth, cached_depth = cached.depth, "Discarding shallower evaluation");
                return false;
            }
        }
        entries.insert(
            key.clone(),
            PositionEvaluation {
                evaluation: finite_or_zero(evaluation).clamp(-MATE_SCORE, MATE_SCORE),
                depth,
                mate,
                lines,
                timestamp: Utc::now(),
            },
        );
        true
    }

    pub fn get(&self, key: &PositionKey) -> Option<PositionEvaluation> {
        self.entries().get(key).cloned()
    }

    /// Forget everything (new game).
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Change in evaluation from `side`'s point of view, given White-relative
/// before/after values.
pub fn evaluation_delta(before: f64, after: f64, side: Side) -> f64 {
    perspective(after, side) - perspective(before, side)
}

/// Evaluation bar fill in percent: 50 is equal, 100 is White winning.
pub fn evaluation_bar_height(evaluation: f64) -> f64 {
    let clamped = finite_or_zero(evaluation).clamp(-MATE_SCORE, MATE_SCORE);
    (clamped + MATE_SCORE) / (2.0 * MATE_SCORE) * 100.0
}

/// "+2.5", "-0.8", or "M5" for mate.
pub fn format_evaluation(evaluation: f64, mate: Option<i32>) -> String {
    if let Some(m) = mate {
        return format!("M{}", m.abs());
    }
    let evaluation = finite_or_zero(evaluation);
    if evaluation >= 0.0 {
        format!("+{evaluation:.1}")
    } else {
        format!("{evaluation:.1}")
    }
}
