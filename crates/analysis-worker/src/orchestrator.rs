//! Full-game analysis.
//!
//! A run walks the move list one ply at a time: evaluate the position before
//! the move, play it, evaluate the position after it, classify. The after
//! evaluation of one ply is the before evaluation of the next. Progress is
//! published on a watch channel; only the current run may publish.

use std::sync::Arc;
use std::time::Duration;

use chess_core::{GameStatus, MoveGenerator, PositionKey, Side};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classifier::{classify_move, MoveContext, MoveQualityVerdict};
use crate::config::WorkerConfig;
use crate::error::AnalysisError;
use crate::evaluation::{perspective, EvaluationCache, PositionEvaluation, MATE_SCORE};
use crate::opening::{OpeningMatcher, OpeningTracker};
use crate::oracle::{EngineLine, OracleHandle, OracleSession, RunToken, SearchRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Fast,
    Full,
}

impl std::str::FromStr for AnalysisMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(AnalysisMode::Fast),
            "full" => Ok(AnalysisMode::Full),
            other => Err(AnalysisError::Config(format!(
                "unknown analysis mode {other:?} (expected fast or full)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisSettings {
    pub fast_depth: u32,
    pub full_depth: u32,
    /// Principal variations per position.
    pub lines: u32,
    pub timeout: Duration,
}

impl AnalysisSettings {
    pub fn depth(&self, mode: AnalysisMode) -> u32 {
        match mode {
            AnalysisMode::Fast => self.fast_depth,
            AnalysisMode::Full => self.full_depth,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for AnalysisSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            fast_depth: config.fast_depth,
            full_depth: config.full_depth,
            lines: config.multi_pv,
            timeout: config.oracle_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AnalysisState {
    Idle,
    Running { ply: usize, total: usize },
    Complete { total: usize },
    Failed { reason: String },
}

impl AnalysisState {
    pub fn is_finished(&self) -> bool {
        matches!(self, AnalysisState::Complete { .. } | AnalysisState::Failed { .. })
    }
}

/// One analysed ply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedMove {
    /// 0-based.
    pub ply: usize,
    pub move_number: u32,
    pub side: Side,
    pub san: String,
    pub uci: String,
    pub position_key: PositionKey,
    /// Resulting position, relative to the side to move there.
    pub evaluation: f64,
    pub mate: Option<i32>,
    pub depth: u32,
    pub verdict: MoveQualityVerdict,
    /// Engine lines for the position before the move.
    pub lines: Vec<EngineLine>,
    /// Last named opening reached so far.
    pub opening: Option<String>,
}

impl AnalyzedMove {
    /// Resulting evaluation with White positive.
    pub fn white_evaluation(&self) -> f64 {
        perspective(self.evaluation, self.side.opposite())
    }
}

/// Accepted evaluation of one position plus the lines that produced it.
#[derive(Debug, Clone)]
struct Evaluated {
    key: PositionKey,
    evaluation: f64,
    mate: Option<i32>,
    depth: u32,
    lines: Vec<EngineLine>,
}

impl Evaluated {
    fn new(key: PositionKey, entry: PositionEvaluation) -> Self {
        Self {
            key,
            evaluation: entry.evaluation,
            mate: entry.mate,
            depth: entry.depth,
            lines: entry.lines,
        }
    }
}

/// Evaluate a position through the oracle, or locally when the game is over.
/// The result goes through the shared cache; the deepest known evaluation
/// for the position is returned, together with the lines of that search.
async fn evaluate_position<G: MoveGenerator + ?Sized>(
    session: &OracleSession,
    cache: &EvaluationCache,
    token: &RunToken,
    ply: usize,
    board: &G,
    depth: u32,
    lines: u32,
) -> Result<Evaluated, AnalysisError> {
    let key = board.key();

    let (evaluation, mate, searched_depth, engine_lines) = match board.status() {
        GameStatus::Checkmate => (-MATE_SCORE, Some(0), depth, Vec::new()),
        GameStatus::Draw => (0.0, None, depth, Vec::new()),
        GameStatus::Ongoing => {
            let request = SearchRequest {
                fen: board.fen(),
                depth,
                lines,
            };
            let raw = session.request(token, ply, request).await?;
            let mut engine_lines: Vec<EngineLine> = raw
                .into_iter()
                .filter_map(|line| EngineLine::from_raw(line, board))
                .collect();
            engine_lines.sort_by_key(|line| line.rank);

            let Some(best) = engine_lines.first() else {
                // Nothing to score with; never invent a value for the cache.
                return match cache.get(&key) {
                    Some(cached) => {
                        warn!(ply, key = %key, "Oracle returned no usable lines, keeping cached evaluation");
                        Ok(Evaluated::new(key, cached))
                    }
                    None => Err(AnalysisError::OracleFailure {
                        ply,
                        reason: "oracle returned no usable lines".to_string(),
                    }),
                };
            };
            (best.evaluation, best.mate, best.depth, engine_lines)
        }
    };

    let fresh = PositionEvaluation {
        evaluation,
        depth: searched_depth,
        mate,
        lines: engine_lines,
        timestamp: chrono::Utc::now(),
    };
    cache.should_accept_with_lines(&key, searched_depth, evaluation, mate, fresh.lines.clone());
    let accepted = cache.get(&key).unwrap_or(fresh);

    Ok(Evaluated::new(key, accepted))
}

pub struct AnalysisOrchestrator {
    session: OracleSession,
    cache: Arc<EvaluationCache>,
    openings: Arc<OpeningMatcher>,
    settings: AnalysisSettings,
    state: watch::Sender<AnalysisState>,
}

impl AnalysisOrchestrator {
    pub fn new(
        oracle: OracleHandle,
        cache: Arc<EvaluationCache>,
        openings: Arc<OpeningMatcher>,
        settings: AnalysisSettings,
    ) -> Self {
        let (state, _) = watch::channel(AnalysisState::Idle);
        Self {
            session: OracleSession::new(oracle, settings.timeout),
            cache,
            openings,
            settings,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    fn publish(&self, token: &RunToken, state: AnalysisState) {
        if token.is_current() {
            self.state.send_replace(state);
        }
    }

    /// Abandon any in-flight run and forget all cached evaluations.
    pub fn new_game(&self) {
        let token = self.session.begin_run();
        self.cache.clear();
        self.publish(&token, AnalysisState::Idle);
    }

    /// Analyse `moves` (SAN or UCI) from the board's current position.
    ///
    /// Starting another run on this orchestrator supersedes this one, which
    /// then returns [`AnalysisError::Superseded`] without publishing.
    pub async fn analyze_game<G: MoveGenerator>(
        &self,
        board: G,
        moves: &[String],
        mode: AnalysisMode,
    ) -> Result<Vec<AnalyzedMove>, AnalysisError> {
        let token = self.session.begin_run();
        let total = moves.len();
        info!(run = token.run(), total, ?mode, "Starting game analysis");
        self.publish(&token, AnalysisState::Running { ply: 0, total });

        match self.run(&token, board, moves, mode).await {
            Ok(timeline) => {
                info!(run = token.run(), total, "Game analysis complete");
                self.publish(&token, AnalysisState::Complete { total });
                Ok(timeline)
            }
            Err(AnalysisError::Superseded { run }) => {
                debug!(run, "Game analysis superseded");
                Err(AnalysisError::Superseded { run })
            }
            Err(e) if !token.is_current() => {
                debug!(run = token.run(), error = %e, "Ignoring failure of superseded run");
                Err(AnalysisError::Superseded { run: token.run() })
            }
            Err(e) => {
                warn!(run = token.run(), error = %e, "Game analysis failed");
                self.publish(
                    &token,
                    AnalysisState::Failed {
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn run<G: MoveGenerator>(
        &self,
        token: &RunToken,
        mut board: G,
        moves: &[String],
        mode: AnalysisMode,
    ) -> Result<Vec<AnalyzedMove>, AnalysisError> {
        let depth = self.settings.depth(mode);
        let lines = self.settings.lines;
        let total = moves.len();

        let mut timeline = Vec::with_capacity(total);
        let mut tracker = OpeningTracker::new();
        let mut carried: Option<Evaluated> = None;

        for (ply, notation) in moves.iter().enumerate() {
            if !token.is_current() {
                return Err(AnalysisError::Superseded { run: token.run() });
            }

            let before = match carried.take() {
                Some(previous) if previous.key == board.key() => previous,
                _ => {
                    evaluate_position(&self.session, &self.cache, token, ply, &board, depth, lines)
                        .await?
                }
            };

            let legal_move_count = board.legal_moves().len();
            let move_number = board.fullmove_number();
            let side = board.side_to_move();

            let played = board
                .play(notation)
                .map_err(|source| AnalysisError::IllegalMove {
                    ply,
                    notation: notation.clone(),
                    source,
                })?;

            let after =
                evaluate_position(&self.session, &self.cache, token, ply, &board, depth, lines)
                    .await?;

            let uci = played.uci();
            let verdict = classify_move(&MoveContext {
                eval_before: before.evaluation,
                eval_after: after.evaluation,
                depth: before.depth.min(after.depth),
                move_number,
                played_uci: &uci,
                piece: played.piece,
                captured: played.captured,
                lines: &before.lines,
                legal_move_count,
            });

            let opening = tracker.observe(&self.openings, &board.fen()).map(String::from);

            debug!(
                ply,
                san = played.san(),
                label = %verdict.label,
                cp_loss = verdict.cp_loss,
                "Classified move"
            );

            timeline.push(AnalyzedMove {
                ply,
                move_number,
                side,
                san: played.san().to_string(),
                uci,
                position_key: after.key.clone(),
                evaluation: after.evaluation,
                mate: after.mate,
                depth: after.depth,
                verdict,
                lines: before.lines,
                opening,
            });

            carried = Some(after);
            self.publish(token, AnalysisState::Running { ply: ply + 1, total });
        }

        Ok(timeline)
    }
}

/// Single-position evaluation for live play. Shares the evaluation cache
/// with background analysis; each call replaces the previous one.
pub struct LiveEvaluator {
    session: OracleSession,
    cache: Arc<EvaluationCache>,
    lines: u32,
}

impl LiveEvaluator {
    pub fn new(oracle: OracleHandle, cache: Arc<EvaluationCache>, settings: &AnalysisSettings) -> Self {
        Self {
            session: OracleSession::new(oracle, settings.timeout),
            cache,
            lines: settings.lines,
        }
    }

    /// Deepest known evaluation of the board's position after searching it
    /// to `depth`, with the engine lines of that deepest search.
    pub async fn evaluate<G: MoveGenerator + ?Sized>(
        &self,
        board: &G,
        depth: u32,
    ) -> Result<PositionEvaluation, AnalysisError> {
        let token = self.session.begin_run();
        let evaluated =
            evaluate_position(&self.session, &self.cache, &token, 0, board, depth, self.lines)
                .await?;
        Ok(self.cache.get(&evaluated.key).unwrap_or(PositionEvaluation {
            evaluation: evaluated.evaluation,
            depth: evaluated.depth,
            mate: evaluated.mate,
            lines: evaluated.lines,
            timestamp: chrono::Utc::now(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_depths() {
        let settings = AnalysisSettings::default();
        assert_eq!(settings.depth(AnalysisMode::Fast), 10);
        assert_eq!(settings.depth(AnalysisMode::Full), 18);
        assert_eq!("FULL".parse::<AnalysisMode>().unwrap(), AnalysisMode::Full);
        assert!("deep".parse::<AnalysisMode>().is_err());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&AnalysisState::Running { ply: 3, total: 40 }).unwrap();
        assert_eq!(json, r#"{"state":"running","ply":3,"total":40}"#);
        assert!(AnalysisState::Complete { total: 1 }.is_finished());
        assert!(!AnalysisState::Idle.is_finished());
    }
}
