//! Opening identification over the pre-built theory tree.
//!
//! The dataset is loaded once per matcher. A failed load leaves an empty
//! dataset installed, so every later lookup reports no match.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chess_core::opening_tree::{NamedOpening, OpeningDataset, OpeningNode};
use chess_core::normalize_fen;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::AnalysisError;

/// Where the theory tree comes from.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// JSON map, or bincode when the extension is `.bin`.
    File(PathBuf),
    Json(String),
}

/// Which attached name counts as "the" opening of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamePolicy {
    /// Last name attached while building the dataset.
    #[default]
    LastRegistered,
    /// Name with the longest canonical line; ties go to the later one.
    LongestLine,
}

impl NamePolicy {
    fn pick(self, openings: &[NamedOpening]) -> Option<usize> {
        match self {
            NamePolicy::LastRegistered => openings.len().checked_sub(1),
            NamePolicy::LongestLine => openings
                .iter()
                .enumerate()
                .max_by_key(|(i, o)| (o.line_length(), *i))
                .map(|(i, _)| i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningMatch {
    pub name: String,
    pub eco: String,
    pub line: String,
    pub fen: String,
    pub depth: usize,
    /// Other names reaching the same position.
    pub transpositions: Vec<String>,
    /// Theory moves out of this position, in SAN.
    pub next_moves: Vec<String>,
}

pub struct OpeningMatcher {
    dataset: OnceCell<OpeningDataset>,
    policy: NamePolicy,
}

impl Default for OpeningMatcher {
    fn default() -> Self {
        Self::new(NamePolicy::default())
    }
}

impl OpeningMatcher {
    pub fn new(policy: NamePolicy) -> Self {
        Self {
            dataset: OnceCell::new(),
            policy,
        }
    }

    /// Matcher with an already built dataset.
    pub fn from_dataset(dataset: OpeningDataset, policy: NamePolicy) -> Self {
        Self {
            dataset: OnceCell::new_with(Some(dataset)),
            policy,
        }
    }

    /// Load the dataset once. Later calls, and calls racing the first one,
    /// reuse whatever the first load installed.
    pub async fn load(&self, source: DatasetSource) {
        self.dataset
            .get_or_init(|| async move {
                match read_dataset(&source).await {
                    Ok(dataset) => {
                        info!(positions = dataset.len(), "Loaded opening dataset");
                        dataset
                    }
                    Err(e) => {
                        warn!(source = ?source, error = %e, "Failed to load opening dataset");
                        warn!("Opening identification will be disabled");
                        OpeningDataset::new()
                    }
                }
            })
            .await;
    }

    pub fn is_loaded(&self) -> bool {
        self.dataset.initialized()
    }

    /// Number of positions in the loaded dataset (0 before loading).
    pub fn len(&self) -> usize {
        self.dataset.get().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, fen: &str) -> Option<&OpeningNode> {
        let dataset = self.dataset.get()?;
        if let Some(node) = dataset.get(fen) {
            return Some(node);
        }

        // Move counters differ; match on the position fields only.
        let prefix = format!("{} ", normalize_fen(fen));
        dataset
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix) || **key == prefix.trim_end())
            .min_by(|a, b| a.0.cmp(b.0))
            .map(|(_, node)| node)
    }

    /// Named opening at this exact position, if any.
    pub fn identify(&self, fen: &str) -> Option<OpeningMatch> {
        let node = self.node(fen)?;
        let chosen = self.policy.pick(&node.openings)?;
        let opening = &node.openings[chosen];

        let mut transpositions: Vec<String> = Vec::new();
        for (i, other) in node.openings.iter().enumerate() {
            if i != chosen && other.name != opening.name && !transpositions.contains(&other.name) {
                transpositions.push(other.name.clone());
            }
        }

        Some(OpeningMatch {
            name: opening.name.clone(),
            eco: opening.eco.clone(),
            line: opening.full_line.clone(),
            fen: node.fen.clone(),
            depth: node.depth,
            transpositions,
            next_moves: node.moves.keys().cloned().collect(),
        })
    }

    /// SAN moves that stay in theory from this position.
    pub fn theory_moves(&self, fen: &str) -> Vec<String> {
        self.node(fen)
            .map(|node| node.moves.keys().cloned().collect())
            .unwrap_or_default()
    }
}

async fn read_dataset(source: &DatasetSource) -> Result<OpeningDataset, AnalysisError> {
    match source {
        DatasetSource::Json(text) => Ok(serde_json::from_str(text)?),
        DatasetSource::File(path) => {
            let bytes = tokio::fs::read(path).await?;
            if is_binary(path) {
                bincode::deserialize(&bytes).map_err(|e| AnalysisError::Dataset(e.to_string()))
            } else {
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }
}

fn is_binary(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "bin")
}

/// Remembers the last named opening seen while walking a game.
#[derive(Debug, Clone, Default)]
pub struct OpeningTracker {
    current: Option<OpeningMatch>,
}

impl OpeningTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the position and return the last known opening name.
    pub fn observe(&mut self, matcher: &OpeningMatcher, fen: &str) -> Option<&str> {
        if let Some(found) = matcher.identify(fen) {
            self.current = Some(found);
        }
        self.name()
    }

    pub fn name(&self) -> Option<&str> {
        self.current.as_ref().map(|m| m.name.as_str())
    }

    pub fn current(&self) -> Option<&OpeningMatch> {
        self.current.as_ref()
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::opening_tree::{build_opening_dataset, EcoLine};
    use chess_core::{MoveGenerator, ShakmatyBoard, START_FEN};

    fn line(eco: &str, name: &str, moves: &str) -> EcoLine {
        EcoLine {
            eco: eco.into(),
            name: name.into(),
            moves: moves.into(),
        }
    }

    fn fen_after(moves: &[&str]) -> String {
        let mut board = ShakmatyBoard::new();
        for m in moves {
            board.play(m).unwrap();
        }
        board.fen()
    }

    fn sample() -> OpeningDataset {
        build_opening_dataset(&[
            line("C20", "King's Pawn Game", "1. e4 e5"),
            line("C40", "King's Knight Opening", "1. e4 e5 2. Nf3"),
            line("E10", "Queen's Pawn, Long Name", "1. d4 Nf6 2. Nf3 e6 3. c4"),
            line("A46", "Short Alias", "1. Nf3 Nf6 2. d4 e6 3. c4"),
        ])
    }

    #[test]
    fn test_identify_exact() {
        let matcher = OpeningMatcher::from_dataset(sample(), NamePolicy::LastRegistered);
        let found = matcher.identify(&fen_after(&["e4", "e5"])).unwrap();
        assert_eq!(found.name, "King's Pawn Game");
        assert_eq!(found.eco, "C20");
        assert_eq!(found.depth, 2);
        assert_eq!(found.next_moves, vec!["Nf3"]);
        assert!(found.transpositions.is_empty());
    }

    #[test]
    fn test_identify_ignores_move_counters() {
        let matcher = OpeningMatcher::from_dataset(sample(), NamePolicy::LastRegistered);
        let fen = fen_after(&["e4", "e5"]);
        let fields: Vec<&str> = fen.split_whitespace().take(4).collect();
        let shifted = format!("{} 7 31", fields.join(" "));
        assert_eq!(
            matcher.identify(&shifted).map(|m| m.name),
            Some("King's Pawn Game".to_string())
        );
    }

    #[test]
    fn test_unnamed_and_unknown_positions() {
        let matcher = OpeningMatcher::from_dataset(sample(), NamePolicy::LastRegistered);
        assert!(matcher.identify(&fen_after(&["e4"])).is_none());
        assert_eq!(matcher.theory_moves(&fen_after(&["e4"])), vec!["e5"]);
        assert!(matcher.identify(&fen_after(&["h4"])).is_none());
        assert!(matcher.theory_moves(&fen_after(&["h4"])).is_empty());
    }

    #[test]
    fn test_name_policies_on_transposition() {
        let fen = fen_after(&["d4", "Nf6", "Nf3", "e6", "c4"]);

        let last = OpeningMatcher::from_dataset(sample(), NamePolicy::LastRegistered);
        let found = last.identify(&fen).unwrap();
        assert_eq!(found.name, "Short Alias");
        assert_eq!(found.transpositions, vec!["Queen's Pawn, Long Name"]);

        let mut data = sample();
        if let Some(node) = data.get_mut(&fen) {
            node.openings[0].full_line = "1. d4 Nf6 2. Nf3 e6 3. c4 b6 4. g3".into();
        }
        let longest = OpeningMatcher::from_dataset(data, NamePolicy::LongestLine);
        assert_eq!(longest.identify(&fen).unwrap().name, "Queen's Pawn, Long Name");
    }

    #[test]
    fn test_identify_is_idempotent() {
        let matcher = OpeningMatcher::from_dataset(sample(), NamePolicy::default());
        let fen = fen_after(&["e4", "e5", "Nf3"]);
        assert_eq!(matcher.identify(&fen), matcher.identify(&fen));
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let json = serde_json::to_string(&sample()).unwrap();
        let matcher = OpeningMatcher::default();
        assert!(!matcher.is_loaded());
        matcher.load(DatasetSource::Json(json)).await;
        let loaded = matcher.len();
        assert!(loaded > 1);

        matcher.load(DatasetSource::Json("{}".into())).await;
        assert_eq!(matcher.len(), loaded);
    }

    #[tokio::test]
    async fn test_failed_load_degrades_to_no_match() {
        let matcher = OpeningMatcher::default();
        matcher
            .load(DatasetSource::File("/nonexistent/eco_theory.json".into()))
            .await;
        assert!(matcher.is_loaded());
        assert!(matcher.is_empty());
        assert!(matcher.identify(START_FEN).is_none());

        matcher.load(DatasetSource::Json(serde_json::to_string(&sample()).unwrap())).await;
        assert!(matcher.is_empty());
    }

    #[test]
    fn test_tracker_keeps_last_name() {
        let matcher = OpeningMatcher::from_dataset(sample(), NamePolicy::default());
        let mut tracker = OpeningTracker::new();
        assert_eq!(tracker.observe(&matcher, &fen_after(&["e4"])), None);
        assert_eq!(
            tracker.observe(&matcher, &fen_after(&["e4", "e5"])),
            Some("King's Pawn Game")
        );
        assert_eq!(
            tracker.observe(&matcher, &fen_after(&["e4", "e5", "Nf3", "Nc6"])),
            Some("King's Pawn Game")
        );
        tracker.reset();
        assert_eq!(tracker.name(), None);
    }
}
