//! Opening tree builder for ECO theory lookups.
//!
//! Every named line is replayed from the starting position; positions are
//! merged by FEN so transpositions share a node. The final node of each line
//! gets the line's name attached.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pgn::extract_moves;
use crate::rules::{MoveGenerator, ShakmatyBoard};

/// One row of the ECO dataset: code, name and the SAN movetext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcoLine {
    pub eco: String,
    pub name: String,
    pub moves: String,
}

/// A name attached to a tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedOpening {
    pub eco: String,
    pub name: String,
    pub full_line: String,
}

impl NamedOpening {
    /// Number of SAN moves in the canonical line.
    pub fn line_length(&self) -> usize {
        extract_moves(&self.full_line).len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningNode {
    pub fen: String,
    /// SAN -> FEN of the child position.
    pub moves: BTreeMap<String, String>,
    /// Names in registration order.
    pub openings: Vec<NamedOpening>,
    /// Ply depth at which the position was first reached.
    pub depth: usize,
}

impl OpeningNode {
    fn new(fen: &str, depth: usize) -> Self {
        Self {
            fen: fen.to_string(),
            moves: BTreeMap::new(),
            openings: Vec::new(),
            depth,
        }
    }
}

/// The whole theory tree: full FEN -> node.
pub type OpeningDataset = HashMap<String, OpeningNode>;

/// Parse lichess `chess-openings` TSV text (`eco<TAB>name<TAB>pgn`).
/// The header row and short rows are skipped.
pub fn parse_eco_tsv(text: &str) -> Vec<EcoLine> {
    text.lines()
        .filter(|line| !line.starts_with("eco\t"))
        .filter_map(|line| {
            let mut parts = line.trim_end().splitn(3, '\t');
            let eco = parts.next()?.trim();
            let name = parts.next()?.trim();
            let moves = parts.next()?.trim();
            if eco.is_empty() || name.is_empty() || moves.is_empty() {
                return None;
            }
            Some(EcoLine {
                eco: eco.to_string(),
                name: name.to_string(),
                moves: moves.to_string(),
            })
        })
        .collect()
}

/// Build the opening dataset from a list of named lines.
pub fn build_opening_dataset(lines: &[EcoLine]) -> OpeningDataset {
    let root = ShakmatyBoard::new();
    let root_fen = root.fen();
    let mut dataset = OpeningDataset::new();
    dataset.insert(root_fen.clone(), OpeningNode::new(&root_fen, 0));

    for line in lines {
        let mut board = root.clone();
        let mut current_fen = root_fen.clone();
        // Nodes are only written once the whole line replays cleanly.
        let mut path: Vec<(String, String, String, usize)> = Vec::new();
        let mut legal = true;

        for (ply, san) in extract_moves(&line.moves).iter().enumerate() {
            let played = match board.play(san) {
                Ok(p) => p,
                Err(e) => {
                    warn!(eco = %line.eco, name = %line.name, error = %e, "Skipping opening line");
                    legal = false;
                    break;
                }
            };
            let next_fen = board.fen();
            path.push((current_fen, played.san().to_string(), next_fen.clone(), ply + 1));
            current_fen = next_fen;
        }

        if !legal || path.is_empty() {
            continue;
        }

        for (parent, san, child, depth) in path {
            if let Some(node) = dataset.get_mut(&parent) {
                node.moves.entry(san).or_insert_with(|| child.clone());
            }
            dataset
                .entry(child.clone())
                .or_insert_with(|| OpeningNode::new(&child, depth));
        }

        if let Some(node) = dataset.get_mut(&current_fen) {
            if !node.openings.iter().any(|o| o.name == line.name) {
                node.openings.push(NamedOpening {
                    eco: line.eco.clone(),
                    name: line.name.clone(),
                    full_line: line.moves.clone(),
                });
            }
        }
    }

    dataset
}
