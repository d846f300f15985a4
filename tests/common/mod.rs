//! Shared helpers for pipeline tests: a scripted in-memory search engine.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_worker::oracle::{RawLine, SearchEngine, SearchRequest};
use analysis_worker::AnalysisError;
use chess_core::{normalize_fen, MoveGenerator, ShakmatyBoard};

/// Scripted answer for one position.
#[derive(Clone, Debug)]
pub struct Script {
    pub cp: Option<i32>,
    pub mate: Option<i32>,
    /// UCI first moves, best first.
    pub moves: Vec<String>,
}

impl Script {
    pub fn cp(cp: i32, moves: &[&str]) -> Self {
        Self {
            cp: Some(cp),
            mate: None,
            moves: moves.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn mate(n: i32, moves: &[&str]) -> Self {
        Self {
            cp: None,
            mate: Some(n),
            moves: moves.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Answers from a table keyed by position; unknown positions score 0 with
/// the first legal move as the only line.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    scripts: HashMap<String, Script>,
    delay: Duration,
    /// Calls numbered in this range never answer.
    hangs: Option<Range<usize>>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<(String, u32)>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, fen: &str, script: Script) -> Self {
        self.scripts.insert(normalize_fen(fen), script);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn hang_from(mut self, call: usize) -> Self {
        self.hangs = Some(call..usize::MAX);
        self
    }

    /// Only this call never answers.
    pub fn hang_at(mut self, call: usize) -> Self {
        self.hangs = Some(call..call + 1);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// (fen, depth) of every request served so far.
    pub fn seen(&self) -> Arc<Mutex<Vec<(String, u32)>>> {
        Arc::clone(&self.seen)
    }
}

impl SearchEngine for ScriptedEngine {
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<RawLine>, AnalysisError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hangs.as_ref().is_some_and(|hangs| hangs.contains(&call)) {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.seen
            .lock()
            .unwrap()
            .push((request.fen.clone(), request.depth));

        let script = match self.scripts.get(&normalize_fen(&request.fen)) {
            Some(s) => s.clone(),
            None => {
                let board = ShakmatyBoard::from_fen(&request.fen)
                    .map_err(|e| AnalysisError::Stockfish(e.to_string()))?;
                let first = board
                    .legal_moves()
                    .first()
                    .map(|m| m.uci())
                    .unwrap_or_default();
                Script::cp(0, &[first.as_str()])
            }
        };

        Ok(script
            .moves
            .iter()
            .take(request.lines as usize)
            .enumerate()
            .map(|(rank, mv)| RawLine {
                rank: rank as u32,
                moves: vec![mv.clone()],
                depth: request.depth,
                // Lower-ranked lines score a little worse
                cp: script.cp.map(|cp| cp - 10 * rank as i32),
                mate: if rank == 0 { script.mate } else { None },
            })
            .collect())
    }
}

/// FEN reached by playing `moves` from the start position.
pub fn fen_after(moves: &[&str]) -> String {
    let mut board = ShakmatyBoard::new();
    for m in moves {
        board.play(m).unwrap();
    }
    board.fen()
}

pub fn to_moves(moves: &[&str]) -> Vec<String> {
    moves.iter().map(|m| m.to_string()).collect()
}
