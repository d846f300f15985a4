//! Stockfish engine wrapper using UCI protocol (async I/O)

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::oracle::{RawLine, SearchEngine, SearchRequest};

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// Bytes of a line not yet terminated; survives a dropped read
    pending: Vec<u8>,
    /// MultiPV value currently set on the engine
    multipv: u32,
    /// A `go` was sent and its `bestmove` not read yet
    searching: bool,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(path: &str, threads: u32, hash_mb: u32) -> Result<Self, AnalysisError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| AnalysisError::Stockfish(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| AnalysisError::Stockfish("Stockfish stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| AnalysisError::Stockfish("Stockfish stdout not captured".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
            pending: Vec::new(),
            multipv: 1,
            searching: false,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine
            .send(&format!("setoption name Threads value {threads}"))
            .await?;
        engine
            .send(&format!("setoption name Hash value {hash_mb}"))
            .await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), AnalysisError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| AnalysisError::Stockfish(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| AnalysisError::Stockfish(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one full line. Partial input stays buffered when the future is
    /// dropped, so the next call picks up where this one stopped.
    async fn read_line(&mut self) -> Result<String, AnalysisError> {
        let n = self
            .stdout
            .read_until(b'\n', &mut self.pending)
            .await
            .map_err(|e| AnalysisError::Stockfish(format!("Failed to read from Stockfish: {e}")))?;
        if n == 0 {
            return Err(AnalysisError::Stockfish("Stockfish closed its output".into()));
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Ok(line)
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), AnalysisError> {
        loop {
            let line = self.read_line().await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Stop a running search and discard its output up to `bestmove`
    pub async fn stop(&mut self) -> Result<(), AnalysisError> {
        if !self.searching {
            return Ok(());
        }
        self.send("stop").await?;
        loop {
            let line = self.read_line().await?;
            if line.trim_start().starts_with("bestmove") {
                break;
            }
        }
        self.searching = false;
        Ok(())
    }

    /// Clear engine state between games
    pub async fn new_game(&mut self) -> Result<(), AnalysisError> {
        self.send("ucinewgame").await?;
        self.send("isready").await?;
        self.wait_for("readyok").await
    }

    /// Search a position to a fixed depth, returning up to `multipv` lines
    pub async fn analyse(
        &mut self,
        fen: &str,
        depth: u32,
        multipv: u32,
    ) -> Result<Vec<RawLine>, AnalysisError> {
        // A previous search was abandoned without being stopped
        self.stop().await?;

        let multipv = multipv.max(1);
        if multipv != self.multipv {
            self.send(&format!("setoption name MultiPV value {multipv}"))
                .await?;
            self.multipv = multipv;
        }
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;
        self.searching = true;

        let mut lines: Vec<Option<RawLine>> = vec![None; multipv as usize];

        loop {
            let line = self.read_line().await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" pv ") {
                // Bound scores are provisional; wait for the exact one.
                if is_bound(trimmed) {
                    continue;
                }
                // Parse multipv index (1-based)
                let pv_idx = parse_multipv_index(trimmed).unwrap_or(1).max(1) - 1;
                if let Some(slot) = lines.get_mut(pv_idx as usize) {
                    *slot = Some(RawLine {
                        rank: pv_idx,
                        moves: parse_pv(trimmed),
                        depth: parse_depth(trimmed).unwrap_or(0),
                        cp: parse_cp(trimmed),
                        mate: parse_mate(trimmed),
                    });
                }
            } else if trimmed.starts_with("bestmove") {
                self.searching = false;
                break;
            }
        }

        Ok(lines
            .into_iter()
            .flatten()
            .filter(|l| !l.moves.is_empty())
            .collect())
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl SearchEngine for StockfishEngine {
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<RawLine>, AnalysisError> {
        self.analyse(&request.fen, request.depth, request.lines).await
    }

    async fn cancel(&mut self) {
        if let Err(e) = self.stop().await {
            warn!(error = %e, "Failed to stop abandoned search");
        }
    }

    async fn shutdown(&mut self) {
        self.quit().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Value following `key` in a whitespace-separated info line
fn parse_field<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == key {
            return parts.next()?.parse().ok();
        }
        // Nothing after pv is a field
        if part == "pv" {
            return None;
        }
    }
    None
}

fn parse_cp(line: &str) -> Option<i32> {
    parse_field(line, "cp")
}

fn parse_mate(line: &str) -> Option<i32> {
    parse_field(line, "mate")
}

fn parse_depth(line: &str) -> Option<u32> {
    parse_field(line, "depth")
}

/// Parse multipv index from info line
fn parse_multipv_index(line: &str) -> Option<u32> {
    parse_field(line, "multipv")
}

fn is_bound(line: &str) -> bool {
    line.split_whitespace()
        .take_while(|p| *p != "pv")
        .any(|p| p == "lowerbound" || p == "upperbound")
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}
