//! Worker configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::error::AnalysisError;

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Path to Stockfish binary
    pub stockfish_path: String,

    /// Search depth for fast analysis
    pub fast_depth: u32,

    /// Search depth for full analysis
    pub full_depth: u32,

    /// Principal variations requested per position
    pub multi_pv: u32,

    /// Deadline for a single oracle request
    pub oracle_timeout: Duration,

    /// Stockfish `Threads` option
    pub engine_threads: u32,

    /// Stockfish `Hash` option in MB
    pub engine_hash_mb: u32,

    /// Opening dataset (JSON, or bincode when the extension is `.bin`)
    pub openings_path: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "/usr/local/bin/stockfish".to_string(),
            fast_depth: 10,
            full_depth: 18,
            multi_pv: 3,
            oracle_timeout: Duration::from_secs(30),
            engine_threads: 1,
            engine_hash_mb: 64,
            openings_path: PathBuf::from("data/eco_theory.json"),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AnalysisError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AnalysisError::Config(format!("{key} is not a valid number: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, AnalysisError> {
        let defaults = Self::default();

        let config = Self {
            stockfish_path: env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path),
            fast_depth: parsed("FAST_DEPTH", defaults.fast_depth)?,
            full_depth: parsed("FULL_DEPTH", defaults.full_depth)?,
            multi_pv: parsed("MULTI_PV", defaults.multi_pv)?,
            oracle_timeout: Duration::from_secs(parsed(
                "ORACLE_TIMEOUT_SECS",
                defaults.oracle_timeout.as_secs(),
            )?),
            engine_threads: parsed("ENGINE_THREADS", defaults.engine_threads)?,
            engine_hash_mb: parsed("ENGINE_HASH_MB", defaults.engine_hash_mb)?,
            openings_path: env::var("OPENINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.openings_path),
        };

        config.validate()?;
        info!(
            stockfish_path = %config.stockfish_path,
            fast_depth = config.fast_depth,
            full_depth = config.full_depth,
            multi_pv = config.multi_pv,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.fast_depth == 0 || self.full_depth == 0 {
            return Err(AnalysisError::Config("search depths must be positive".into()));
        }
        if self.fast_depth > self.full_depth {
            return Err(AnalysisError::Config(format!(
                "FAST_DEPTH ({}) exceeds FULL_DEPTH ({})",
                self.fast_depth, self.full_depth
            )));
        }
        if self.multi_pv == 0 {
            return Err(AnalysisError::Config("MULTI_PV must be at least 1".into()));
        }
        if self.oracle_timeout.is_zero() {
            return Err(AnalysisError::Config("ORACLE_TIMEOUT_SECS must be positive".into()));
        }
        if self.engine_threads == 0 {
            return Err(AnalysisError::Config("ENGINE_THREADS must be at least 1".into()));
        }
        Ok(())
    }
}
