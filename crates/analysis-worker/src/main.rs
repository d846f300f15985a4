//! Game analysis worker
//!
//! Analyses the main line of a PGN file with a local Stockfish and prints
//! a JSON game report to stdout.
//!
//! Usage: analysis-worker <game.pgn> [--mode fast|full]

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use analysis_worker::config::WorkerConfig;
use analysis_worker::evaluation::EvaluationCache;
use analysis_worker::opening::{DatasetSource, OpeningMatcher};
use analysis_worker::oracle::OracleHandle;
use analysis_worker::orchestrator::{AnalysisMode, AnalysisOrchestrator, AnalysisSettings};
use analysis_worker::report::GameReport;
use analysis_worker::stockfish::StockfishEngine;
use chess_core::pgn::parse_pgn;
use chess_core::ShakmatyBoard;

struct Args {
    pgn_path: String,
    mode: AnalysisMode,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut pgn_path = None;
    let mut mode = AnalysisMode::Full;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--mode" => {
                let value = args.get(i + 1).context("--mode needs a value")?;
                mode = value.parse()?;
                i += 2;
            }
            other => {
                pgn_path = Some(other.to_string());
                i += 1;
            }
        }
    }

    let pgn_path = pgn_path.context("usage: analysis-worker <game.pgn> [--mode fast|full]")?;
    Ok(Args { pgn_path, mode })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args = parse_args()?;
    let config = WorkerConfig::from_env()?;

    let pgn = tokio::fs::read_to_string(&args.pgn_path)
        .await
        .with_context(|| format!("reading {}", args.pgn_path))?;
    let game = parse_pgn(&pgn).context("no moves found in PGN")?;
    info!(
        white = %game.metadata.white,
        black = %game.metadata.black,
        moves = game.moves.len(),
        "Game loaded"
    );

    let board = match &game.metadata.fen {
        Some(fen) => ShakmatyBoard::from_fen(fen)?,
        None => ShakmatyBoard::new(),
    };

    let openings = Arc::new(OpeningMatcher::default());
    openings
        .load(DatasetSource::File(config.openings_path.clone()))
        .await;

    let mut engine = StockfishEngine::new(
        &config.stockfish_path,
        config.engine_threads,
        config.engine_hash_mb,
    )
    .await?;
    engine.new_game().await?;
    info!(stockfish_path = %config.stockfish_path, "Stockfish engine ready");

    let (oracle, oracle_task) = OracleHandle::spawn(engine);
    let orchestrator = AnalysisOrchestrator::new(
        oracle,
        Arc::new(EvaluationCache::new()),
        openings,
        AnalysisSettings::from(&config),
    );

    let mut progress = orchestrator.subscribe();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let state = progress.borrow_and_update().clone();
            info!(?state, "Progress");
            if state.is_finished() {
                break;
            }
        }
    });

    let result = orchestrator
        .analyze_game(board, &game.moves, args.mode)
        .await;

    // Dropping the orchestrator stops the oracle task, which quits Stockfish
    drop(orchestrator);
    if let Err(e) = oracle_task.await {
        warn!(error = %e, "Oracle task ended abnormally");
    }
    let _ = watcher.await;

    let timeline = result?;
    let report = GameReport::build(&game.metadata, args.mode, timeline);
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
