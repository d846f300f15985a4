//! Build the opening theory tree from ECO TSV files.
//!
//! Reads lichess `chess-openings` style TSV files (eco, name, pgn), replays
//! every line and writes the tree as JSON plus a bincode copy next to it.
//!
//! Usage: cargo run --release --bin build-openings -- <out.json> <a.tsv> [b.tsv ...]
//!
//! Example:
//!   cargo run --release --bin build-openings -- data/eco_theory.json ../chess-openings/*.tsv

use std::env;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use chess_core::opening_tree::{build_opening_dataset, parse_eco_tsv, EcoLine};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <out.json> <eco.tsv>...", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  cargo run --release --bin build-openings -- data/eco_theory.json a.tsv b.tsv c.tsv d.tsv e.tsv");
        std::process::exit(1);
    }

    let out_path = Path::new(&args[1]);
    let start = Instant::now();

    let mut lines: Vec<EcoLine> = Vec::new();
    for tsv in &args[2..] {
        let text = fs::read_to_string(tsv).with_context(|| format!("reading {tsv}"))?;
        let parsed = parse_eco_tsv(&text);
        println!("  {:>5} lines from {}", parsed.len(), tsv);
        lines.extend(parsed);
    }

    println!("Replaying {} opening lines...", lines.len());
    let dataset = build_opening_dataset(&lines);
    let named = dataset.values().filter(|n| !n.openings.is_empty()).count();

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let writer = BufWriter::new(File::create(out_path)?);
    serde_json::to_writer(writer, &dataset)?;

    let bin_path = out_path.with_extension("bin");
    let file = File::create(&bin_path)?;
    bincode::serialize_into(BufWriter::new(file), &dataset)?;

    println!();
    println!("Done in {:.1}s", start.elapsed().as_secs_f64());
    println!("  Positions: {}", dataset.len());
    println!("  Named positions: {}", named);
    println!("  JSON: {} ({} KB)", out_path.display(), fs::metadata(out_path)?.len() / 1024);
    println!("  Binary: {} ({} KB)", bin_path.display(), fs::metadata(&bin_path)?.len() / 1024);

    Ok(())
}
