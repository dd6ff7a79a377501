//! Demo CLI: runs a cold-start project scan and prints dependency-graph diagnostics.
//! This is the only place in the crate that installs a `tracing-subscriber`; the
//! library itself only emits events.

use std::process::ExitCode;

use clap::Parser;
use ice_core::{engine::IceEngine, types::FilePath, EngineConfig};

#[derive(Parser)]
#[command(name = "ice-cli", about = "Incremental Context Engine demo CLI")]
struct Cli {
    /// Project root to scan.
    #[arg(default_value = ".")]
    root: String,

    /// Print the dependency graph in dot format instead of a summary.
    #[arg(long)]
    dot: bool,

    /// Enable debug-level tracing output.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let engine = match IceEngine::new(EngineConfig::default()) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let root = FilePath::new(&cli.root);
    let report = engine.scan_project(&root);

    if !report.errors.is_empty() {
        for (path, err) in &report.errors {
            tracing::warn!(%path, %err, "scan error");
        }
    }

    if cli.dot {
        println!("{}", engine.to_dot());
        return ExitCode::SUCCESS;
    }

    let stats = engine.graph_stats();
    println!("files scanned:     {}", report.files_scanned);
    println!("scan errors:        {}", report.errors.len());
    println!("graph nodes:        {}", stats.total_nodes);
    println!("graph edges:        {}", stats.total_edges);
    println!("isolated files:     {}", stats.isolated_nodes);
    println!("max dependency depth: {}", stats.max_depth);
    println!(
        "average dependencies per file: {:.2}",
        stats.average_dependencies
    );

    let cycles = engine.detect_cycles();
    if cycles.is_empty() {
        println!("no cyclic dependencies detected");
    } else {
        println!("{} cyclic dependenc{} detected:", cycles.len(), if cycles.len() == 1 { "y" } else { "ies" });
        for cycle in &cycles {
            println!("  [{:?}] {}", cycle.severity, cycle.description);
        }
    }

    engine.shutdown();
    ExitCode::SUCCESS
}
