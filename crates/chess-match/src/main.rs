mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chess_analysis::{engine, EngineProcess, MoveEvaluator};
use chess_match::clock::SystemClock;
use chess_match::config::AppConfig;
use chess_match::flow::SessionFlow;
use chess_match::profile::ProfileStore;
use clap::{Parser, Subcommand};
use shakmaty::{Chess, Color, Position};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chess-match")]
#[command(about = "Play chess against a UCI engine")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value_os_t = AppConfig::default_path())]
    config: PathBuf,
    /// UCI engine executable (overrides the config file)
    #[arg(long)]
    engine: Option<String>,
    /// Profile store (overrides the config file)
    #[arg(long)]
    profile: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive play in the terminal (default)
    Play,
    /// Classify every move of a game given in UCI notation
    Evaluate {
        /// Moves from the initial position, e.g. e2e4 e7e5
        #[arg(required = true)]
        moves: Vec<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(path) = cli.engine {
        config.engine_path = path;
    }
    if let Some(path) = cli.profile {
        config.profile_path = path;
    }

    let process = EngineProcess::spawn(&config.engine_path)
        .with_context(|| format!("Failed to start engine '{}'", config.engine_path))?;
    tracing::info!(engine = process.name(), "engine ready");
    let engine = engine::share(process);

    match cli.command.unwrap_or(Commands::Play) {
        Commands::Play => {
            let flow = SessionFlow::new(
                ProfileStore::open(&config.profile_path),
                engine,
                Arc::new(SystemClock),
                config.session_settings(),
                config.evaluation_depth,
            );
            repl::run(flow).context("Terminal I/O failed")?;
        }
        Commands::Evaluate { moves, json } => {
            let start = Chess::default();
            let evaluator = MoveEvaluator::new(engine, config.evaluation_depth);
            let evaluated = evaluator.evaluate(&start, &moves)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&evaluated)?);
            } else {
                let white_first = start.turn() == Color::White;
                for (ply, mv) in evaluated.iter().enumerate() {
                    let number = ply / 2 + 1;
                    let dots = if (ply % 2 == 0) == white_first { "." } else { "..." };
                    println!(
                        "{}{} {:<8} {:<10} best {}",
                        number,
                        dots,
                        mv.san,
                        mv.class,
                        mv.best_move.as_deref().unwrap_or("-")
                    );
                }
                let (white, black) = chess_analysis::quality::tally(&evaluated, white_first);
                println!(
                    "White: {} best, {} acceptable, {} inaccurate",
                    white.best, white.acceptable, white.inaccurate
                );
                println!(
                    "Black: {} best, {} acceptable, {} inaccurate",
                    black.best, black.acceptable, black.inaccurate
                );
            }
        }
    }
    Ok(())
}
