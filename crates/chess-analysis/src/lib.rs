//! Chess engine access and post-game move classification.
//!
//! # Overview
//!
//! - [`Evaluation`] - Position evaluation (centipawn or mate score)
//! - [`MoveClass`] - Best / Acceptable / Inaccurate classification
//! - [`SearchEngine`] - The engine seam; [`EngineProcess`] drives a UCI
//!   engine such as Stockfish over pipes
//! - [`MoveEvaluator`] - Classifies every move of a finished game
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{engine, EngineProcess, MoveEvaluator};
//! use shakmaty::Chess;
//!
//! let engine = engine::share(EngineProcess::spawn("stockfish")?);
//! let evaluator = MoveEvaluator::new(engine, 22);
//! let moves = vec!["e2e4".to_string(), "e7e5".to_string()];
//! for mv in evaluator.evaluate(&Chess::default(), &moves)? {
//!     println!("{} {}", mv.san, mv.class);
//! }
//! ```

pub mod analyzer;
pub mod engine;
pub mod evaluation;
pub mod notation;
pub mod quality;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use analyzer::{AnalyzerError, MoveEvaluator};
pub use engine::{
    EngineError, EngineProcess, PositionAnalysis, SearchEngine, SearchLimit, SharedEngine,
};
pub use evaluation::Evaluation;
pub use quality::{ClassCounts, EvaluatedMove, MoveClass};
