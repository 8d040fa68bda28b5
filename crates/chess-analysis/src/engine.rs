//! UCI engine process client.
//!
//! [`SearchEngine`] is the seam the match session and the move evaluator
//! talk to. [`EngineProcess`] implements it over a child process speaking
//! UCI on stdin/stdout; tests substitute a scripted engine.

use crate::Evaluation;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uci::{EngineInfo, EngineMessage, GoOptions, GuiCommand};

/// Maximum number of lines to read before giving up on a UCI response.
pub const MAX_UCI_LINES: usize = 10_000;

/// Errors that can occur when talking to a chess engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Reading from or writing to the engine process failed.
    #[error("Engine I/O error: {0}")]
    Io(#[from] io::Error),
    /// Engine executable was not found at the specified path.
    #[error("Engine not found at path: {0}")]
    NotFound(String),
    /// Engine failed to initialize properly (UCI handshake failed).
    #[error("Engine initialization failed")]
    InitFailed,
    /// Engine returned an invalid or unexpected response.
    #[error("Invalid engine response: {0}")]
    InvalidResponse(String),
    /// The engine process exited or closed its pipes.
    #[error("Engine process terminated")]
    Terminated,
    /// The engine handle is unusable (a previous holder panicked).
    #[error("Engine unavailable")]
    Unavailable,
}

/// How long an engine may search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    /// Search to a fixed depth in plies.
    Depth(u32),
    /// Search for a fixed wall-clock budget.
    MoveTime(Duration),
}

impl SearchLimit {
    fn go_options(self) -> GoOptions {
        match self {
            SearchLimit::Depth(depth) => GoOptions::depth(depth),
            SearchLimit::MoveTime(budget) => GoOptions::movetime(budget),
        }
    }
}

/// Result of analyzing a chess position.
///
/// Either field may be missing: a mated or stalemated position has no best
/// move, and an engine may answer `bestmove` without ever printing a score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionAnalysis {
    /// The best move found (in UCI notation, e.g., "e2e4").
    pub best_move: Option<String>,
    /// Evaluation from the side to move's point of view.
    pub evaluation: Option<Evaluation>,
    /// The deepest search depth reported.
    pub depth: u32,
    /// The number of nodes searched.
    pub nodes: u64,
    /// The principal variation (sequence of best moves).
    pub pv: Vec<String>,
}

/// Something that can search chess positions.
pub trait SearchEngine {
    /// Best move for the position, or `None` when the side to move has none.
    fn best_move(&mut self, fen: &str, limit: SearchLimit) -> Result<Option<String>, EngineError>;

    /// Score and best move for the position at a fixed depth.
    fn analyze(&mut self, fen: &str, depth: u32) -> Result<PositionAnalysis, EngineError>;

    /// Tell the engine the following searches belong to a new game.
    fn new_game(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Engine handle shared between a match session and its evaluator.
pub type SharedEngine = Arc<Mutex<dyn SearchEngine + Send>>;

/// Wrap an engine for sharing.
pub fn share<E: SearchEngine + Send + 'static>(engine: E) -> SharedEngine {
    Arc::new(Mutex::new(engine))
}

/// Lock a shared engine for one request.
pub fn lock_engine(
    engine: &SharedEngine,
) -> Result<MutexGuard<'_, dyn SearchEngine + Send + 'static>, EngineError> {
    engine.lock().map_err(|_| EngineError::Unavailable)
}

/// A UCI engine running as a child process.
pub struct EngineProcess {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    name: String,
}

impl EngineProcess {
    /// Spawn the engine and complete the `uci`/`isready` handshake.
    ///
    /// A bare program name (no path separator) is resolved through `PATH`;
    /// anything that looks like a path must exist.
    ///
    /// # Errors
    ///
    /// - `EngineError::NotFound` if an explicit path doesn't exist
    /// - `EngineError::Io` if the process fails to start
    /// - `EngineError::InitFailed` if the handshake fails
    pub fn spawn(engine_path: &str) -> Result<Self, EngineError> {
        let path = Path::new(engine_path);
        if path.components().count() > 1 && !path.exists() {
            return Err(EngineError::NotFound(engine_path.to_string()));
        }

        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => EngineError::NotFound(engine_path.to_string()),
                _ => EngineError::Io(e),
            })?;

        let stdin = process.stdin.take().ok_or(EngineError::InitFailed)?;
        let stdout = process.stdout.take().ok_or(EngineError::InitFailed)?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
            name: String::new(),
        };
        engine.handshake()?;
        debug!(engine = %engine.name, "engine ready");

        Ok(engine)
    }

    /// Returns the engine's name as reported via `id name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn handshake(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::Uci)?;

        let mut name = None;
        for _ in 0..MAX_UCI_LINES {
            match self.read_message()? {
                Some(EngineMessage::Id { name: Some(n), .. }) => name = Some(n),
                Some(EngineMessage::UciOk) => {
                    self.name = name.unwrap_or_else(|| "Unknown Engine".to_string());
                    return self.wait_ready().map_err(|_| EngineError::InitFailed);
                }
                _ => {}
            }
        }

        Err(EngineError::InitFailed)
    }

    fn wait_ready(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::IsReady)?;
        for _ in 0..MAX_UCI_LINES {
            if let Some(EngineMessage::ReadyOk) = self.read_message()? {
                return Ok(());
            }
        }
        Err(EngineError::InvalidResponse(
            "Too many lines without readyok".to_string(),
        ))
    }

    /// Set the position and search until `bestmove`.
    fn search(&mut self, fen: &str, opts: GoOptions) -> Result<PositionAnalysis, EngineError> {
        self.send(&GuiCommand::Position {
            fen: Some(fen.to_string()),
            moves: Vec::new(),
        })?;
        self.send(&GuiCommand::Go(opts))?;

        if let Some(analysis) = read_search(&mut self.stdout, MAX_UCI_LINES)? {
            return Ok(analysis);
        }

        // A stopped search still answers with `bestmove`; consume it so it is
        // not taken as the reply to the next request.
        self.send(&GuiCommand::Stop)?;
        if read_search(&mut self.stdout, MAX_UCI_LINES)?.is_none() {
            warn!(engine = %self.name, "engine kept searching after stop");
        }
        Err(EngineError::InvalidResponse(
            "Too many lines without bestmove".to_string(),
        ))
    }

    fn send(&mut self, command: &GuiCommand) -> Result<(), EngineError> {
        let line = command.to_uci();
        debug!(command = %line, "uci >");
        writeln!(self.stdin, "{}", line).map_err(closed_pipe)?;
        self.stdin.flush().map_err(closed_pipe)?;
        Ok(())
    }

    fn read_message(&mut self) -> Result<Option<EngineMessage>, EngineError> {
        read_message(&mut self.stdout)
    }
}

/// Read one line; `Ok(None)` for blank lines.
fn read_message(reader: &mut impl BufRead) -> Result<Option<EngineMessage>, EngineError> {
    let mut line = String::new();
    let bytes = reader.read_line(&mut line).map_err(closed_pipe)?;
    if bytes == 0 {
        return Err(EngineError::Terminated);
    }
    Ok(EngineMessage::parse(&line))
}

/// Collect search output up to and including `bestmove`.
///
/// Returns `Ok(None)` when `max_lines` pass without a `bestmove`.
fn read_search(
    reader: &mut impl BufRead,
    max_lines: usize,
) -> Result<Option<PositionAnalysis>, EngineError> {
    let mut analysis = PositionAnalysis::default();
    for _ in 0..max_lines {
        match read_message(reader)? {
            Some(EngineMessage::Info(info)) => record_info(&mut analysis, info),
            Some(EngineMessage::BestMove { mv, .. }) => {
                analysis.best_move = mv;
                return Ok(Some(analysis));
            }
            _ => {}
        }
    }
    Ok(None)
}

fn closed_pipe(err: io::Error) -> EngineError {
    match err.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => EngineError::Terminated,
        _ => EngineError::Io(err),
    }
}

/// Fold an `info` line into the running analysis.
///
/// Only lines that carry a score update the evaluation; `info string` and
/// `currmove` chatter leave it untouched.
fn record_info(analysis: &mut PositionAnalysis, info: EngineInfo) {
    if let Some(score) = info.score {
        analysis.evaluation = Some(Evaluation::from_score(score));
        if !info.pv.is_empty() {
            analysis.pv = info.pv;
        }
    }
    if let Some(depth) = info.depth {
        analysis.depth = analysis.depth.max(depth);
    }
    if let Some(nodes) = info.nodes {
        analysis.nodes = nodes;
    }
}

impl SearchEngine for EngineProcess {
    fn best_move(&mut self, fen: &str, limit: SearchLimit) -> Result<Option<String>, EngineError> {
        Ok(self.search(fen, limit.go_options())?.best_move)
    }

    fn analyze(&mut self, fen: &str, depth: u32) -> Result<PositionAnalysis, EngineError> {
        self.search(fen, GoOptions::depth(depth))
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        self.send(&GuiCommand::UciNewGame)?;
        self.wait_ready()
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if self.send(&GuiCommand::Quit).is_err() {
            warn!(engine = %self.name, "engine did not accept quit, killing it");
            let _ = self.process.kill();
        }
        let _ = self.process.wait();
    }
}
