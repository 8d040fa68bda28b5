//! A scripted [`SearchEngine`] for tests.
//!
//! Answers are keyed by FEN. Positions without a scripted best move get the
//! first legal move, so engine-vs-engine games can run to completion;
//! positions without a scripted analysis fail with an invalid response.

use std::collections::HashMap;

use shakmaty::Position;

use crate::engine::{EngineError, PositionAnalysis, SearchEngine, SearchLimit};
use crate::notation::{parse_fen, to_uci};
use crate::Evaluation;

/// One request received by a [`ScriptedEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    BestMove { fen: String, limit: SearchLimit },
    Analyze { fen: String, depth: u32 },
    NewGame,
}

#[derive(Debug, Default)]
pub struct ScriptedEngine {
    best_moves: HashMap<String, Option<String>>,
    analyses: HashMap<String, PositionAnalysis>,
    requests: Vec<Request>,
    dead: bool,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose process has already gone away.
    pub fn dead() -> Self {
        Self {
            dead: true,
            ..Self::default()
        }
    }

    /// Script the move returned for `fen`. `None` scripts "no move".
    pub fn with_best_move(mut self, fen: &str, mv: Option<&str>) -> Self {
        self.best_moves
            .insert(fen.to_string(), mv.map(str::to_string));
        self
    }

    pub fn with_analysis(
        mut self,
        fen: &str,
        best_move: Option<&str>,
        evaluation: Option<Evaluation>,
    ) -> Self {
        self.analyses.insert(
            fen.to_string(),
            PositionAnalysis {
                best_move: best_move.map(str::to_string),
                evaluation,
                ..PositionAnalysis::default()
            },
        );
        self
    }

    /// Make every following request fail as if the process exited.
    pub fn kill(&mut self) {
        self.dead = true;
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn analyze_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| matches!(r, Request::Analyze { .. }))
            .count()
    }

    pub fn best_move_count(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| matches!(r, Request::BestMove { .. }))
            .count()
    }

    fn check_alive(&self) -> Result<(), EngineError> {
        if self.dead {
            Err(EngineError::Terminated)
        } else {
            Ok(())
        }
    }
}

impl SearchEngine for ScriptedEngine {
    fn best_move(&mut self, fen: &str, limit: SearchLimit) -> Result<Option<String>, EngineError> {
        self.requests.push(Request::BestMove {
            fen: fen.to_string(),
            limit,
        });
        self.check_alive()?;

        if let Some(mv) = self.best_moves.get(fen) {
            return Ok(mv.clone());
        }
        let pos = parse_fen(fen).map_err(|e| EngineError::InvalidResponse(e.to_string()))?;
        Ok(pos.legal_moves().first().map(to_uci))
    }

    fn analyze(&mut self, fen: &str, depth: u32) -> Result<PositionAnalysis, EngineError> {
        self.requests.push(Request::Analyze {
            fen: fen.to_string(),
            depth,
        });
        self.check_alive()?;

        self.analyses
            .get(fen)
            .cloned()
            .ok_or_else(|| EngineError::InvalidResponse(format!("unscripted position {}", fen)))
    }

    fn new_game(&mut self) -> Result<(), EngineError> {
        self.requests.push(Request::NewGame);
        self.check_alive()
    }
}
