//! Post-game move classification.
//!
//! [`MoveEvaluator`] replays a finished game and asks the engine, for every
//! move, whether it was the engine's own choice and how much it moved the
//! evaluation. Engine trouble on one move never aborts the pass: that move
//! is reported as [`MoveClass::Acceptable`] and the next one is tried.

use shakmaty::{Chess, Move, Position};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::{lock_engine, EngineError, PositionAnalysis, SharedEngine};
use crate::notation::{parse_uci, to_fen, to_san, to_uci};
use crate::quality::{EvaluatedMove, MoveClass};

/// Errors that stop an evaluation pass before it starts.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// A history entry is not legal in the position it was played from.
    #[error("Illegal move {uci} at ply {ply}")]
    IllegalMove { ply: usize, uci: String },
}

/// Classifies the moves of a finished game.
pub struct MoveEvaluator {
    engine: SharedEngine,
    depth: u32,
}

impl MoveEvaluator {
    /// `depth` should exceed every depth used for engine play so the
    /// evaluator is never weaker than the opponent it judges.
    pub fn new(engine: SharedEngine, depth: u32) -> Self {
        Self { engine, depth }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Classify every move of `moves` (UCI strings) played from `start`.
    ///
    /// The whole history is validated before the engine is consulted, so an
    /// illegal entry fails fast with no engine traffic.
    pub fn evaluate(
        &self,
        start: &Chess,
        moves: &[String],
    ) -> Result<Vec<EvaluatedMove>, AnalyzerError> {
        let plies = replay(start, moves)?;

        if let Err(err) = lock_engine(&self.engine).and_then(|mut e| e.new_game()) {
            warn!(error = %err, "engine refused new game, evaluating anyway");
        }

        let evaluated = plies
            .iter()
            .map(|(before, mv)| self.classify(before, mv))
            .collect::<Vec<_>>();

        debug!(moves = evaluated.len(), depth = self.depth, "game evaluated");
        Ok(evaluated)
    }

    fn classify(&self, before: &Chess, mv: &Move) -> EvaluatedMove {
        let mut evaluated = EvaluatedMove {
            uci: to_uci(mv),
            san: to_san(before, mv),
            class: MoveClass::Acceptable,
            best_move: None,
            score_before: None,
            score_after: None,
        };

        let analysis = match self.analyze(before) {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(mv = %evaluated.uci, error = %err, "pre-move analysis failed");
                return evaluated;
            }
        };
        evaluated.best_move = analysis.best_move.clone();

        let (Some(best), Some(eval)) = (analysis.best_move, analysis.evaluation) else {
            debug!(mv = %evaluated.uci, "engine gave no best move or score");
            return evaluated;
        };
        let score_before = eval.to_centipawns();
        evaluated.score_before = Some(score_before);

        if before.is_check() && !before.is_legal(mv) {
            evaluated.class = MoveClass::Inaccurate;
            return evaluated;
        }

        if parse_uci(before, &best).as_ref() == Some(mv) {
            evaluated.class = MoveClass::Best;
            return evaluated;
        }

        let mut after = before.clone();
        after.play_unchecked(mv);
        let after_eval = match self.analyze(&after) {
            Ok(PositionAnalysis {
                evaluation: Some(eval),
                ..
            }) => eval,
            Ok(_) => {
                debug!(mv = %evaluated.uci, "engine gave no score after move");
                return evaluated;
            }
            Err(err) => {
                warn!(mv = %evaluated.uci, error = %err, "post-move analysis failed");
                return evaluated;
            }
        };

        // The engine scores the new position for the opponent.
        let score_after = -after_eval.to_centipawns();
        evaluated.score_after = Some(score_after);
        evaluated.class = MoveClass::from_swing(score_before - score_after);
        evaluated
    }

    fn analyze(&self, pos: &Chess) -> Result<PositionAnalysis, EngineError> {
        lock_engine(&self.engine)?.analyze(&to_fen(pos), self.depth)
    }
}

/// Replay the history, returning each position paired with the move played
/// from it.
fn replay(start: &Chess, moves: &[String]) -> Result<Vec<(Chess, Move)>, AnalyzerError> {
    let mut pos = start.clone();
    let mut plies = Vec::with_capacity(moves.len());
    for (ply, uci) in moves.iter().enumerate() {
        let mv = parse_uci(&pos, uci).ok_or_else(|| AnalyzerError::IllegalMove {
            ply,
            uci: uci.clone(),
        })?;
        let before = pos.clone();
        pos.play_unchecked(&mv);
        plies.push((before, mv));
    }
    Ok(plies)
}
