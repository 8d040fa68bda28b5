//! Move classification.

use serde::{Deserialize, Serialize};

/// Largest evaluation swing, in centipawns, that still counts as acceptable.
pub const ACCEPTABLE_SWING_CP: i32 = 100;

/// How a played move compares to the engine's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveClass {
    /// The engine's own best move.
    Best,
    /// Within [`ACCEPTABLE_SWING_CP`] of the best line, or not measurable.
    Acceptable,
    /// Lost more than [`ACCEPTABLE_SWING_CP`].
    Inaccurate,
}

impl MoveClass {
    /// Classify a move from the evaluation swing it caused.
    pub fn from_swing(delta_cp: i32) -> Self {
        if delta_cp.saturating_abs() <= ACCEPTABLE_SWING_CP {
            MoveClass::Acceptable
        } else {
            MoveClass::Inaccurate
        }
    }

    /// Display color used by the review board.
    pub fn color(self) -> &'static str {
        match self {
            MoveClass::Best => "green",
            MoveClass::Acceptable => "blue",
            MoveClass::Inaccurate => "red",
        }
    }
}

impl std::fmt::Display for MoveClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MoveClass::Best => "best",
            MoveClass::Acceptable => "acceptable",
            MoveClass::Inaccurate => "inaccurate",
        };
        f.write_str(label)
    }
}

/// One move of a finished game with its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedMove {
    /// The move that was played (UCI notation).
    pub uci: String,
    /// The move in SAN, relative to the position it was played from.
    pub san: String,
    pub class: MoveClass,
    /// The engine's preferred move, when it gave one.
    pub best_move: Option<String>,
    /// Centipawn score before the move, from the mover's point of view.
    pub score_before: Option<i32>,
    /// Centipawn score after the move, from the mover's point of view.
    pub score_after: Option<i32>,
}

/// Per-side tally of classifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub best: u32,
    pub acceptable: u32,
    pub inaccurate: u32,
}

impl ClassCounts {
    pub fn record(&mut self, class: MoveClass) {
        match class {
            MoveClass::Best => self.best += 1,
            MoveClass::Acceptable => self.acceptable += 1,
            MoveClass::Inaccurate => self.inaccurate += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.best + self.acceptable + self.inaccurate
    }
}

/// Tally classifications for (white, black). Moves alternate starting with
/// `white_first`.
pub fn tally(moves: &[EvaluatedMove], white_first: bool) -> (ClassCounts, ClassCounts) {
    let mut white = ClassCounts::default();
    let mut black = ClassCounts::default();
    for (i, mv) in moves.iter().enumerate() {
        if (i % 2 == 0) == white_first {
            white.record(mv.class);
        } else {
            black.record(mv.class);
        }
    }
    (white, black)
}
