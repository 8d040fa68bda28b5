//! Chess position evaluation types.

use serde::{Deserialize, Serialize};
use uci::Score;

/// Centipawn value assigned to a forced mate.
///
/// Mate in N maps to `MATE_SCORE - N` so that faster mates score higher,
/// and ordinary centipawn scores are clamped into `[-MATE_SCORE, MATE_SCORE]`.
pub const MATE_SCORE: i32 = 10_000;

/// A position evaluation from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    /// Centipawn evaluation (positive = side to move is better).
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, negative or zero =
    /// side to move gets mated).
    Mate(i32),
}

impl Evaluation {
    pub fn from_score(score: Score) -> Self {
        match score {
            Score::Cp(cp) => Evaluation::Centipawns(cp),
            Score::Mate(n) => Evaluation::Mate(n),
        }
    }

    /// Collapse to a single comparable centipawn number.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Evaluation::Centipawns(cp) => cp.clamp(-MATE_SCORE, MATE_SCORE),
            Evaluation::Mate(n) if n > 0 => MATE_SCORE - n.min(MATE_SCORE),
            Evaluation::Mate(n) => -MATE_SCORE - n.max(-MATE_SCORE),
        }
    }

    /// The same evaluation seen by the other side.
    ///
    /// `Mate(0)` (side to move is already mated) has no signed counterpart
    /// and is returned unchanged; compare via [`Evaluation::to_centipawns`]
    /// when that case matters.
    pub fn flip(self) -> Self {
        match self {
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(-cp),
            Evaluation::Mate(n) => Evaluation::Mate(-n),
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Evaluation::Mate(_))
    }
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Evaluation::Centipawns(cp) => write!(f, "{:+.2}", *cp as f64 / 100.0),
            Evaluation::Mate(n) if *n > 0 => write!(f, "#{}", n),
            Evaluation::Mate(n) => write!(f, "#-{}", n.abs()),
        }
    }
}
