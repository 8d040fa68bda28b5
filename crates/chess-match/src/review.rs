//! Post-game review playback.

use std::time::{Duration, Instant};

use chess_analysis::{ClassCounts, EvaluatedMove};
use shakmaty::{Chess, Position};

use crate::game::{Game, GameError};

/// Autoplay speeds offered by the review, as multiples of one ply per second.
pub const SPEEDS: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0];
const DEFAULT_SPEED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewIntent {
    ToStart,
    Prev,
    Next,
    TogglePlay,
    CycleSpeed,
}

/// Steps through a finished game alongside its evaluated moves.
///
/// The index counts plies shown: 0 is the start position and `len()` is
/// the final one.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    positions: Vec<Chess>,
    evaluated: Vec<EvaluatedMove>,
    index: usize,
    playing: bool,
    speed: usize,
    last_step: Option<Instant>,
}

impl ReviewSession {
    pub fn new(
        start: Chess,
        moves: &[String],
        evaluated: Vec<EvaluatedMove>,
    ) -> Result<Self, GameError> {
        let mut game = Game::from_position(start);
        let mut positions = Vec::with_capacity(moves.len() + 1);
        positions.push(game.position().clone());
        for uci in moves {
            game.play_uci(uci)?;
            positions.push(game.position().clone());
        }

        // Autoplay starts on entry; the first tick anchors its timing.
        Ok(Self {
            playing: !moves.is_empty(),
            positions,
            evaluated,
            index: 0,
            speed: DEFAULT_SPEED,
            last_step: None,
        })
    }

    /// Number of plies in the game.
    pub fn len(&self) -> usize {
        self.positions.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> &Chess {
        &self.positions[self.index]
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f64 {
        SPEEDS[self.speed]
    }

    /// Every evaluated move of the game.
    pub fn evaluated(&self) -> &[EvaluatedMove] {
        &self.evaluated
    }

    /// Evaluated moves up to the current index.
    pub fn played(&self) -> &[EvaluatedMove] {
        &self.evaluated[..self.index.min(self.evaluated.len())]
    }

    /// The move that led to the current position.
    pub fn last_move(&self) -> Option<&EvaluatedMove> {
        self.played().last()
    }

    /// Classification tally for (white, black).
    pub fn tally(&self) -> (ClassCounts, ClassCounts) {
        let white_first = self.positions[0].turn() == shakmaty::Color::White;
        chess_analysis::quality::tally(&self.evaluated, white_first)
    }

    pub fn apply(&mut self, intent: ReviewIntent, now: Instant) {
        match intent {
            ReviewIntent::ToStart => {
                self.playing = false;
                self.index = 0;
            }
            ReviewIntent::Prev => {
                self.playing = false;
                self.index = self.index.saturating_sub(1);
            }
            ReviewIntent::Next => {
                self.playing = false;
                self.index = (self.index + 1).min(self.len());
            }
            ReviewIntent::TogglePlay => {
                if self.playing {
                    self.playing = false;
                } else if self.index < self.len() {
                    self.playing = true;
                    self.last_step = Some(now);
                }
            }
            ReviewIntent::CycleSpeed => {
                self.speed = (self.speed + 1) % SPEEDS.len();
            }
        }
    }

    /// Advance autoplay by however many plies are due at `now`.
    pub fn tick(&mut self, now: Instant) {
        if !self.playing {
            return;
        }
        let Some(mut last) = self.last_step else {
            self.last_step = Some(now);
            return;
        };

        let interval = self.interval();
        while self.playing && now.saturating_duration_since(last) >= interval {
            last += interval;
            self.index += 1;
            if self.index >= self.len() {
                self.index = self.len();
                self.playing = false;
            }
        }
        self.last_step = Some(last);
    }

    fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.speed())
    }
}
