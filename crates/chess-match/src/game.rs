//! Rules adapter: a chess game on top of shakmaty.
//!
//! [`Game`] keeps the start position, the live position, the UCI move
//! history and the repetition keys needed for automatic draws.

use chess_analysis::notation::{self, NotationError};
use serde::{Deserialize, Serialize};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, Move, Piece, Position, Role, Square};
use thiserror::Error;

/// Errors from applying moves or loading positions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error(transparent)]
    Notation(#[from] NotationError),
}

/// One side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::White => 0,
            Side::Black => 1,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::White => f.write_str("White"),
            Side::Black => f.write_str("Black"),
        }
    }
}

/// Reason for a drawn game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawReason {
    Stalemate,
    InsufficientMaterial,
    FivefoldRepetition,
    SeventyFiveMoveRule,
}

/// How a finished game ended on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Checkmate { winner: Side },
    Draw(DrawReason),
}

/// A move that has been applied, described for the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub uci: String,
    pub san: String,
    pub capture: bool,
    /// The move gives check.
    pub check: bool,
}

#[derive(Debug, Clone)]
pub struct Game {
    start: Chess,
    position: Chess,
    history: Vec<String>,
    /// Repetition keys of every position reached, start included.
    keys: Vec<String>,
}

impl Default for Game {
    fn default() -> Self {
        Self::from_position(Chess::default())
    }
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(start: Chess) -> Self {
        let keys = vec![notation::position_key(&start)];
        Self {
            position: start.clone(),
            start,
            history: Vec::new(),
            keys,
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, GameError> {
        Ok(Self::from_position(notation::parse_fen(fen)?))
    }

    /// Play `moves` from `start`, failing on the first illegal entry.
    pub fn replay(start: Chess, moves: &[String]) -> Result<Self, GameError> {
        let mut game = Self::from_position(start);
        for uci in moves {
            game.play_uci(uci)?;
        }
        Ok(game)
    }

    pub fn start(&self) -> &Chess {
        &self.start
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// UCI moves played since the start position.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn side_to_move(&self) -> Side {
        self.position.turn().into()
    }

    pub fn is_check(&self) -> bool {
        self.position.is_check()
    }

    pub fn fullmove_number(&self) -> u32 {
        self.position.fullmoves().get()
    }

    pub fn to_fen(&self) -> String {
        notation::to_fen(&self.position)
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.position.board().piece_at(square)
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        self.position.legal_moves().into_iter().collect()
    }

    /// Squares the piece on `from` can legally move to. Castling is
    /// reported as the king's destination.
    pub fn legal_destinations(&self, from: Square) -> Vec<Square> {
        let mut squares: Vec<Square> = self
            .position
            .legal_moves()
            .iter()
            .filter(|m| m.from() == Some(from))
            .map(destination)
            .collect();
        squares.sort();
        squares.dedup();
        squares
    }

    /// The legal move from `from` to `to`. When several promotions match,
    /// the queen promotion is chosen.
    pub fn find_move(&self, from: Square, to: Square) -> Option<Move> {
        let candidates: Vec<Move> = self
            .position
            .legal_moves()
            .into_iter()
            .filter(|m| m.from() == Some(from) && destination(m) == to)
            .collect();

        candidates
            .iter()
            .find(|m| m.promotion() == Some(Role::Queen))
            .or_else(|| candidates.first())
            .cloned()
    }

    pub fn san(&self, mv: &Move) -> String {
        notation::to_san(&self.position, mv)
    }

    pub fn play(&mut self, mv: &Move) -> Result<PlayedMove, GameError> {
        let uci = notation::to_uci(mv);
        if !self.position.is_legal(mv) {
            return Err(GameError::IllegalMove(uci));
        }

        let san = self.san(mv);
        let capture = mv.is_capture();
        self.position.play_unchecked(mv);
        self.history.push(uci.clone());
        self.keys.push(notation::position_key(&self.position));

        Ok(PlayedMove {
            uci,
            san,
            capture,
            check: self.position.is_check(),
        })
    }

    pub fn play_uci(&mut self, uci: &str) -> Result<PlayedMove, GameError> {
        let mv = notation::parse_uci(&self.position, uci)
            .ok_or_else(|| GameError::IllegalMove(uci.to_string()))?;
        self.play(&mv)
    }

    /// Game-ending condition of the current position, if any. Only draws
    /// that apply without a claim are reported.
    pub fn outcome(&self) -> Option<Outcome> {
        let pos = &self.position;
        if pos.is_checkmate() {
            return Some(Outcome::Checkmate {
                winner: Side::from(pos.turn()).opposite(),
            });
        }
        if pos.is_stalemate() {
            return Some(Outcome::Draw(DrawReason::Stalemate));
        }
        if pos.is_insufficient_material() {
            return Some(Outcome::Draw(DrawReason::InsufficientMaterial));
        }
        if self.repetitions() >= 5 {
            return Some(Outcome::Draw(DrawReason::FivefoldRepetition));
        }
        if pos.halfmoves() >= 150 {
            return Some(Outcome::Draw(DrawReason::SeventyFiveMoveRule));
        }
        None
    }

    /// How many times the current position has occurred.
    fn repetitions(&self) -> usize {
        match self.keys.last() {
            Some(current) => self.keys.iter().filter(|k| *k == current).count(),
            None => 0,
        }
    }
}

/// Target square as a player would click it: castling goes to the king's
/// destination rather than the rook.
fn destination(mv: &Move) -> Square {
    match UciMove::from_move(mv, CastlingMode::Standard) {
        UciMove::Normal { to, .. } => to,
        _ => mv.to(),
    }
}
