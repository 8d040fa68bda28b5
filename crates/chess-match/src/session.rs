//! Match session: turn state machine, clocks, engine turns and hints.
//!
//! A [`MatchSession`] owns one live [`Game`] and its [`Clock`]. Humans drive
//! it square by square ([`MatchSession::click`]); engine-controlled sides
//! move through [`MatchSession::request_engine_move`]. Any engine failure is
//! fatal to the session: it ends with no result and the error is returned.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chess_analysis::engine::lock_engine;
use chess_analysis::notation::{self, parse_uci};
use chess_analysis::{EngineError, SearchLimit, SharedEngine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Square};
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{Clock, TimeSource};
use crate::game::{Game, GameError, Outcome, PlayedMove, Side};
use crate::profile::{SavedClock, SavedGame};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The game is over")]
    NotInProgress,
    #[error("It is not an engine-controlled side's turn")]
    NotEngineTurn,
    #[error("No square is selected")]
    NoSelection,
    #[error("Hints are not available right now")]
    HintUnavailable,
    #[error("Nobody can resign an engine-vs-engine game")]
    ResignUnavailable,
    #[error("Only a resigned game can be resumed")]
    NotResumable,
    #[error("Engine failure: {0}")]
    Engine(#[from] EngineError),
    #[error("Engine returned no move")]
    EngineNoMove,
    #[error("{0} ran out of time")]
    FlagFell(Side),
    #[error("Engine returned an illegal move: {0}")]
    IllegalEngineMove(String),
    #[error("Saved game does not match its move history")]
    InconsistentSave,
    #[error(transparent)]
    Game(#[from] GameError),
}

impl SessionError {
    /// Whether this error ended the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Engine(_) | SessionError::EngineNoMove | SessionError::IllegalEngineMove(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    HumanVsHuman,
    HumanVsEngine,
    EngineVsEngine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Extreme,
}

/// Engine search depth per difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyDepths {
    pub easy: u32,
    pub medium: u32,
    pub hard: u32,
    pub extreme: u32,
}

impl Default for DifficultyDepths {
    fn default() -> Self {
        Self {
            easy: 5,
            medium: 10,
            hard: 15,
            extreme: 20,
        }
    }
}

impl DifficultyDepths {
    pub fn depth(&self, difficulty: Difficulty) -> u32 {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Medium => self.medium,
            Difficulty::Hard => self.hard,
            Difficulty::Extreme => self.extreme,
        }
    }

    pub fn deepest(&self) -> u32 {
        self.easy.max(self.medium).max(self.hard).max(self.extreme)
    }
}

/// Engine settings shared by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub depths: DifficultyDepths,
    /// Fixed search budget for hints.
    pub hint_movetime: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            depths: DifficultyDepths::default(),
            hint_movetime: Duration::from_millis(100),
        }
    }
}

/// What the players chose before the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchConfig {
    pub mode: Mode,
    /// The human's side in Human-vs-Engine; ignored otherwise.
    pub human_side: Option<Side>,
    pub difficulty: Difficulty,
    /// `None` means unlimited time.
    pub time_limit_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    InProgress,
    Over,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    Resigned(Side),
    TimedOut(Side),
}

impl GameResult {
    /// The winning side, if the result has one.
    pub fn winner(self) -> Option<Side> {
        match self {
            GameResult::WhiteWins => Some(Side::White),
            GameResult::BlackWins => Some(Side::Black),
            GameResult::Draw => None,
            GameResult::Resigned(side) | GameResult::TimedOut(side) => Some(side.opposite()),
        }
    }
}

impl std::fmt::Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameResult::WhiteWins => f.write_str("White wins"),
            GameResult::BlackWins => f.write_str("Black wins"),
            GameResult::Draw => f.write_str("Draw"),
            GameResult::Resigned(side) => write!(f, "{} resigned", side),
            GameResult::TimedOut(side) => write!(f, "{} ran out of time", side),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The square now holds the selection; these are its legal targets.
    Selected(Vec<Square>),
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Applied(AppliedMove),
    /// Not a legal move; the selection was dropped.
    Rejected,
}

/// Result of a single square click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Select(SelectOutcome),
    Move(MoveOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub uci: String,
    pub san: String,
    pub capture: bool,
    pub check: bool,
    /// The move ended the game.
    pub finished: bool,
}

/// A suggested move, shown until the next move is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
    pub uci: String,
    pub move_number: u32,
}

/// Read-only view for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub fen: String,
    pub mode: Mode,
    pub side_to_move: Side,
    pub engine_to_move: bool,
    pub in_check: bool,
    pub fullmove_number: u32,
    pub selected: Option<Square>,
    pub destinations: Vec<Square>,
    pub white_remaining: Option<Duration>,
    pub black_remaining: Option<Duration>,
    pub status: Status,
    pub result: Option<GameResult>,
    pub hint: Option<Hint>,
    pub last_move: Option<PlayedMove>,
    pub saved: bool,
}

#[derive(Debug, Clone)]
struct Selection {
    from: Square,
    destinations: Vec<Square>,
}

pub struct MatchSession {
    config: MatchConfig,
    settings: SessionSettings,
    game: Game,
    clock: Clock,
    selection: Option<Selection>,
    hint: Option<Hint>,
    hints_used: BTreeSet<u32>,
    last_move: Option<PlayedMove>,
    status: Status,
    result: Option<GameResult>,
    saved: bool,
    engine: SharedEngine,
    time: Arc<dyn TimeSource>,
}

impl MatchSession {
    /// Start a new game from the initial position. White's clock starts now.
    pub fn new(
        config: MatchConfig,
        settings: SessionSettings,
        engine: SharedEngine,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        let limit = config.time_limit_secs.map(Duration::from_secs);
        let session = Self::assemble(config, settings, Game::new(), Clock::new(limit), engine, time);
        info!(
            mode = ?config.mode,
            difficulty = ?config.difficulty,
            time_limit = ?config.time_limit_secs,
            "new game started"
        );
        session
    }

    /// Rebuild a session from a saved record.
    ///
    /// The move history is replayed from the initial position and must
    /// reach the saved position; a record without history starts from its
    /// FEN alone.
    pub fn restore(
        saved: &SavedGame,
        settings: SessionSettings,
        engine: SharedEngine,
        time: Arc<dyn TimeSource>,
    ) -> Result<Self, SessionError> {
        let game = if saved.move_history.is_empty() {
            Game::from_fen(&saved.fen)?
        } else {
            let game = Game::replay(Chess::default(), &saved.move_history)?;
            let expected = notation::parse_fen(&saved.fen).map_err(GameError::from)?;
            if notation::position_key(game.position()) != notation::position_key(&expected) {
                return Err(SessionError::InconsistentSave);
            }
            game
        };

        let clock = match (saved.time_limit, saved.remaining_ms) {
            (Some(_), Some(SavedClock { white_ms, black_ms })) => {
                Clock::with_remaining(white_ms, black_ms)
            }
            (limit, _) => Clock::new(limit.map(Duration::from_secs)),
        };

        let config = MatchConfig {
            mode: saved.mode,
            human_side: saved.human_color,
            difficulty: saved.difficulty,
            time_limit_secs: saved.time_limit,
        };
        let mut session = Self::assemble(config, settings, game, clock, engine, time);
        session.hints_used = saved.hints_used.iter().copied().collect();
        info!(id = %saved.id, moves = saved.move_history.len(), "saved game restored");
        Ok(session)
    }

    fn assemble(
        config: MatchConfig,
        settings: SessionSettings,
        game: Game,
        mut clock: Clock,
        engine: SharedEngine,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        clock.start(game.side_to_move(), time.now());
        let mut session = Self {
            config,
            settings,
            game,
            clock,
            selection: None,
            hint: None,
            hints_used: BTreeSet::new(),
            last_move: None,
            status: Status::InProgress,
            result: None,
            saved: false,
            engine,
            time,
        };
        session.check_game_over();
        session
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn is_over(&self) -> bool {
        self.status == Status::Over
    }

    pub fn hints_used(&self) -> &BTreeSet<u32> {
        &self.hints_used
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Whether the side to move is played by the engine.
    pub fn is_engine_turn(&self) -> bool {
        let to_move = self.game.side_to_move();
        match self.config.mode {
            Mode::HumanVsHuman => false,
            Mode::HumanVsEngine => Some(to_move) != self.config.human_side,
            Mode::EngineVsEngine => true,
        }
    }

    /// One square click from the board: reselects an own piece, otherwise
    /// completes the pending move or starts a selection.
    pub fn click(&mut self, square: Square) -> Result<ClickOutcome, SessionError> {
        let own_piece = self
            .game
            .piece_at(square)
            .is_some_and(|p| Side::from(p.color) == self.game.side_to_move());
        if self.selection.is_some() && !own_piece {
            self.attempt_move(square).map(ClickOutcome::Move)
        } else {
            Ok(ClickOutcome::Select(self.select(square)))
        }
    }

    /// Select a piece of the side to move. Anything else is ignored and
    /// leaves the current selection as it was.
    pub fn select(&mut self, square: Square) -> SelectOutcome {
        if self.is_over() || self.is_engine_turn() {
            return SelectOutcome::Ignored;
        }
        match self.game.piece_at(square) {
            Some(piece) if Side::from(piece.color) == self.game.side_to_move() => {
                let destinations = self.game.legal_destinations(square);
                self.selection = Some(Selection {
                    from: square,
                    destinations: destinations.clone(),
                });
                SelectOutcome::Selected(destinations)
            }
            _ => SelectOutcome::Ignored,
        }
    }

    /// Move the selected piece to `to`. An illegal target drops the
    /// selection and leaves the board untouched.
    pub fn attempt_move(&mut self, to: Square) -> Result<MoveOutcome, SessionError> {
        if self.is_over() {
            return Err(SessionError::NotInProgress);
        }
        let selection = self.selection.take().ok_or(SessionError::NoSelection)?;

        match self.game.find_move(selection.from, to) {
            Some(mv) => Ok(MoveOutcome::Applied(self.apply(&mv)?)),
            None => Ok(MoveOutcome::Rejected),
        }
    }

    /// Let the engine play for the side to move.
    ///
    /// The engine searches to the difficulty depth (the deepest depth in
    /// Engine-vs-Engine). Failure ends the session with no result.
    pub fn request_engine_move(&mut self) -> Result<AppliedMove, SessionError> {
        if self.is_over() {
            return Err(SessionError::NotInProgress);
        }
        if !self.is_engine_turn() {
            return Err(SessionError::NotEngineTurn);
        }

        let depth = match self.config.mode {
            Mode::EngineVsEngine => self.settings.depths.depth(Difficulty::Extreme),
            _ => self.settings.depths.depth(self.config.difficulty),
        };
        let answer = self.query_engine(SearchLimit::Depth(depth))?;
        let mv = parse_uci(self.game.position(), &answer)
            .ok_or_else(|| self.fail(SessionError::IllegalEngineMove(answer.clone())))?;

        let applied = self.apply(&mv)?;
        info!(mv = %applied.san, side = %self.game.side_to_move().opposite(), "engine moved");
        Ok(applied)
    }

    /// Ask the engine for a suggestion for the side to move.
    pub fn request_hint(&mut self) -> Result<Hint, SessionError> {
        if self.is_over() {
            return Err(SessionError::NotInProgress);
        }
        if self.config.mode == Mode::EngineVsEngine || self.is_engine_turn() {
            return Err(SessionError::HintUnavailable);
        }

        let answer = self.query_engine(SearchLimit::MoveTime(self.settings.hint_movetime))?;
        if parse_uci(self.game.position(), &answer).is_none() {
            return Err(self.fail(SessionError::IllegalEngineMove(answer)));
        }

        let hint = Hint {
            uci: answer,
            move_number: self.game.fullmove_number(),
        };
        self.hints_used.insert(hint.move_number);
        self.hint = Some(hint.clone());
        info!(hint = %hint.uci, move_number = hint.move_number, "hint given");
        Ok(hint)
    }

    /// Charge the running clock and end the game if the side to move has
    /// run out. Returns the result when this call ended the game.
    pub fn check_time(&mut self) -> Option<GameResult> {
        if self.is_over() || self.clock.is_unlimited() {
            return None;
        }
        self.clock.tick(self.time.now());

        let side = self.game.side_to_move();
        if self.clock.is_expired(side) {
            self.finish(GameResult::TimedOut(side));
            info!(side = %side, "flag fell");
            return self.result;
        }
        None
    }

    /// Resign for the human side (the side to move in Human-vs-Human).
    /// A no-op once the game is over. Time spent before resigning is
    /// charged, so a flag that already fell ends the game as a timeout.
    pub fn resign(&mut self) -> Result<(), SessionError> {
        let side = match self.config.mode {
            Mode::EngineVsEngine => return Err(SessionError::ResignUnavailable),
            Mode::HumanVsEngine => self.config.human_side.unwrap_or(Side::White),
            Mode::HumanVsHuman => self.game.side_to_move(),
        };
        if self.is_over() || self.check_time().is_some() {
            return Ok(());
        }
        self.finish(GameResult::Resigned(side));
        info!(side = %side, "resigned");
        Ok(())
    }

    /// Take back a resignation. History, position and clocks are as they
    /// were when the player resigned; the clock restarts now.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        if !matches!(self.result, Some(GameResult::Resigned(_))) {
            return Err(SessionError::NotResumable);
        }
        self.status = Status::InProgress;
        self.result = None;
        self.clock.start(self.game.side_to_move(), self.time.now());
        info!("resigned game resumed");
        Ok(())
    }

    /// Produce a saved-game record, or `None` once [`mark_saved`] has
    /// recorded a successful save.
    ///
    /// [`mark_saved`]: MatchSession::mark_saved
    pub fn save(&self) -> Result<Option<SavedGame>, SessionError> {
        if self.is_over() {
            return Err(SessionError::NotInProgress);
        }
        if self.saved {
            return Ok(None);
        }
        Ok(Some(self.to_saved_game()))
    }

    /// Record that the record from [`save`](MatchSession::save) was persisted.
    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    pub fn to_saved_game(&self) -> SavedGame {
        let now = self.time.now();
        let remaining_ms = match (
            self.clock.remaining_at(Side::White, now),
            self.clock.remaining_at(Side::Black, now),
        ) {
            (Some(white), Some(black)) => Some(SavedClock {
                white_ms: white.as_millis() as i64,
                black_ms: black.as_millis() as i64,
            }),
            _ => None,
        };

        SavedGame {
            id: uuid::Uuid::new_v4().to_string(),
            saved_at: Utc::now(),
            fen: self.game.to_fen(),
            move_history: self.game.history().to_vec(),
            hints_used: self.hints_used.iter().copied().collect(),
            human_color: self.config.human_side,
            time_limit: self.config.time_limit_secs,
            difficulty: self.config.difficulty,
            mode: self.config.mode,
            remaining_ms,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let now = self.time.now();
        let (selected, destinations) = match &self.selection {
            Some(s) => (Some(s.from), s.destinations.clone()),
            None => (None, Vec::new()),
        };

        Snapshot {
            fen: self.game.to_fen(),
            mode: self.config.mode,
            side_to_move: self.game.side_to_move(),
            engine_to_move: self.is_engine_turn(),
            in_check: self.game.is_check(),
            fullmove_number: self.game.fullmove_number(),
            selected,
            destinations,
            white_remaining: self.clock.remaining_at(Side::White, now),
            black_remaining: self.clock.remaining_at(Side::Black, now),
            status: self.status,
            result: self.result,
            hint: self.hint.clone(),
            last_move: self.last_move.clone(),
            saved: self.saved,
        }
    }

    fn query_engine(&mut self, limit: SearchLimit) -> Result<String, SessionError> {
        let fen = self.game.to_fen();
        let answer = lock_engine(&self.engine).and_then(|mut engine| engine.best_move(&fen, limit));
        match answer {
            Ok(Some(mv)) => Ok(mv),
            Ok(None) => Err(self.fail(SessionError::EngineNoMove)),
            Err(err) => Err(self.fail(SessionError::Engine(err))),
        }
    }

    /// Apply a legal move: history, clock handover, hint reset, game-over.
    ///
    /// The mover's clock is charged first; a move made after the flag fell
    /// is not played and the game ends as a timeout instead.
    fn apply(&mut self, mv: &shakmaty::Move) -> Result<AppliedMove, SessionError> {
        let mover = self.game.side_to_move();
        if self.check_time().is_some() {
            return Err(SessionError::FlagFell(mover));
        }
        let played = self.game.play(mv)?;

        let now = self.time.now();
        self.clock.tick(now);
        self.clock.start(mover.opposite(), now);

        self.selection = None;
        self.hint = None;
        self.last_move = Some(played.clone());
        self.check_game_over();

        Ok(AppliedMove {
            uci: played.uci,
            san: played.san,
            capture: played.capture,
            check: played.check,
            finished: self.is_over(),
        })
    }

    fn check_game_over(&mut self) {
        let result = match self.game.outcome() {
            Some(Outcome::Checkmate {
                winner: Side::White,
            }) => GameResult::WhiteWins,
            Some(Outcome::Checkmate {
                winner: Side::Black,
            }) => GameResult::BlackWins,
            Some(Outcome::Draw(reason)) => {
                info!(reason = ?reason, "game drawn");
                GameResult::Draw
            }
            None => return,
        };
        self.finish(result);
    }

    fn finish(&mut self, result: GameResult) {
        self.status = Status::Over;
        self.result = Some(result);
        self.selection = None;
        self.clock.pause();
        info!(result = %result, "game over");
    }

    /// End the session after an engine failure and hand back the error.
    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(error = %err, "engine failure ended the game");
        self.status = Status::Over;
        self.result = None;
        self.selection = None;
        self.clock.pause();
        err
    }
}
