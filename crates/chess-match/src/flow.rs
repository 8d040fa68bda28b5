//! Session flow: login, pre-game configuration, play and review.
//!
//! [`SessionFlow`] is an explicit state machine. Front ends translate user
//! input into [`Intent`]s, call [`SessionFlow::handle`], and call
//! [`SessionFlow::tick`] on every refresh to let clocks run, engines move
//! and review autoplay advance.
//!
//! | State        | Intent                              | Next state                 |
//! |--------------|-------------------------------------|----------------------------|
//! | `Login`      | `Login` / `CreateAccount` / `Guest` | `Mode`                     |
//! | `Mode`       | `Next`                              | `Color` or `Time`          |
//! | `Mode`       | `LoadSaved`                         | `Playing`                  |
//! | `Color`      | `Next`                              | `Difficulty`               |
//! | `Difficulty` | `Next`                              | `Time`                     |
//! | `Time`       | `Next`                              | `Playing`                  |
//! | `Playing`    | game over                           | `Review`                   |
//! | `Playing`    | fatal engine error                  | `Mode`                     |
//! | `Review`     | `NewGame`                           | `Mode`                     |
//! | `Review`     | `Continue` (resigned games only)    | `Playing`                  |
//! | any          | `Quit`                              | `Exited`                   |

use std::sync::Arc;

use chess_analysis::{AnalyzerError, MoveEvaluator, SharedEngine};
use shakmaty::Square;
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::TimeSource;
use crate::game::{GameError, Side};
use crate::profile::{ProfileError, ProfileStore, StatOutcome};
use crate::review::{ReviewIntent, ReviewSession};
use crate::session::{
    Difficulty, GameResult, MatchConfig, MatchSession, Mode, SessionError, SessionSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Login,
    Mode,
    Color,
    Difficulty,
    Time,
    Playing,
    Review,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControl {
    Unlimited,
    /// Seconds per side.
    Seconds(u64),
}

impl TimeControl {
    pub fn secs(self) -> Option<u64> {
        match self {
            TimeControl::Unlimited => None,
            TimeControl::Seconds(secs) => Some(secs),
        }
    }
}

/// Actions during live play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchIntent {
    Click(Square),
    Hint,
    Resign,
    Save,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Login { username: String, password: String },
    CreateAccount { username: String, password: String },
    Guest,
    ChooseMode(Mode),
    ChooseColor(Side),
    ChooseDifficulty(Difficulty),
    ChooseTime(TimeControl),
    LoadSaved(String),
    Next,
    Back,
    Match(MatchIntent),
    Review(ReviewIntent),
    NewGame,
    Continue,
    Quit,
}

impl Intent {
    fn name(&self) -> &'static str {
        match self {
            Intent::Login { .. } => "login",
            Intent::CreateAccount { .. } => "create account",
            Intent::Guest => "guest login",
            Intent::ChooseMode(_) => "choose mode",
            Intent::ChooseColor(_) => "choose color",
            Intent::ChooseDifficulty(_) => "choose difficulty",
            Intent::ChooseTime(_) => "choose time",
            Intent::LoadSaved(_) => "load saved game",
            Intent::Next => "next",
            Intent::Back => "back",
            Intent::Match(_) => "game action",
            Intent::Review(_) => "review action",
            Intent::NewGame => "new game",
            Intent::Continue => "continue",
            Intent::Quit => "quit",
        }
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("'{intent}' is not available in the {state:?} step")]
    Unavailable {
        state: FlowState,
        intent: &'static str,
    },
    #[error("Make a selection before continuing")]
    MissingSelection,
    #[error("Saved game not found: {0}")]
    UnknownSavedGame(String),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Analysis(#[from] AnalyzerError),
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Choices made in the configuration steps. They survive going back and
/// forth and carry over to the next game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selections {
    pub mode: Option<Mode>,
    pub color: Option<Side>,
    pub difficulty: Option<Difficulty>,
    pub time: Option<TimeControl>,
}

pub struct SessionFlow {
    state: FlowState,
    selections: Selections,
    profile: ProfileStore,
    engine: SharedEngine,
    time: Arc<dyn TimeSource>,
    settings: SessionSettings,
    evaluation_depth: u32,
    session: Option<MatchSession>,
    review: Option<ReviewSession>,
    last_error: Option<String>,
}

impl SessionFlow {
    pub fn new(
        profile: ProfileStore,
        engine: SharedEngine,
        time: Arc<dyn TimeSource>,
        settings: SessionSettings,
        evaluation_depth: u32,
    ) -> Self {
        Self {
            state: FlowState::Login,
            selections: Selections::default(),
            profile,
            engine,
            time,
            settings,
            evaluation_depth,
            session: None,
            review: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn profile(&self) -> &ProfileStore {
        &self.profile
    }

    pub fn session(&self) -> Option<&MatchSession> {
        self.session.as_ref()
    }

    pub fn review(&self) -> Option<&ReviewSession> {
        self.review.as_ref()
    }

    /// The fatal error that last ended a game, once.
    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    pub fn handle(&mut self, intent: Intent) -> Result<FlowState, FlowError> {
        let name = intent.name();
        match (self.state, intent) {
            (_, Intent::Quit) => {
                self.session = None;
                self.review = None;
                self.state = FlowState::Exited;
                info!("exiting");
            }

            (FlowState::Login, Intent::Login { username, password }) => {
                self.profile.login(&username, &password)?;
                self.state = FlowState::Mode;
            }
            (FlowState::Login, Intent::CreateAccount { username, password }) => {
                self.profile.create_account(&username, &password)?;
                self.state = FlowState::Mode;
            }
            (FlowState::Login, Intent::Guest) => {
                self.profile.guest_login();
                self.state = FlowState::Mode;
            }
            (FlowState::Login, Intent::Next) => {
                if self.profile.current_user().is_none() {
                    return Err(FlowError::MissingSelection);
                }
                self.state = FlowState::Mode;
            }

            (FlowState::Mode, Intent::ChooseMode(mode)) => self.selections.mode = Some(mode),
            (FlowState::Mode, Intent::Next) => {
                self.state = match self.selections.mode {
                    Some(Mode::HumanVsEngine) => FlowState::Color,
                    Some(_) => FlowState::Time,
                    None => return Err(FlowError::MissingSelection),
                };
            }
            (FlowState::Mode, Intent::Back) => {
                self.profile.logout();
                self.state = FlowState::Login;
            }
            (FlowState::Mode, Intent::LoadSaved(id)) => self.load_saved(&id)?,

            (FlowState::Color, Intent::ChooseColor(side)) => self.selections.color = Some(side),
            (FlowState::Color, Intent::Next) => {
                if self.selections.color.is_none() {
                    return Err(FlowError::MissingSelection);
                }
                self.state = FlowState::Difficulty;
            }
            (FlowState::Color, Intent::Back) => self.state = FlowState::Mode,

            (FlowState::Difficulty, Intent::ChooseDifficulty(level)) => {
                self.selections.difficulty = Some(level)
            }
            (FlowState::Difficulty, Intent::Next) => {
                if self.selections.difficulty.is_none() {
                    return Err(FlowError::MissingSelection);
                }
                self.state = FlowState::Time;
            }
            (FlowState::Difficulty, Intent::Back) => self.state = FlowState::Color,

            (FlowState::Time, Intent::ChooseTime(control)) => self.selections.time = Some(control),
            (FlowState::Time, Intent::Next) => self.start_match()?,
            (FlowState::Time, Intent::Back) => {
                self.state = match self.selections.mode {
                    Some(Mode::HumanVsEngine) => FlowState::Difficulty,
                    _ => FlowState::Mode,
                };
            }

            (FlowState::Playing, Intent::Match(action)) => self.play(action)?,

            (FlowState::Review, Intent::Review(action)) => {
                if let Some(review) = self.review.as_mut() {
                    review.apply(action, self.time.now());
                }
            }
            (FlowState::Review, Intent::NewGame) => self.leave_review()?,
            (FlowState::Review, Intent::Continue) => self.continue_resigned()?,

            (state, _) => {
                return Err(FlowError::Unavailable {
                    state,
                    intent: name,
                })
            }
        }
        Ok(self.state)
    }

    /// Periodic update. Returns whether anything visible changed.
    pub fn tick(&mut self) -> Result<bool, FlowError> {
        match self.state {
            FlowState::Playing => {
                let Some(session) = self.session.as_mut() else {
                    return Ok(false);
                };
                let mut changed = session.check_time().is_some();
                let engine_move = (!session.is_over() && session.is_engine_turn())
                    .then(|| session.request_engine_move());
                let over = session.is_over();

                match engine_move {
                    Some(Ok(_)) | Some(Err(SessionError::FlagFell(_))) => changed = true,
                    Some(Err(err)) if err.is_fatal() => return Err(self.abort(err)),
                    Some(Err(err)) => return Err(err.into()),
                    None => {}
                }
                if over {
                    self.enter_review()?;
                    changed = true;
                }
                Ok(changed)
            }
            FlowState::Review => {
                let now = self.time.now();
                Ok(self.review.as_mut().is_some_and(|review| {
                    let before = review.index();
                    review.tick(now);
                    review.index() != before
                }))
            }
            _ => Ok(false),
        }
    }

    fn start_match(&mut self) -> Result<(), FlowError> {
        let mode = self.selections.mode.ok_or(FlowError::MissingSelection)?;
        let time = self.selections.time.ok_or(FlowError::MissingSelection)?;
        let config = MatchConfig {
            mode,
            human_side: match mode {
                Mode::HumanVsEngine => Some(self.selections.color.unwrap_or(Side::White)),
                _ => None,
            },
            difficulty: self.selections.difficulty.unwrap_or(Difficulty::Medium),
            time_limit_secs: time.secs(),
        };

        self.session = Some(MatchSession::new(
            config,
            self.settings,
            self.engine.clone(),
            self.time.clone(),
        ));
        self.review = None;
        self.state = FlowState::Playing;
        Ok(())
    }

    fn load_saved(&mut self, id: &str) -> Result<(), FlowError> {
        let saved = self
            .profile
            .find_saved(id)
            .cloned()
            .ok_or_else(|| FlowError::UnknownSavedGame(id.to_string()))?;
        let session =
            MatchSession::restore(&saved, self.settings, self.engine.clone(), self.time.clone())?;

        self.selections = Selections {
            mode: Some(saved.mode),
            color: saved.human_color.or(self.selections.color),
            difficulty: Some(saved.difficulty),
            time: Some(match saved.time_limit {
                Some(secs) => TimeControl::Seconds(secs),
                None => TimeControl::Unlimited,
            }),
        };
        let finished = session.is_over();
        self.session = Some(session);
        self.review = None;
        self.state = FlowState::Playing;
        if finished {
            self.enter_review()?;
        }
        Ok(())
    }

    fn play(&mut self, action: MatchIntent) -> Result<(), FlowError> {
        let Some(session) = self.session.as_mut() else {
            return Err(FlowError::Unavailable {
                state: self.state,
                intent: "game action",
            });
        };

        let outcome = match action {
            MatchIntent::Click(square) => session.click(square).map(drop),
            MatchIntent::Hint => session.request_hint().map(drop),
            MatchIntent::Resign => session.resign(),
            MatchIntent::Save => match session.save() {
                Ok(Some(saved)) => {
                    self.profile.save_game(saved)?;
                    session.mark_saved();
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            },
        };

        match outcome {
            Err(err) if err.is_fatal() => Err(self.abort(err)),
            Err(SessionError::FlagFell(side)) => {
                info!(side = %side, "move came after the flag fell");
                self.enter_review()
            }
            Err(err) => Err(err.into()),
            Ok(()) => {
                if self.session.as_ref().is_some_and(MatchSession::is_over) {
                    self.enter_review()?;
                }
                Ok(())
            }
        }
    }

    /// Evaluate the finished game and switch to the review.
    fn enter_review(&mut self) -> Result<(), FlowError> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let start = session.game().start().clone();
        let moves = session.game().history().to_vec();
        let result = session.result();

        info!(moves = moves.len(), "evaluating finished game");
        let evaluator = MoveEvaluator::new(self.engine.clone(), self.evaluation_depth);
        let evaluated = evaluator.evaluate(&start, &moves)?;
        self.review = Some(ReviewSession::new(start, &moves, evaluated)?);

        // Resignations only count once the player moves on to a new game.
        if let Some(result) = result.filter(|r| !matches!(r, GameResult::Resigned(_))) {
            self.record_stats(result)?;
        }
        self.state = FlowState::Review;
        Ok(())
    }

    fn leave_review(&mut self) -> Result<(), FlowError> {
        if let Some(result @ GameResult::Resigned(_)) =
            self.session.as_ref().and_then(MatchSession::result)
        {
            self.record_stats(result)?;
        }
        self.session = None;
        self.review = None;
        self.state = FlowState::Mode;
        Ok(())
    }

    fn continue_resigned(&mut self) -> Result<(), FlowError> {
        let session = self
            .session
            .as_mut()
            .ok_or(FlowError::Session(SessionError::NotResumable))?;
        session.resume()?;
        self.review = None;
        self.state = FlowState::Playing;
        Ok(())
    }

    /// Update the logged-in player's record for a finished Human-vs-Engine
    /// game.
    fn record_stats(&mut self, result: GameResult) -> Result<(), FlowError> {
        let Some(config) = self.session.as_ref().map(|s| *s.config()) else {
            return Ok(());
        };
        let (Mode::HumanVsEngine, Some(human)) = (config.mode, config.human_side) else {
            return Ok(());
        };
        if self.profile.current_user().is_none() {
            return Ok(());
        }

        let outcome = match result.winner() {
            None => StatOutcome::Tie,
            Some(winner) if winner == human => StatOutcome::Win,
            Some(_) => StatOutcome::Loss,
        };
        self.profile.record(outcome)?;
        Ok(())
    }

    /// Drop a session killed by an engine failure and go back to mode
    /// selection.
    fn abort(&mut self, err: SessionError) -> FlowError {
        warn!(error = %err, "game aborted");
        self.session = None;
        self.review = None;
        self.state = FlowState::Mode;
        self.last_error = Some(err.to_string());
        FlowError::Session(err)
    }
}
