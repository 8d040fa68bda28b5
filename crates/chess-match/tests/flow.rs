//! End-to-end tests of the session flow against a scripted engine.

use std::sync::Arc;
use std::time::Duration;

use chess_analysis::engine::share;
use chess_analysis::testing::ScriptedEngine;
use chess_match::clock::ManualTime;
use chess_match::flow::{FlowError, FlowState, Intent, MatchIntent, SessionFlow, TimeControl};
use chess_match::game::{Game, Side};
use chess_match::profile::ProfileStore;
use chess_match::review::ReviewIntent;
use chess_match::session::{Difficulty, GameResult, Mode, SessionError, SessionSettings};
use shakmaty::{Chess, Square};
use tempfile::TempDir;

struct Harness {
    flow: SessionFlow,
    time: ManualTime,
    dir: TempDir,
}

impl Harness {
    fn new(engine: ScriptedEngine) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let time = ManualTime::new();
        let flow = open_flow(&dir, engine, &time);
        Self { flow, time, dir }
    }

    fn handle(&mut self, intent: Intent) -> FlowState {
        self.flow.handle(intent).unwrap()
    }

    fn start(&mut self, mode: Mode, side: Side, time: TimeControl) {
        self.handle(Intent::ChooseMode(mode));
        self.handle(Intent::Next);
        if mode == Mode::HumanVsEngine {
            self.handle(Intent::ChooseColor(side));
            self.handle(Intent::Next);
            self.handle(Intent::ChooseDifficulty(Difficulty::Easy));
            self.handle(Intent::Next);
        }
        self.handle(Intent::ChooseTime(time));
        assert_eq!(self.handle(Intent::Next), FlowState::Playing);
    }

    fn play(&mut self, from: Square, to: Square) {
        self.handle(Intent::Match(MatchIntent::Click(from)));
        self.handle(Intent::Match(MatchIntent::Click(to)));
    }

    fn history(&self) -> Vec<String> {
        self.flow.session().unwrap().game().history().to_vec()
    }
}

fn open_flow(dir: &TempDir, engine: ScriptedEngine, time: &ManualTime) -> SessionFlow {
    SessionFlow::new(
        ProfileStore::open(dir.path().join("user_data.json")),
        share(engine),
        Arc::new(time.clone()),
        SessionSettings::default(),
        22,
    )
}

fn fen_after(moves: &[&str]) -> String {
    let moves: Vec<String> = moves.iter().map(|m| m.to_string()).collect();
    Game::replay(Chess::default(), &moves).unwrap().to_fen()
}

#[test]
fn test_engine_mates_human_and_review_follows() {
    let engine = ScriptedEngine::new()
        .with_best_move(&fen_after(&["f2f3"]), Some("e7e5"))
        .with_best_move(&fen_after(&["f2f3", "e7e5", "g2g4"]), Some("d8h4"));
    let mut h = Harness::new(engine);
    h.handle(Intent::Guest);
    h.start(Mode::HumanVsEngine, Side::White, TimeControl::Unlimited);

    h.play(Square::F2, Square::F3);
    assert!(h.flow.tick().unwrap());
    h.play(Square::G2, Square::G4);
    assert!(h.flow.tick().unwrap());

    assert_eq!(h.flow.state(), FlowState::Review);
    assert_eq!(
        h.flow.session().and_then(|s| s.result()),
        Some(GameResult::BlackWins)
    );
    let review = h.flow.review().unwrap();
    assert_eq!(review.len(), 4);
    assert_eq!(review.evaluated()[3].san, "Qh4");
    assert_eq!(h.flow.profile().stats().losses, 1);

    h.handle(Intent::Review(ReviewIntent::Next));
    assert_eq!(h.flow.review().unwrap().index(), 1);

    assert_eq!(h.handle(Intent::NewGame), FlowState::Mode);
    assert!(h.flow.session().is_none());
    assert_eq!(h.flow.profile().stats().losses, 1);
    assert_eq!(h.flow.selections().mode, Some(Mode::HumanVsEngine));
}

#[test]
fn test_resignation_counts_only_when_leaving_review() {
    let mut h = Harness::new(ScriptedEngine::new());
    h.handle(Intent::Guest);
    h.start(Mode::HumanVsEngine, Side::White, TimeControl::Unlimited);
    h.play(Square::E2, Square::E4);
    h.flow.tick().unwrap();

    h.handle(Intent::Match(MatchIntent::Resign));
    assert_eq!(h.flow.state(), FlowState::Review);
    assert_eq!(h.flow.profile().stats().losses, 0);

    assert_eq!(h.handle(Intent::Continue), FlowState::Playing);
    assert_eq!(h.history().len(), 2);
    assert!(!h.flow.session().unwrap().is_over());

    h.handle(Intent::Match(MatchIntent::Resign));
    h.handle(Intent::NewGame);
    assert_eq!(h.flow.profile().stats().losses, 1);
}

#[test]
fn test_continue_refused_after_checkmate() {
    let engine = ScriptedEngine::new()
        .with_best_move(&fen_after(&["f2f3"]), Some("e7e5"))
        .with_best_move(&fen_after(&["f2f3", "e7e5", "g2g4"]), Some("d8h4"));
    let mut h = Harness::new(engine);
    h.handle(Intent::Guest);
    h.start(Mode::HumanVsEngine, Side::White, TimeControl::Unlimited);
    h.play(Square::F2, Square::F3);
    h.flow.tick().unwrap();
    h.play(Square::G2, Square::G4);
    h.flow.tick().unwrap();

    assert!(matches!(
        h.flow.handle(Intent::Continue),
        Err(FlowError::Session(SessionError::NotResumable))
    ));
    assert_eq!(h.flow.state(), FlowState::Review);
}

#[test]
fn test_timeout_ends_game() {
    let mut h = Harness::new(ScriptedEngine::new());
    h.handle(Intent::Guest);
    h.start(Mode::HumanVsEngine, Side::White, TimeControl::Seconds(10));

    h.time.advance(Duration::from_secs(9));
    assert!(!h.flow.tick().unwrap());
    assert_eq!(h.flow.state(), FlowState::Playing);

    h.time.advance(Duration::from_secs(2));
    assert!(h.flow.tick().unwrap());
    assert_eq!(h.flow.state(), FlowState::Review);
    assert_eq!(
        h.flow.session().and_then(|s| s.result()),
        Some(GameResult::TimedOut(Side::White))
    );
    assert_eq!(h.flow.profile().stats().losses, 1);
}

#[test]
fn test_move_after_flag_fell_goes_to_review() {
    let mut h = Harness::new(ScriptedEngine::new());
    h.handle(Intent::Guest);
    h.start(Mode::HumanVsHuman, Side::White, TimeControl::Seconds(5));

    h.handle(Intent::Match(MatchIntent::Click(Square::E2)));
    h.time.advance(Duration::from_secs(10));
    assert_eq!(
        h.handle(Intent::Match(MatchIntent::Click(Square::E4))),
        FlowState::Review
    );
    assert!(h.history().is_empty());
    assert_eq!(
        h.flow.session().and_then(|s| s.result()),
        Some(GameResult::TimedOut(Side::White))
    );
}

#[test]
fn test_review_autoplays_after_game() {
    let mut h = Harness::new(ScriptedEngine::new());
    h.handle(Intent::Guest);
    h.start(Mode::HumanVsHuman, Side::White, TimeControl::Unlimited);
    h.play(Square::E2, Square::E4);
    h.play(Square::E7, Square::E5);
    h.handle(Intent::Match(MatchIntent::Resign));

    assert!(h.flow.review().unwrap().is_playing());
    assert!(!h.flow.tick().unwrap());
    h.time.advance(Duration::from_secs(1));
    assert!(h.flow.tick().unwrap());
    assert_eq!(h.flow.review().unwrap().index(), 1);
}

#[test]
fn test_dead_engine_returns_to_mode_selection() {
    let mut h = Harness::new(ScriptedEngine::dead());
    h.handle(Intent::Guest);
    h.start(Mode::HumanVsEngine, Side::Black, TimeControl::Unlimited);

    let err = h.flow.tick().unwrap_err();
    assert!(matches!(
        err,
        FlowError::Session(SessionError::Engine(_))
    ));
    assert_eq!(h.flow.state(), FlowState::Mode);
    assert!(h.flow.session().is_none());
    assert!(h.flow.take_error().is_some());
    assert!(h.flow.take_error().is_none());
}

#[test]
fn test_hint_in_human_vs_human() {
    let engine = ScriptedEngine::new().with_best_move(&fen_after(&[]), Some("d2d4"));
    let mut h = Harness::new(engine);
    h.handle(Intent::Guest);
    h.start(Mode::HumanVsHuman, Side::White, TimeControl::Unlimited);

    h.handle(Intent::Match(MatchIntent::Hint));
    let snapshot = h.flow.session().unwrap().snapshot();
    assert_eq!(snapshot.hint.map(|hint| hint.uci), Some("d2d4".to_string()));

    h.play(Square::E2, Square::E4);
    assert!(h.flow.session().unwrap().snapshot().hint.is_none());
    assert!(h.flow.session().unwrap().hints_used().contains(&1));
}

#[test]
fn test_engine_vs_engine_moves_every_tick() {
    let mut h = Harness::new(ScriptedEngine::new());
    h.handle(Intent::Guest);
    h.start(Mode::EngineVsEngine, Side::White, TimeControl::Unlimited);

    assert!(h.flow.tick().unwrap());
    assert!(h.flow.tick().unwrap());
    assert_eq!(h.history().len(), 2);

    assert!(matches!(
        h.flow.handle(Intent::Match(MatchIntent::Resign)),
        Err(FlowError::Session(SessionError::ResignUnavailable))
    ));
}

#[test]
fn test_saved_game_restores_in_a_new_flow() {
    let mut h = Harness::new(ScriptedEngine::new());
    h.handle(Intent::CreateAccount {
        username: "alice".to_string(),
        password: "hunter2".to_string(),
    });
    h.start(Mode::HumanVsEngine, Side::White, TimeControl::Seconds(60));

    h.time.advance(Duration::from_secs(3));
    h.play(Square::E2, Square::E4);
    h.flow.tick().unwrap();
    h.time.advance(Duration::from_secs(5));
    h.handle(Intent::Match(MatchIntent::Save));
    h.handle(Intent::Match(MatchIntent::Save));

    let history = h.history();
    assert_eq!(h.flow.profile().saved_games().len(), 1);
    let id = h.flow.profile().saved_games()[0].id.clone();

    let mut flow = open_flow(&h.dir, ScriptedEngine::new(), &h.time);
    flow.handle(Intent::Login {
        username: "alice".to_string(),
        password: "hunter2".to_string(),
    })
    .unwrap();
    assert_eq!(flow.handle(Intent::LoadSaved(id)).unwrap(), FlowState::Playing);

    let session = flow.session().unwrap();
    assert_eq!(session.game().history(), history.as_slice());
    assert_eq!(session.config().human_side, Some(Side::White));
    assert_eq!(session.config().time_limit_secs, Some(60));
    assert_eq!(session.clock().remaining_ms(Side::White), Some(52_000));
    assert_eq!(session.clock().remaining_ms(Side::Black), Some(60_000));
    assert_eq!(flow.selections().time, Some(TimeControl::Seconds(60)));
}

#[test]
fn test_failed_save_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let time = ManualTime::new();
    let mut flow = SessionFlow::new(
        ProfileStore::open(dir.path()),
        share(ScriptedEngine::new()),
        Arc::new(time.clone()),
        SessionSettings::default(),
        22,
    );
    flow.handle(Intent::Guest).unwrap();
    flow.handle(Intent::ChooseMode(Mode::HumanVsHuman)).unwrap();
    flow.handle(Intent::Next).unwrap();
    flow.handle(Intent::ChooseTime(TimeControl::Unlimited)).unwrap();
    assert_eq!(flow.handle(Intent::Next).unwrap(), FlowState::Playing);

    for _ in 0..2 {
        assert!(matches!(
            flow.handle(Intent::Match(MatchIntent::Save)),
            Err(FlowError::Profile(_))
        ));
        assert!(!flow.session().unwrap().is_saved());
        assert!(flow.profile().saved_games().is_empty());
    }
}

#[test]
fn test_unknown_saved_game() {
    let mut h = Harness::new(ScriptedEngine::new());
    h.handle(Intent::Guest);
    assert!(matches!(
        h.flow.handle(Intent::LoadSaved("missing".to_string())),
        Err(FlowError::UnknownSavedGame(_))
    ));
}
