//! Accounts, statistics and saved games, persisted as one JSON file.
//!
//! The file maps usernames to accounts. A missing or unreadable file is an
//! empty store, and saved games are decoded one by one so a single bad
//! record never hides the others.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::game::Side;
use crate::session::{Difficulty, Mode};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to write profile file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to encode profile data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Username must not be empty")]
    EmptyUsername,
    #[error("Username already taken: {0}")]
    UsernameTaken(String),
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("No user is logged in")]
    NotLoggedIn,
    #[error("Password hashing failed: {0}")]
    Hash(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
}

/// A finished game from the logged-in player's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatOutcome {
    Win,
    Loss,
    Tie,
}

/// Clock state at the moment of saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedClock {
    pub white_ms: i64,
    pub black_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedGame {
    pub id: String,
    pub saved_at: DateTime<Utc>,
    pub fen: String,
    pub move_history: Vec<String>,
    #[serde(default)]
    pub hints_used: Vec<u32>,
    pub human_color: Option<Side>,
    /// Seconds per side; `None` is unlimited.
    pub time_limit: Option<u64>,
    pub difficulty: Difficulty,
    pub mode: Mode,
    #[serde(default)]
    pub remaining_ms: Option<SavedClock>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct Account {
    /// Argon2 PHC string; guests have none.
    credential: Option<String>,
    stats: Stats,
    saved_games: Vec<SavedGame>,
}

/// On-disk shape, with saved games left undecoded.
#[derive(Deserialize)]
struct StoredAccount {
    #[serde(default)]
    credential: Option<String>,
    #[serde(default)]
    stats: Stats,
    #[serde(default)]
    saved_games: Vec<serde_json::Value>,
}

pub struct ProfileStore {
    path: PathBuf,
    accounts: BTreeMap<String, Account>,
    /// Guest accounts live in memory only.
    guests: BTreeSet<String>,
    current: Option<String>,
}

impl ProfileStore {
    /// Load the store at `path`. Never fails: problems with the file are
    /// logged and yield an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let accounts = match fs::read_to_string(&path) {
            Ok(content) => decode_accounts(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "no profile file, starting empty");
                BTreeMap::new()
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable profile file, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path,
            accounts,
            guests: BTreeSet::new(),
            current: None,
        }
    }

    pub fn current_user(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn create_account(&mut self, username: &str, password: &str) -> Result<(), ProfileError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ProfileError::EmptyUsername);
        }
        if self.accounts.contains_key(username) {
            return Err(ProfileError::UsernameTaken(username.to_string()));
        }

        let salt = SaltString::generate(&mut OsRng);
        let credential = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ProfileError::Hash(e.to_string()))?;

        self.accounts.insert(
            username.to_string(),
            Account {
                credential: Some(credential),
                ..Account::default()
            },
        );
        self.persist()?;
        self.current = Some(username.to_string());
        info!(user = username, "account created");
        Ok(())
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ProfileError> {
        let username = username.trim();
        let credential = self
            .accounts
            .get(username)
            .filter(|_| !self.guests.contains(username))
            .and_then(|a| a.credential.as_deref())
            .ok_or(ProfileError::InvalidCredentials)?;

        let hash = PasswordHash::new(credential).map_err(|_| ProfileError::InvalidCredentials)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .map_err(|_| ProfileError::InvalidCredentials)?;

        self.current = Some(username.to_string());
        info!(user = username, "logged in");
        Ok(())
    }

    /// Log in as a fresh guest. The account is never written to disk.
    pub fn guest_login(&mut self) -> String {
        let username = format!("guest_{}", uuid::Uuid::new_v4().simple());
        self.accounts.insert(username.clone(), Account::default());
        self.guests.insert(username.clone());
        self.current = Some(username.clone());
        info!(user = %username, "guest logged in");
        username
    }

    pub fn logout(&mut self) {
        self.current = None;
    }

    /// Stats of the logged-in user; zeros when nobody is logged in.
    pub fn stats(&self) -> Stats {
        self.account().map(|a| a.stats).unwrap_or_default()
    }

    pub fn record(&mut self, outcome: StatOutcome) -> Result<Stats, ProfileError> {
        let account = self.account_mut()?;
        match outcome {
            StatOutcome::Win => account.stats.wins += 1,
            StatOutcome::Loss => account.stats.losses += 1,
            StatOutcome::Tie => account.stats.ties += 1,
        }
        let stats = account.stats;
        self.persist()?;
        info!(user = ?self.current, outcome = ?outcome, "stats updated");
        Ok(stats)
    }

    pub fn saved_games(&self) -> &[SavedGame] {
        self.account().map(|a| a.saved_games.as_slice()).unwrap_or(&[])
    }

    pub fn find_saved(&self, id: &str) -> Option<&SavedGame> {
        self.saved_games().iter().find(|g| g.id == id)
    }

    /// Append a saved game to the logged-in user's list. The list is left
    /// unchanged when the file cannot be written.
    pub fn save_game(&mut self, game: SavedGame) -> Result<(), ProfileError> {
        let id = game.id.clone();
        self.account_mut()?.saved_games.push(game);
        if let Err(err) = self.persist() {
            self.account_mut()?.saved_games.pop();
            warn!(user = ?self.current, error = %err, "game not saved");
            return Err(err);
        }
        info!(user = ?self.current, id = %id, "game saved");
        Ok(())
    }

    fn account(&self) -> Option<&Account> {
        self.current.as_ref().and_then(|u| self.accounts.get(u))
    }

    fn account_mut(&mut self) -> Result<&mut Account, ProfileError> {
        let user = self.current.as_ref().ok_or(ProfileError::NotLoggedIn)?;
        self.accounts.get_mut(user).ok_or(ProfileError::NotLoggedIn)
    }

    fn persist(&self) -> Result<(), ProfileError> {
        let persistent: BTreeMap<&String, &Account> = self
            .accounts
            .iter()
            .filter(|(name, _)| !self.guests.contains(*name))
            .collect();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&persistent)?)?;
        Ok(())
    }
}

fn decode_accounts(content: &str) -> BTreeMap<String, Account> {
    let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(content) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "corrupt profile file, starting empty");
            return BTreeMap::new();
        }
    };

    let mut accounts = BTreeMap::new();
    for (username, value) in raw {
        let stored: StoredAccount = match serde_json::from_value(value) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(user = %username, error = %err, "skipping malformed account");
                continue;
            }
        };

        let saved_games = stored
            .saved_games
            .into_iter()
            .enumerate()
            .filter_map(|(i, game)| match serde_json::from_value(game) {
                Ok(game) => Some(game),
                Err(err) => {
                    warn!(user = %username, index = i, error = %err, "skipping malformed saved game");
                    None
                }
            })
            .collect();

        accounts.insert(
            username,
            Account {
                credential: stored.credential,
                stats: stored.stats,
                saved_games,
            },
        );
    }
    accounts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn saved_game(id: &str) -> SavedGame {
        SavedGame {
            id: id.to_string(),
            saved_at: Utc::now(),
            fen: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1".to_string(),
            move_history: vec!["e2e4".to_string()],
            hints_used: vec![1],
            human_color: Some(Side::White),
            time_limit: Some(300),
            difficulty: Difficulty::Hard,
            mode: Mode::HumanVsEngine,
            remaining_ms: None,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("user_data.json"));
        assert_eq!(store.current_user(), None);
        assert!(store.saved_games().is_empty());
        assert_eq!(store.stats(), Stats::default());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_data.json");
        fs::write(&path, "{ not json").unwrap();

        let mut store = ProfileStore::open(&path);
        assert!(matches!(
            store.login("alice", "pw"),
            Err(ProfileError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_create_account_and_login() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_data.json");

        let mut store = ProfileStore::open(&path);
        store.create_account("alice", "secret").unwrap();
        assert_eq!(store.current_user(), Some("alice"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("secret"));
        assert!(content.contains("$argon2"));

        let mut reopened = ProfileStore::open(&path);
        assert!(matches!(
            reopened.login("alice", "wrong"),
            Err(ProfileError::InvalidCredentials)
        ));
        reopened.login("alice", "secret").unwrap();
        assert_eq!(reopened.current_user(), Some("alice"));
    }

    #[test]
    fn test_duplicate_and_empty_usernames() {
        let dir = tempdir().unwrap();
        let mut store = ProfileStore::open(dir.path().join("user_data.json"));
        store.create_account("bob", "pw").unwrap();

        assert!(matches!(
            store.create_account("bob", "other"),
            Err(ProfileError::UsernameTaken(name)) if name == "bob"
        ));
        assert!(matches!(
            store.create_account("   ", "pw"),
            Err(ProfileError::EmptyUsername)
        ));
    }

    #[test]
    fn test_saved_games_and_stats_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_data.json");
        let mut store = ProfileStore::open(&path);
        store.create_account("carol", "pw").unwrap();

        store.save_game(saved_game("g1")).unwrap();
        store.record(StatOutcome::Win).unwrap();
        store.record(StatOutcome::Tie).unwrap();

        let mut reopened = ProfileStore::open(&path);
        reopened.login("carol", "pw").unwrap();
        assert_eq!(reopened.saved_games().len(), 1);
        assert_eq!(reopened.find_saved("g1"), Some(&store.saved_games()[0]));
        assert_eq!(
            reopened.stats(),
            Stats {
                wins: 1,
                losses: 0,
                ties: 1
            }
        );
    }

    #[test]
    fn test_failed_write_keeps_saved_games_unchanged() {
        let dir = tempdir().unwrap();
        let mut store = ProfileStore::open(dir.path());
        store.guest_login();

        assert!(matches!(
            store.save_game(saved_game("g1")),
            Err(ProfileError::Io(_))
        ));
        assert!(store.saved_games().is_empty());
        assert!(store.find_saved("g1").is_none());
    }

    #[test]
    fn test_malformed_saved_game_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_data.json");
        let mut store = ProfileStore::open(&path);
        store.create_account("dave", "pw").unwrap();
        store.save_game(saved_game("good")).unwrap();

        let mut raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        raw["dave"]["saved_games"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({ "id": "bad", "fen": 42 }));
        fs::write(&path, raw.to_string()).unwrap();

        let mut reopened = ProfileStore::open(&path);
        reopened.login("dave", "pw").unwrap();
        let ids: Vec<&str> = reopened.saved_games().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
    }

    #[test]
    fn test_record_without_remaining_clock_loads() {
        let json = serde_json::json!({
            "id": "old",
            "saved_at": "2024-05-01T12:00:00Z",
            "fen": "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "move_history": [],
            "hints_used": [],
            "human_color": null,
            "time_limit": null,
            "difficulty": "Easy",
            "mode": "HumanVsHuman"
        });
        let game: SavedGame = serde_json::from_value(json).unwrap();
        assert_eq!(game.remaining_ms, None);
        assert_eq!(game.mode, Mode::HumanVsHuman);
    }

    #[test]
    fn test_guest_is_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_data.json");
        let mut store = ProfileStore::open(&path);

        let guest = store.guest_login();
        assert!(guest.starts_with("guest_"));
        store.record(StatOutcome::Loss).unwrap();
        assert_eq!(store.stats().losses, 1);

        let reopened = ProfileStore::open(&path);
        assert!(reopened.accounts.is_empty());
    }

    #[test]
    fn test_record_requires_login() {
        let dir = tempdir().unwrap();
        let mut store = ProfileStore::open(dir.path().join("user_data.json"));
        assert!(matches!(
            store.record(StatOutcome::Win),
            Err(ProfileError::NotLoggedIn)
        ));
    }
}
