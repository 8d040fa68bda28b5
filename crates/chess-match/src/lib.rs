//! Chess Match - play chess against a UCI engine.
//!
//! This crate runs chess games between humans and an engine such as
//! Stockfish, with optional clocks, hints, saved games, per-user statistics
//! and an engine-backed review of every finished game.
//!
//! # Modules
//!
//! - [`game`] - Position, move history and game-over detection
//! - [`clock`] - Per-side countdown clocks and the time source seam
//! - [`session`] - One live game: selection, moves, engine turns, hints
//! - [`profile`] - Accounts, statistics and saved games in a JSON file
//! - [`review`] - Step through a finished game with move classifications
//! - [`flow`] - Login, configuration, play and review as one state machine
//! - [`config`] - TOML configuration

pub mod clock;
pub mod config;
pub mod flow;
pub mod game;
pub mod profile;
pub mod review;
pub mod session;
