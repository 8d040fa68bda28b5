//! UCI (Universal Chess Interface) protocol types for the GUI side.
//!
//! This crate formats the commands a GUI sends to an engine and parses the
//! lines an engine sends back. It does no I/O of its own; the process
//! plumbing lives with the engine client.
//!
//! # Commands sent to the engine
//!
//! - `uci` - Initialize engine, get id and options
//! - `isready` / `readyok` - Synchronization
//! - `ucinewgame` - Forget hash tables and search state
//! - `position fen <fen> [moves <move>...]` - Set position
//! - `go [movetime <ms>] [depth <d>]` - Start search
//! - `stop` - Stop search
//! - `quit` - Exit engine
//!
//! # Example
//!
//! ```
//! use uci::{EngineMessage, GoOptions, GuiCommand};
//!
//! let go = GuiCommand::Go(GoOptions::depth(12));
//! assert_eq!(go.to_uci(), "go depth 12");
//!
//! let reply = EngineMessage::parse("bestmove e2e4 ponder e7e5");
//! assert_eq!(
//!     reply,
//!     Some(EngineMessage::BestMove {
//!         mv: Some("e2e4".to_string()),
//!         ponder: Some("e7e5".to_string()),
//!     })
//! );
//! ```

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{EngineInfo, Score};

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id {
        name: Option<String>,
        author: Option<String>,
    },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Search finished. `mv` is `None` when the engine has no move to play
    /// (`bestmove (none)` or `bestmove 0000`), which happens in mated or
    /// stalemated positions.
    BestMove {
        mv: Option<String>,
        ponder: Option<String>,
    },
    /// Anything else (`option`, `copyprotection`, banners...).
    Other(String),
}

impl EngineMessage {
    /// Parse one line of engine output.
    ///
    /// Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        let keyword = parts.next()?;

        let message = match keyword {
            "uciok" => EngineMessage::UciOk,
            "readyok" => EngineMessage::ReadyOk,
            "id" => match parts.next() {
                Some("name") => EngineMessage::Id {
                    name: Some(parts.collect::<Vec<_>>().join(" ")),
                    author: None,
                },
                Some("author") => EngineMessage::Id {
                    name: None,
                    author: Some(parts.collect::<Vec<_>>().join(" ")),
                },
                _ => EngineMessage::Other(line.to_string()),
            },
            "info" => match EngineInfo::parse(line) {
                Some(info) => EngineMessage::Info(info),
                None => EngineMessage::Other(line.to_string()),
            },
            "bestmove" => {
                let mv = parts.next().filter(|m| is_real_move(m)).map(str::to_string);
                let ponder = match parts.next() {
                    Some("ponder") => parts.next().filter(|m| is_real_move(m)).map(str::to_string),
                    _ => None,
                };
                EngineMessage::BestMove { mv, ponder }
            }
            _ => EngineMessage::Other(line.to_string()),
        };

        Some(message)
    }
}

fn is_real_move(token: &str) -> bool {
    !matches!(token, "(none)" | "0000" | "none")
}
