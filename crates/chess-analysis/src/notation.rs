//! FEN, UCI and SAN conversions on top of shakmaty.

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotationError {
    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },
}

/// Parse a FEN into a playable standard-chess position.
pub fn parse_fen(fen: &str) -> Result<Chess, NotationError> {
    let invalid = |reason: String| NotationError::InvalidFen {
        fen: fen.to_string(),
        reason,
    };
    let parsed: Fen = fen.trim().parse().map_err(|e| invalid(format!("{}", e)))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| invalid(format!("{}", e)))
}

/// Full FEN for a position. The en passant square is only written when a
/// capture is actually possible.
pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string()
}

/// FEN without the halfmove clock and fullmove number, used to detect
/// repeated positions.
pub fn position_key(pos: &Chess) -> String {
    let fen = to_fen(pos);
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// Resolve a UCI move string against a position. `None` when it is
/// malformed or not legal there.
pub fn parse_uci(pos: &Chess, uci: &str) -> Option<Move> {
    let parsed: UciMove = uci.trim().parse().ok()?;
    parsed.to_move(pos).ok()
}

pub fn to_uci(mv: &Move) -> String {
    UciMove::from_move(mv, CastlingMode::Standard).to_string()
}

pub fn to_san(pos: &Chess, mv: &Move) -> String {
    San::from_move(pos, mv).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::Position;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_fen_round_trip_start() {
        let pos = parse_fen(START).unwrap();
        assert_eq!(to_fen(&pos), START);
        assert_eq!(to_fen(&Chess::default()), START);
    }

    #[test]
    fn test_invalid_fen() {
        let err = parse_fen("not a fen").unwrap_err();
        assert!(err.to_string().starts_with("Invalid FEN 'not a fen'"));
    }

    #[test]
    fn test_parse_uci_rejects_illegal() {
        let pos = Chess::default();
        assert!(parse_uci(&pos, "e2e4").is_some());
        assert!(parse_uci(&pos, "e2e5").is_none());
        assert!(parse_uci(&pos, "zz").is_none());
    }

    #[test]
    fn test_san_and_uci() {
        let pos = Chess::default();
        let mv = parse_uci(&pos, "g1f3").unwrap();
        assert_eq!(to_san(&pos, &mv), "Nf3");
        assert_eq!(to_uci(&mv), "g1f3");
    }

    #[test]
    fn test_position_key_ignores_counters() {
        let mut pos = Chess::default();
        for uci in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let mv = parse_uci(&pos, uci).unwrap();
            pos.play_unchecked(&mv);
        }
        assert_ne!(to_fen(&pos), START);
        assert_eq!(position_key(&pos), position_key(&Chess::default()));
    }
}
