//! Line-oriented terminal front end.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use chess_match::flow::{FlowState, Intent, MatchIntent, SessionFlow, TimeControl};
use chess_match::game::Side;
use chess_match::review::{ReviewIntent, ReviewSession};
use chess_match::session::{Difficulty, Mode, Snapshot};
use shakmaty::{Chess, File, Position, Rank, Square};

const AUTOPLAY_POLL: Duration = Duration::from_millis(50);

const HELP: &str = "\
login <user> <password>   register <user> <password>   guest
mode hvh|hve|eve   color white|black   difficulty easy|medium|hard|extreme
time none|<seconds>   next   back   load <id>   saved   stats
e2 (select / move)   hint   resign   save
start   prev   forward   pause   speed   new   continue
help   quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Intent(Intent),
    Help,
    Stats,
    Saved,
    /// Empty line: just refresh.
    Refresh,
}

pub fn parse(line: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let intent = match words.as_slice() {
        [] => return Ok(Command::Refresh),
        ["help"] | ["?"] => return Ok(Command::Help),
        ["stats"] => return Ok(Command::Stats),
        ["saved"] => return Ok(Command::Saved),

        ["login", user, password] => Intent::Login {
            username: user.to_string(),
            password: password.to_string(),
        },
        ["register", user, password] => Intent::CreateAccount {
            username: user.to_string(),
            password: password.to_string(),
        },
        ["guest"] => Intent::Guest,
        ["mode", mode] => Intent::ChooseMode(parse_mode(mode)?),
        ["color", color] => Intent::ChooseColor(match *color {
            "white" | "w" => Side::White,
            "black" | "b" => Side::Black,
            other => return Err(format!("unknown color '{}'", other)),
        }),
        ["difficulty", level] => Intent::ChooseDifficulty(parse_difficulty(level)?),
        ["time", "none"] => Intent::ChooseTime(TimeControl::Unlimited),
        ["time", secs] => match secs.parse::<u64>() {
            Ok(secs) if secs > 0 => Intent::ChooseTime(TimeControl::Seconds(secs)),
            _ => return Err(format!("invalid time '{}'", secs)),
        },
        ["next"] => Intent::Next,
        ["back"] => Intent::Back,
        ["load", id] => Intent::LoadSaved(id.to_string()),

        ["hint"] => Intent::Match(MatchIntent::Hint),
        ["resign"] => Intent::Match(MatchIntent::Resign),
        ["save"] => Intent::Match(MatchIntent::Save),

        ["start"] => Intent::Review(ReviewIntent::ToStart),
        ["prev"] => Intent::Review(ReviewIntent::Prev),
        ["forward"] => Intent::Review(ReviewIntent::Next),
        ["pause"] | ["play"] => Intent::Review(ReviewIntent::TogglePlay),
        ["speed"] => Intent::Review(ReviewIntent::CycleSpeed),
        ["new"] => Intent::NewGame,
        ["continue"] => Intent::Continue,
        ["quit"] | ["exit"] => Intent::Quit,

        [word] => match word.parse::<Square>() {
            Ok(square) => Intent::Match(MatchIntent::Click(square)),
            Err(_) => return Err(format!("unknown command '{}'", word)),
        },
        _ => return Err(format!("unknown command '{}'", line.trim())),
    };
    Ok(Command::Intent(intent))
}

fn parse_mode(word: &str) -> Result<Mode, String> {
    match word {
        "hvh" => Ok(Mode::HumanVsHuman),
        "hve" => Ok(Mode::HumanVsEngine),
        "eve" => Ok(Mode::EngineVsEngine),
        other => Err(format!("unknown mode '{}'", other)),
    }
}

fn parse_difficulty(word: &str) -> Result<Difficulty, String> {
    match word {
        "easy" => Ok(Difficulty::Easy),
        "medium" => Ok(Difficulty::Medium),
        "hard" => Ok(Difficulty::Hard),
        "extreme" => Ok(Difficulty::Extreme),
        other => Err(format!("unknown difficulty '{}'", other)),
    }
}

/// Read commands from stdin until `quit` or end of input.
pub fn run(mut flow: SessionFlow) -> io::Result<()> {
    let stdin = io::stdin();
    let mut out = io::stdout();
    writeln!(out, "{}", render(&flow))?;

    for line in stdin.lock().lines() {
        let line = line?;
        match parse(&line) {
            Ok(Command::Help) => writeln!(out, "{}", HELP)?,
            Ok(Command::Stats) => {
                let stats = flow.profile().stats();
                writeln!(
                    out,
                    "wins {}  losses {}  ties {}",
                    stats.wins, stats.losses, stats.ties
                )?;
            }
            Ok(Command::Saved) => {
                for game in flow.profile().saved_games() {
                    writeln!(
                        out,
                        "{}  {}  {:?}  {} moves",
                        game.id,
                        game.saved_at.format("%Y-%m-%d %H:%M"),
                        game.mode,
                        game.move_history.len()
                    )?;
                }
            }
            Ok(Command::Refresh) => {}
            Ok(Command::Intent(intent)) => {
                if let Err(err) = flow.handle(intent) {
                    writeln!(out, "! {}", err)?;
                }
            }
            Err(msg) => writeln!(out, "! {} (type 'help')", msg)?,
        }

        drive(&mut flow, &mut out)?;
        if flow.state() == FlowState::Exited {
            break;
        }
        writeln!(out, "{}", render(&flow))?;
        out.flush()?;
    }
    Ok(())
}

/// Tick the flow until it waits for the user again: engine moves are played
/// out and review autoplay runs to its end.
fn drive(flow: &mut SessionFlow, out: &mut impl Write) -> io::Result<()> {
    loop {
        let changed = match flow.tick() {
            Ok(changed) => changed,
            Err(err) => {
                writeln!(out, "! {}", err)?;
                false
            }
        };
        if changed && flow.state() == FlowState::Review {
            writeln!(out, "{}", render(flow))?;
        } else if changed {
            if let Some(mv) = flow.session().and_then(|s| s.snapshot().last_move) {
                writeln!(out, "  {}", mv.san)?;
            }
        }

        let autoplay = flow.state() == FlowState::Review
            && flow.review().is_some_and(ReviewSession::is_playing);
        if autoplay {
            thread::sleep(AUTOPLAY_POLL);
        } else if !changed {
            return Ok(());
        }
    }
}

pub fn render(flow: &SessionFlow) -> String {
    let selections = flow.selections();
    match flow.state() {
        FlowState::Login => {
            "Log in: login <user> <password> | register <user> <password> | guest".to_string()
        }
        FlowState::Mode => {
            let user = flow.profile().current_user().unwrap_or("-");
            format!(
                "[{}] mode: {} (hvh | hve | eve), then 'next'. 'saved' lists saved games.",
                user,
                describe(selections.mode)
            )
        }
        FlowState::Color => format!(
            "color: {} (white | black), then 'next'",
            describe(selections.color)
        ),
        FlowState::Difficulty => format!(
            "difficulty: {} (easy | medium | hard | extreme), then 'next'",
            describe(selections.difficulty)
        ),
        FlowState::Time => {
            let time = match selections.time {
                Some(TimeControl::Unlimited) => "none".to_string(),
                Some(TimeControl::Seconds(secs)) => format!("{}s", secs),
                None => "-".to_string(),
            };
            format!("time: {} (none | <seconds>), then 'next' to start", time)
        }
        FlowState::Playing => match flow.session() {
            Some(session) => {
                let flipped = session.config().human_side == Some(Side::Black);
                render_playing(&session.snapshot(), session.game().position(), flipped)
            }
            None => String::new(),
        },
        FlowState::Review => render_review(flow),
        FlowState::Exited => "Goodbye.".to_string(),
    }
}

fn describe<T: std::fmt::Debug>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:?}", v))
}

fn render_playing(snapshot: &Snapshot, position: &Chess, flipped: bool) -> String {
    let mut out = board(position, flipped, snapshot.selected, &snapshot.destinations);
    out.push_str(&format!(
        "\nWhite {}  Black {}\n",
        format_clock(snapshot.white_remaining),
        format_clock(snapshot.black_remaining)
    ));
    if let Some(mv) = &snapshot.last_move {
        out.push_str(&format!("last: {}\n", mv.san));
    }
    if let Some(hint) = &snapshot.hint {
        out.push_str(&format!("hint: {}\n", hint.uci));
    }
    out.push_str(&format!(
        "move {}, {} to play{}",
        snapshot.fullmove_number,
        snapshot.side_to_move,
        if snapshot.in_check { ", check" } else { "" }
    ));
    if snapshot.saved {
        out.push_str(" (saved)");
    }
    out
}

fn render_review(flow: &SessionFlow) -> String {
    let Some(review) = flow.review() else {
        return String::new();
    };
    let mut out = board(review.position(), false, None, &[]);
    out.push('\n');

    if let Some(result) = flow.session().and_then(|s| s.result()) {
        out.push_str(&format!("Result: {}\n", result));
    }
    match review.last_move() {
        Some(mv) => out.push_str(&format!(
            "ply {}/{}: {} ({}){}\n",
            review.index(),
            review.len(),
            mv.san,
            mv.class,
            mv.best_move
                .as_deref()
                .map(|best| format!(", engine preferred {}", best))
                .unwrap_or_default()
        )),
        None => out.push_str(&format!("ply 0/{}\n", review.len())),
    }

    let (white, black) = review.tally();
    out.push_str(&format!(
        "White: {} best, {} acceptable, {} inaccurate\n",
        white.best, white.acceptable, white.inaccurate
    ));
    out.push_str(&format!(
        "Black: {} best, {} acceptable, {} inaccurate\n",
        black.best, black.acceptable, black.inaccurate
    ));
    out.push_str(&format!(
        "speed {}x{}",
        review.speed(),
        if review.is_playing() { ", playing" } else { "" }
    ));
    out
}

/// Text board. `*` marks an empty legal destination, brackets the selection.
pub fn board(
    position: &Chess,
    flipped: bool,
    selected: Option<Square>,
    destinations: &[Square],
) -> String {
    let ranks: Vec<u32> = if flipped {
        (0..8).collect()
    } else {
        (0..8).rev().collect()
    };
    let files: Vec<u32> = if flipped {
        (0..8).rev().collect()
    } else {
        (0..8).collect()
    };

    let mut out = String::new();
    for &rank in &ranks {
        out.push_str(&format!("{} ", rank + 1));
        for &file in &files {
            let square = Square::from_coords(File::new(file), Rank::new(rank));
            let symbol = match position.board().piece_at(square) {
                Some(piece) => piece.char(),
                None if destinations.contains(&square) => '*',
                None => '.',
            };
            if selected == Some(square) {
                out.push('[');
                out.push(symbol);
                out.push(']');
            } else {
                out.push(' ');
                out.push(symbol);
                out.push(' ');
            }
        }
        out.push('\n');
    }
    out.push_str("  ");
    for &file in &files {
        out.push(' ');
        out.push(File::new(file).char());
        out.push(' ');
    }
    out
}

fn format_clock(remaining: Option<Duration>) -> String {
    match remaining {
        Some(left) => {
            let secs = left.as_secs();
            format!("{:02}:{:02}", secs / 60, secs % 60)
        }
        None => "--:--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_square_is_click() {
        assert_eq!(
            parse("e2").unwrap(),
            Command::Intent(Intent::Match(MatchIntent::Click(Square::E2)))
        );
    }

    #[test]
    fn test_parse_setup_commands() {
        assert_eq!(
            parse("mode hve").unwrap(),
            Command::Intent(Intent::ChooseMode(Mode::HumanVsEngine))
        );
        assert_eq!(
            parse("time 300").unwrap(),
            Command::Intent(Intent::ChooseTime(TimeControl::Seconds(300)))
        );
        assert_eq!(
            parse("  time none ").unwrap(),
            Command::Intent(Intent::ChooseTime(TimeControl::Unlimited))
        );
        assert_eq!(
            parse("login alice secret").unwrap(),
            Command::Intent(Intent::Login {
                username: "alice".to_string(),
                password: "secret".to_string()
            })
        );
        assert_eq!(parse("").unwrap(), Command::Refresh);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("time 0").is_err());
        assert!(parse("mode chess960").is_err());
        assert!(parse("z9").is_err());
        assert!(parse("login alice").is_err());
    }

    #[test]
    fn test_board_marks_selection() {
        let text = board(&Chess::default(), false, Some(Square::E2), &[Square::E3, Square::E4]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "8  r  n  b  q  k  b  n  r ");
        assert_eq!(lines[4], "4  .  .  .  .  *  .  .  . ");
        assert_eq!(lines[6], "2  P  P  P  P [P] P  P  P ");
        assert_eq!(lines[8], "   a  b  c  d  e  f  g  h ");
    }

    #[test]
    fn test_board_flipped_for_black() {
        let text = board(&Chess::default(), true, None, &[]);
        assert!(text.starts_with("1  R  N  B  K  Q  B  N  R"));
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Some(Duration::from_millis(65_900))), "01:05");
        assert_eq!(format_clock(None), "--:--");
    }
}
