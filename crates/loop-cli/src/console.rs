//! Line-oriented console commands read from stdin.

use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use loop_player_types::{PlaybackStatus, TransportState};

pub const HELP: &str = "commands: open <path> | play | pause | stop | clear | level <0.0-1.0> | status | help | quit";

#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleCommand {
    Open(PathBuf),
    Play,
    Pause,
    Stop,
    Clear,
    Level(f32),
    Status,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "open" | "o" => {
            if rest.is_empty() {
                bail!("usage: open <path>");
            }
            ConsoleCommand::Open(PathBuf::from(rest))
        }
        "play" | "p" => ConsoleCommand::Play,
        "pause" => ConsoleCommand::Pause,
        "stop" | "s" => ConsoleCommand::Stop,
        "clear" | "c" => ConsoleCommand::Clear,
        "level" | "l" => {
            let value: f32 = rest
                .parse()
                .map_err(|_| anyhow!("usage: level <0.0-1.0>"))?;
            if !(0.0..=1.0).contains(&value) {
                bail!("level must be between 0.0 and 1.0, got {value}");
            }
            ConsoleCommand::Level(value)
        }
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => bail!("unknown command: {other} ({HELP})"),
    };
    Ok(Some(cmd))
}

/// Position label refreshed on the tick, e.g. `playing 0.50 / 2.00 s`.
pub fn position_label(status: &PlaybackStatus) -> String {
    match (status.elapsed_ms, status.duration_ms) {
        (Some(elapsed), Some(total)) => format!(
            "{} {:.2} / {:.2} s",
            status.state,
            elapsed as f64 / 1000.0,
            total as f64 / 1000.0
        ),
        _ => format!("{} (no source)", status.state),
    }
}

/// Which transport controls make sense right now.
pub fn controls_hint(state: TransportState) -> &'static str {
    match (state.can_play(), state.can_stop()) {
        (true, true) => "[play] [stop]",
        (true, false) => "[play]",
        (false, true) => "[pause] [stop]",
        (false, false) => "",
    }
}
