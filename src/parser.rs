/// Parses operator command lines (stdin) into typed `LocalAction`s.
///
/// Grammar, one command per line, case-insensitive keywords:
///
///   start              begin a session with the current settings
///   log <drink_type>   log one drink of that type, e.g. `log shot`
///   undo               remove the latest drink of the active session
///   end                end the active session
///   tick               re-evaluate the active session now
///
/// Blank lines and `#` comments are ignored. Anything else is skipped with a
/// warning so a typo never stops the pipeline.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tokio::sync::mpsc::{Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LocalAction {
    Start,
    Log { drink_type_id: String },
    Undo,
    End,
    Tick,
}

pub fn parse_line(raw: &str) -> Option<LocalAction> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut words = line.split_whitespace();
    let keyword = words.next()?.to_ascii_lowercase();
    let arg     = words.next();
    if words.next().is_some() {
        return None;
    }

    match (keyword.as_str(), arg) {
        ("start", None) => Some(LocalAction::Start),
        ("log", Some(t)) => Some(LocalAction::Log { drink_type_id: t.to_ascii_lowercase() }),
        ("undo", None) => Some(LocalAction::Undo),
        ("end", None) => Some(LocalAction::End),
        ("tick", None) => Some(LocalAction::Tick),
        _ => None,
    }
}

/// Async pipeline task: receive raw lines, parse, forward typed actions.
pub async fn run(mut rx: Receiver<String>, tx: Sender<LocalAction>) -> Result<()> {
    while let Some(line) = rx.recv().await {
        match parse_line(&line) {
            Some(action) => {
                if tx.send(action).await.is_err() {
                    break;
                }
            }
            None if line.trim().is_empty() || line.trim_start().starts_with('#') => {}
            None => tracing::warn!("Unrecognised command: {:?}", line.trim()),
        }
    }
    Ok(())
}

/// Blocking reader loop, forwards every line of `reader` until EOF.
/// Run on its own thread; stdin reads never return on shutdown.
pub fn read_lines<R: BufRead>(reader: R, tx: Sender<String>) -> Result<()> {
    for line in reader.lines() {
        if tx.blocking_send(line?).is_err() {
            break;
        }
    }
    tracing::debug!("Command input closed");
    Ok(())
}
