//! Replay script parsing
//!
//! A script is plain text. Each line is streamed as response text unless it
//! starts with one of the directives:
//!
//! ```text
//! @task <id> <status> <title>[ | details]
//! @sleep <ms>
//! @error <message>
//! ```

use std::time::Duration;

use streamcast_core::{TaskStatus, TaskUpdate};

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("line {line}: {message}")]
    Invalid { line: usize, message: String },
}

impl ScriptError {
    fn invalid(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Invalid {
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Response text, including its trailing newline
    Text(String),
    Task(TaskUpdate),
    Sleep(Duration),
    /// Fail the response; nothing after it is replayed
    Error(String),
}

pub fn parse(script: &str) -> Result<Vec<Step>, ScriptError> {
    let mut steps = Vec::new();

    for (idx, raw) in script.split_inclusive('\n').enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim_end_matches(['\n', '\r']);

        let Some(directive) = trimmed.strip_prefix('@') else {
            steps.push(Step::Text(raw.to_string()));
            continue;
        };

        let (name, rest) = directive
            .split_once(char::is_whitespace)
            .unwrap_or((directive, ""));
        let rest = rest.trim();

        match name {
            "task" => steps.push(Step::Task(parse_task(line, rest)?)),
            "sleep" => {
                let ms = rest
                    .parse::<u64>()
                    .map_err(|_| ScriptError::invalid(line, format!("bad duration '{}'", rest)))?;
                steps.push(Step::Sleep(Duration::from_millis(ms)));
            }
            "error" => {
                if rest.is_empty() {
                    return Err(ScriptError::invalid(line, "@error needs a message"));
                }
                steps.push(Step::Error(rest.to_string()));
            }
            // Unknown directives are plain text
            _ => steps.push(Step::Text(raw.to_string())),
        }
    }

    Ok(steps)
}

fn parse_task(line: usize, rest: &str) -> Result<TaskUpdate, ScriptError> {
    let mut parts = rest.splitn(3, char::is_whitespace);
    let (Some(id), Some(status), Some(tail)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ScriptError::invalid(
            line,
            "usage: @task <id> <status> <title>[ | details]",
        ));
    };

    let status: TaskStatus = status
        .parse()
        .map_err(|e: String| ScriptError::invalid(line, e))?;

    let (title, details) = match tail.split_once('|') {
        Some((title, details)) => (title.trim(), Some(details.trim())),
        None => (tail.trim(), None),
    };
    if title.is_empty() {
        return Err(ScriptError::invalid(line, "task title is empty"));
    }

    let mut update = TaskUpdate::new(id, title, status);
    if let Some(details) = details.filter(|d| !d.is_empty()) {
        update = update.with_details(details);
    }
    Ok(update)
}

/// Split `text` into pieces of at most `size` chars
pub fn chunks(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == size {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
