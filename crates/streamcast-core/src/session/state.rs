//! Session state tracking
//!
//! Lifecycle state, task cards and the insertion-ordered board that holds them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Streaming,
    Stopped,
    Error,
}

impl SessionState {
    /// Stopped and Error accept no further operations
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Error)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Stopped => write!(f, "stopped"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Complete,
    Error,
}

impl TaskStatus {
    /// Pending and in-progress tasks are interrupted when a session fails
    pub fn is_unfinished(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "running" => Ok(TaskStatus::InProgress),
            "complete" | "done" => Ok(TaskStatus::Complete),
            "error" | "failed" => Ok(TaskStatus::Error),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// A unit of work shown as one field on the message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCard {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub details: Option<String>,
    pub output: Option<String>,
}

/// Replacement fields for a task card, last write wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub details: Option<String>,
    pub output: Option<String>,
}

impl TaskUpdate {
    pub fn new(id: impl Into<String>, title: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status,
            details: None,
            output: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

impl From<TaskUpdate> for TaskCard {
    fn from(update: TaskUpdate) -> Self {
        TaskCard {
            id: update.id,
            title: update.title,
            status: update.status,
            details: update.details,
            output: update.output,
        }
    }
}

/// Insertion-ordered task cards with upsert by id.
///
/// Cards are never removed, so the index into `cards` is stable.
#[derive(Debug, Clone, Default)]
pub struct TaskBoard {
    cards: Vec<TaskCard>,
    index: HashMap<String, usize>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new card or replace the fields of an existing one in place
    pub fn upsert(&mut self, update: TaskUpdate) {
        match self.index.get(&update.id) {
            Some(&idx) => self.cards[idx] = update.into(),
            None => {
                self.index.insert(update.id.clone(), self.cards.len());
                self.cards.push(update.into());
            }
        }
    }

    /// Mark every unfinished card as failed. Returns how many changed.
    pub fn interrupt_unfinished(&mut self, details: &str) -> usize {
        let mut count = 0;
        for card in self.cards.iter_mut().filter(|c| c.status.is_unfinished()) {
            card.status = TaskStatus::Error;
            card.details = Some(details.to_string());
            count += 1;
        }
        count
    }

    pub fn get(&self, id: &str) -> Option<&TaskCard> {
        self.index.get(id).map(|&idx| &self.cards[idx])
    }

    pub fn cards(&self) -> &[TaskCard] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}
