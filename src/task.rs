//! Units of work queued on a [`Generator`](crate::Generator).
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::error::Error;

/// Template path that stands for standard input.
pub const STDIN: &str = "-";

/// The three kinds of task a queue accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Require,
    Eval,
    Template,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Require => "require",
            TaskKind::Eval => "eval",
            TaskKind::Template => "template",
        }
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "require" => Ok(TaskKind::Require),
            "eval" => Ok(TaskKind::Eval),
            "template" => Ok(TaskKind::Template),
            other => Err(Error::InvalidTaskType(other.to_string())),
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single queued task. Tasks are immutable once created; the queue keeps
/// them in insertion order, repeats included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Task {
    /// Load a library into the shared scope.
    Require(String),
    /// Run inline source against the shared scope.
    Eval(String),
    /// Render a template file (or [`STDIN`]) against the shared scope.
    Template(String),
}

impl Task {
    pub fn new(kind: TaskKind, value: impl Into<String>) -> Self {
        let value = value.into();
        match kind {
            TaskKind::Require => Task::Require(value),
            TaskKind::Eval => Task::Eval(value),
            TaskKind::Template => Task::Template(value),
        }
    }

    /// A template task reading from standard input.
    pub fn stdin() -> Self {
        Task::Template(STDIN.to_string())
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Require(_) => TaskKind::Require,
            Task::Eval(_) => TaskKind::Eval,
            Task::Template(_) => TaskKind::Template,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Task::Require(value) | Task::Eval(value) | Task::Template(value) => value,
        }
    }
}
