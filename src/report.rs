//! Turning errors into messages and exit codes.
//!
//! Library callers get every [`Error`] back unchanged. When running as a
//! command, the same errors are printed to stderr and the process exits with
//! the code from the table below. Scripts depend on these numbers, so they
//! never change:
//!
//! | status            | code |
//! |-------------------|------|
//! | `Success`         | 0    |
//! | `HelpRequested`   | 1    |
//! | `BadArgument`     | 2    |
//! | `MissingRequire`  | 3    |
//! | `MissingTemplate` | 4    |
//! | `ScriptError`     | 5    |
//! | `Io`              | 6    |
//! | `Internal`        | 70   |

use std::process::ExitCode;

use console::style;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Normal completion, also used for informational exits like `--version`.
    Success,
    HelpRequested,
    BadArgument,
    MissingRequire,
    MissingTemplate,
    /// Inline source, a library or a template failed while running.
    ScriptError,
    Io,
    /// Misuse of the library API, never caused by user input.
    Internal,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::HelpRequested => 1,
            ExitStatus::BadArgument => 2,
            ExitStatus::MissingRequire => 3,
            ExitStatus::MissingTemplate => 4,
            ExitStatus::ScriptError => 5,
            ExitStatus::Io => 6,
            ExitStatus::Internal => 70,
        }
    }

    /// The status a command exits with for `err`.
    pub fn of(err: &Error) -> Self {
        match err {
            Error::InvalidTaskType(_) => ExitStatus::Internal,
            Error::BadArgument(_) => ExitStatus::BadArgument,
            Error::MissingRequire(_) => ExitStatus::MissingRequire,
            Error::MissingTemplate(_) => ExitStatus::MissingTemplate,
            Error::Script { .. } | Error::Library { .. } | Error::Template { .. } => {
                ExitStatus::ScriptError
            }
            Error::Io { .. } => ExitStatus::Io,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/// Writes `err` to stderr and returns the status to exit with.
pub fn report(err: &Error) -> ExitStatus {
    let status = ExitStatus::of(err);
    tracing::debug!(code = status.code(), "reporting error");
    eprintln!("{}", style(err).for_stderr().red());
    status
}

/// Passes `result` through in library mode. In command mode an error is
/// reported and the process exits with its status.
pub fn settle<T>(result: Result<T, Error>, command_mode: bool) -> Result<T, Error> {
    match result {
        Err(err) if command_mode => {
            let status = report(&err);
            std::process::exit(i32::from(status.code()))
        }
        other => other,
    }
}
