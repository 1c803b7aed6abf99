use camino::Utf8PathBuf;
use thiserror::Error;

/// Everything that can stop a generation run.
///
/// The variants carry data only. How a variant is reported (stderr message,
/// process exit code) is decided at the boundary, see [`crate::report`].
#[derive(Debug, Error)]
pub enum Error {
    /// A task kind other than `require`, `eval` or `template` was requested.
    /// This is a programming mistake on the caller's side.
    #[error("Invalid task type {0:?}")]
    InvalidTaskType(String),

    /// An option value was rejected, e.g. an unknown trim level.
    #[error("{0}")]
    BadArgument(String),

    #[error("Can't find require file {0}")]
    MissingRequire(String),

    #[error("Can't find template file {0}")]
    MissingTemplate(String),

    /// Inline source failed to compile or raised while running.
    #[error("Error executing source:\n{code}\n\n{message}")]
    Script { code: String, message: String },

    /// A required library was found but failed to compile or run.
    #[error("Error loading library {path}:\n{message}")]
    Library { path: Utf8PathBuf, message: String },

    /// A template was found but failed to compile or render.
    #[error("Error rendering template {path}:\n{message}")]
    Template { path: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn script(code: &str, err: &minijinja::Error) -> Self {
        Error::Script {
            code: code.to_string(),
            message: describe(err),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Flattens a MiniJinja error, including its chain of causes, into one message.
pub(crate) fn describe(err: &minijinja::Error) -> String {
    use std::error::Error as _;

    let mut message = err.to_string();
    let mut cause = err.source();

    while let Some(inner) = cause {
        message.push_str("\ncaused by: ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }

    message
}
