use camino::Utf8PathBuf;
use thiserror::Error;

use crate::engine::State;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Problem caused by the way the build was configured, reported back to
    /// the user as-is.
    #[error("{0}")]
    UserFeedback(String),

    #[error("Filter alias can't be blank")]
    BlankAlias,

    #[error("Task '{key}' is in an unexpected state ({raw})")]
    UnexpectedState { key: String, raw: u8 },

    #[error("Task '{key}' can't transition from {from} to {to}")]
    InvalidStateTransition { key: String, from: State, to: State },

    #[error("Circular dependency detected at task '{0}'")]
    CircularDependency(String),

    #[error("Task '{0}' expected output from '{1}', but there was none")]
    MissingOutput(String, String),

    #[error("Filter '{alias}' failed on '{key}':\n{source}")]
    Filter {
        alias: String,
        key: String,
        source: anyhow::Error,
    },

    #[error("Couldn't read '{0}'.\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't save '{0}'.\n{1}")]
    Save(Utf8PathBuf, std::io::Error),

    #[error("Couldn't serialize '{0}'.\n{1}")]
    Serialize(String, serde_json::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn feedback(message: impl Into<String>) -> Self {
        Error::UserFeedback(message.into())
    }

    /// Wraps an error returned by a filter. Errors which already carry one of
    /// our own conditions are passed through untouched.
    pub(crate) fn from_filter(alias: &str, key: &str, err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(err) => err,
            Err(source) => Error::Filter {
                alias: alias.to_string(),
                key: key.to_string(),
                source,
            },
        }
    }

    /// Whether this error should be shown to the user as a configuration
    /// problem rather than a defect.
    pub fn is_user_feedback(&self) -> bool {
        matches!(self, Error::UserFeedback(_))
    }
}
