use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Any filesystem failure other than a missing rule file or a missing rules directory.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid rule id '{id}': {reason}")]
    InvalidRuleId { id: String, reason: &'static str },

    #[error("invalid rule '{id}': {reason}")]
    InvalidRule { id: String, reason: &'static str },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
