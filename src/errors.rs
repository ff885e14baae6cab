//! ## Custom Errors for Sjoin
//!
//! This module defines the errors that the join engine and the dataset layer
//! can report to callers.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Represents errors raised by the join engine.
#[derive(Debug)]
pub enum JoinError {
    /// Occurs when the configuration is rejected before any data is loaded.
    Config {
        /// Human-readable description of the rejected setting.
        message: String,
    },
    /// Occurs when a dataset file is absent, truncated, or inconsistent.
    Dataset {
        /// Path of the offending dataset file.
        path: PathBuf,
        /// Description of the inconsistency.
        message: String,
    },
    /// An underlying I/O failure (dataset streams, spill files, CSV log).
    Io(io::Error),
}

impl JoinError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        JoinError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn dataset(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        JoinError::Dataset {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Config { message } => {
                write!(f, "Invalid configuration: {message}")
            }
            JoinError::Dataset { path, message } => {
                write!(f, "Invalid dataset {}: {message}", path.display())
            }
            JoinError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl Error for JoinError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JoinError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for JoinError {
    fn from(err: io::Error) -> Self {
        JoinError::Io(err)
    }
}
