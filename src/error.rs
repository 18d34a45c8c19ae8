// src/error.rs

//! Error types for the bundle pipeline
//!
//! Every failure aborts the whole build. Errors raised inside a pipeline
//! stage are wrapped in [`Error::Stage`] so the caller can tell which
//! component failed; [`Error::root`] recovers the underlying cause.

use crate::pipeline::Stage;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used across the library
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The relocation map would send two different names to the same target
    #[error("ambiguous relocation: {0}")]
    AmbiguousRelocation(String),

    /// Two inputs produced the same path under the FAIL duplicate policy
    #[error("duplicate entry '{path}' contributed by {}", sources.join(", "))]
    DuplicateEntry { path: String, sources: Vec<String> },

    /// An input archive is missing, malformed or contains an unusable entry
    #[error("failed to read archive {}: {message}", path.display())]
    ArchiveRead { path: PathBuf, message: String },

    /// Producing an output file failed
    #[error("failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Relocation or isolation would break the types shared with the bootstrap tier
    #[error("shared contract violation: {0}")]
    SharedContract(String),

    /// An isolated entry would still be loadable by a standard classloader
    #[error("isolation breach: {0}")]
    IsolationBreach(String),

    /// Invalid bundle configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// A failure attributed to the pipeline stage that raised it
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an archive read error
    pub fn archive_read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ArchiveRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a write failure
    pub fn write_failure(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::WriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Attribute this error to a pipeline stage
    ///
    /// Errors that are already attributed keep their original stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage that raised this error, if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error with any stage attribution removed
    pub fn root(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}
