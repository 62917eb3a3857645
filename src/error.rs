//! Failure taxonomy for the extraction and patch pipeline.
//!
//! Failures are ordinary return values. Nothing panics across the engine
//! boundary; the calling layer owns user-facing messaging.

use std::path::PathBuf;
use thiserror::Error;

/// Extraction could not produce a usable HTML payload.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No tier and no cleanup step located an `<html>`-rooted span.
    #[error("no valid html block found")]
    NoHtmlFound,
    /// A span was located but nothing remained once trimmed.
    #[error("extracted html is empty")]
    EmptyAfterCleanup,
}

/// Patching the target file failed.
///
/// Extraction success does not guarantee patch success; any of these aborts
/// the whole invocation.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The engine never creates target files; existence is a precondition.
    #[error("target file does not exist: {0}")]
    FileMissing(PathBuf),
    #[error("failed to read target file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write target file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Advisory lock on the target could not be acquired in time.
    #[error("failed to lock target file {path}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level failure returned by the apply facade.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Patch(#[from] PatchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_messages_are_stable() {
        assert_eq!(ExtractError::NoHtmlFound.to_string(), "no valid html block found");
        assert_eq!(
            ExtractError::EmptyAfterCleanup.to_string(),
            "extracted html is empty"
        );
    }

    #[test]
    fn test_apply_error_is_transparent() {
        let err: ApplyError = ExtractError::NoHtmlFound.into();
        assert_eq!(err.to_string(), "no valid html block found");
    }
}
