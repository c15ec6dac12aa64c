//! Fatal error taxonomy for metadata extraction.
//!
//! Only conditions that make the whole record untrustworthy live here.
//! Overlay failures never surface as an `ExtractError`; they are logged and
//! absorbed at the overlay boundary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file is not an archive we know how to read.
    #[error("Unsupported or unreadable archive {path:?}: {reason}")]
    ArchiveFormat { path: PathBuf, reason: String },

    /// A member the strategy cannot work without is missing.
    #[error("Required member not found in archive: {0}")]
    MemberNotFound(String),

    #[error("Invalid member pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Read attempted after the archive handle was closed.
    #[error("Archive {0:?} is closed")]
    ArchiveClosed(PathBuf),

    /// No `<name>*/setup.py` in the extracted source tree.
    #[error("setup.py not found under {0:?}, maybe the file is not a proper source archive")]
    DescriptorNotFound(PathBuf),

    /// The build descriptor raised, timed out or produced no capture.
    #[error("Build descriptor execution failed: {0}")]
    SandboxExecution(String),

    #[error("Cannot parse dependency specifier {specifier:?}: {reason}")]
    SpecifierParse { specifier: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;

impl ExtractError {
    pub fn specifier(specifier: &str, reason: impl Into<String>) -> Self {
        ExtractError::SpecifierParse {
            specifier: specifier.to_string(),
            reason: reason.into(),
        }
    }

    /// Pipeline stage that failed, for user-facing reports.
    pub fn stage(&self) -> &'static str {
        match self {
            ExtractError::ArchiveFormat { .. }
            | ExtractError::MemberNotFound(_)
            | ExtractError::ArchiveClosed(_)
            | ExtractError::InvalidPattern(_) => "archive",
            ExtractError::DescriptorNotFound(_) | ExtractError::SandboxExecution(_) => "sandbox",
            ExtractError::SpecifierParse { .. } => "dependencies",
            ExtractError::Io(_) => "io",
        }
    }

    /// Process exit code reported by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ExtractError::ArchiveFormat { .. }
            | ExtractError::MemberNotFound(_)
            | ExtractError::ArchiveClosed(_)
            | ExtractError::InvalidPattern(_) => 2,
            ExtractError::DescriptorNotFound(_) => 3,
            ExtractError::SandboxExecution(_) => 4,
            ExtractError::SpecifierParse { .. } => 5,
            ExtractError::Io(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_not_found_has_distinct_exit_code() {
        let err = ExtractError::DescriptorNotFound(PathBuf::from("/tmp/x"));
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.stage(), "sandbox");

        let err = ExtractError::SandboxExecution("boom".into());
        assert_ne!(err.exit_code(), 3);
    }

    #[test]
    fn test_specifier_error_display() {
        let err = ExtractError::specifier("foo ?? 1", "unknown operator");
        assert_eq!(
            err.to_string(),
            "Cannot parse dependency specifier \"foo ?? 1\": unknown operator"
        );
        assert_eq!(err.stage(), "dependencies");
    }
}
