//! Top-level error type and exit codes.

use crate::accounts::KeystoreError;
use crate::chain::descriptor::DescriptorError;
use crate::chain::ChainError;
use crate::config::AppConfigError;
use crate::datadir::{LayoutError, LockError, MigrationError};
use crate::store::StoreError;
use std::io;
use std::path::PathBuf;

/// Exit code for invalid flags and most runtime failures
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for an unknown or incomplete command
pub const EXIT_COMMAND: i32 = 3;

/// Errors that stop the node
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Invalid flag, flag value or flag combination
    #[error("{0}")]
    Flag(String),
    /// Unknown or incomplete command; usage is shown
    #[error("{message}")]
    Command {
        /// Message
        message: String,
        /// Rendered usage
        usage: String,
    },
    /// Invalid command argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Chain descriptor rejected
    #[error(transparent)]
    ConfigValidation(#[from] DescriptorError),
    /// App config rejected
    #[error(transparent)]
    AppConfig(#[from] AppConfigError),
    /// Data directory location unknown
    #[error(transparent)]
    Layout(#[from] LayoutError),
    /// Migration failed
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// Chain directory locked by another process
    #[error(transparent)]
    Lock(#[from] LockError),
    /// Keystore failure
    #[error(transparent)]
    Keystore(#[from] KeystoreError),
    /// Chain database failure
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Other filesystem failure
    #[error("{path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },
}

impl NodeError {
    /// Unknown-command error carrying the top-level usage
    #[must_use]
    pub fn command(name: &str) -> Self {
        Self::Command {
            message: format!("Invalid command: {name:?}. Please find usage below."),
            usage: crate::cli::usage(),
        }
    }

    /// Wrap an IO error with its path
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Command { .. } => EXIT_COMMAND,
            _ => EXIT_FAILURE,
        }
    }
}

impl From<ChainError> for NodeError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Descriptor(e) => Self::ConfigValidation(e),
            other => Self::Flag(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::IdentityError;

    #[test]
    fn test_exit_codes() {
        assert_eq!(NodeError::Flag("x".into()).exit_code(), 1);
        assert_eq!(NodeError::command("x").exit_code(), 3);
        assert_eq!(
            NodeError::from(DescriptorError::NotFound(PathBuf::from("/c.json"))).exit_code(),
            1
        );
    }

    #[test]
    fn test_chain_errors_split_by_kind() {
        let flag: NodeError = ChainError::Identity(IdentityError::Empty).into();
        assert!(matches!(flag, NodeError::Flag(_)));
        let invalid: NodeError =
            ChainError::Descriptor(DescriptorError::NotFound(PathBuf::from("/c.json"))).into();
        assert!(matches!(invalid, NodeError::ConfigValidation(_)));
        assert!(invalid.to_string().contains("invalid"));
    }

    #[test]
    fn test_command_message_quotes_name() {
        let err = NodeError::command("frob");
        assert_eq!(
            err.to_string(),
            "Invalid command: \"frob\". Please find usage below."
        );
    }
}
