//! Error taxonomy for the vault2cert pipeline.
//!
//! Every component returns [`Error`]; only `main` decides how to exit.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;
use vault2cert_jks::KeystoreError;
use vault2cert_vault::PkiError;

/// Result type alias using the vault2cert error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Exit code for a successful run
pub const EXIT_OK: i32 = 0;
/// Exit code for issuance, I/O and keystore failures
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for invalid or missing arguments
pub const EXIT_USAGE: i32 = 2;

/// Errors surfaced to the operator
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A mandatory setting resolved to an empty value
    #[error("{argument} is mandatory")]
    #[diagnostic(code(vault2cert::missing_argument))]
    MissingArgument {
        /// Human readable name of the setting
        argument: &'static str,
        /// How to provide it
        #[help]
        help: String,
    },

    /// The issuance call failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Service(#[from] PkiError),

    /// Creating, writing or renaming an output file failed
    #[error("Failed to {operation} {}", .path.display())]
    #[diagnostic(
        code(vault2cert::io),
        help("Check that the directory exists and is writable")
    )]
    Io {
        /// What was being done
        operation: &'static str,
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// PEM material from the issuance response could not be decoded
    #[error("Cannot decode {what}: {message}")]
    #[diagnostic(code(vault2cert::pem))]
    Pem {
        /// Which input was being decoded
        what: &'static str,
        /// What went wrong
        message: String,
    },

    /// Building or encoding the keystore failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Serialization(#[from] KeystoreError),
}

impl Error {
    /// Missing setting that can come from a flag or an environment variable
    #[must_use]
    pub fn missing_argument(argument: &'static str, flag: &str, env: Option<&str>) -> Self {
        let help = match env {
            Some(var) => format!("Pass --{flag} or set {var}"),
            None => format!("Pass --{flag}"),
        };
        Self::MissingArgument { argument, help }
    }

    /// I/O failure on `path`
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// PEM decoding failure
    pub fn pem(what: &'static str, message: impl Into<String>) -> Self {
        Self::Pem {
            what,
            message: message.into(),
        }
    }
}

/// Map an error to the process exit status
#[must_use]
pub const fn exit_code_for(err: &Error) -> i32 {
    match err {
        Error::MissingArgument { .. } => EXIT_USAGE,
        Error::Service(_) | Error::Io { .. } | Error::Pem { .. } | Error::Serialization(_) => {
            EXIT_FAILURE
        }
    }
}
