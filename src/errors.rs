//! Chainsmith Error Types
//!
//! Every fallible operation in the chain builder returns [`ChainError`]. The
//! variants map one-to-one onto the failure classes an operator cares about:
//! key material could not be created, a certificate could not be signed, a file
//! could not be written, a registry entry does not exist, or a revocation only
//! got part of the way through.
//!
//! Messages never include private key bytes.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::registry::RevocationState;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, ChainError>;

/// Main chainsmith error type
#[derive(Debug, Error)]
pub enum ChainError {
    /// Key pair or certificate material could not be created
    #[error("Generation error: {0}")]
    Generation(String),

    /// Issuer key/certificate missing, mismatched, expired, or signing failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// A certificate or key file could not be written, removed or re-read
    #[error("Persistence error for {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A persisted PEM file could not be decoded
    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: openssl::error::ErrorStack,
    },

    /// A certificate's extensions could not be parsed
    #[error("Failed to inspect certificate: {0}")]
    Inspect(String),

    /// Revoke target is not present in the registry
    #[error("certificate '{0}' not found")]
    NotFound(String),

    /// Revocation deleted some but not all artifacts
    #[error("Revocation of '{name}' stopped after {state}: {source}")]
    PartialRevocation {
        name: String,
        state: RevocationState,
        #[source]
        source: io::Error,
    },

    /// Configuration unreadable or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChainError {
    pub(crate) fn generation(what: &str, err: impl fmt::Display) -> Self {
        ChainError::Generation(format!("{}: {}", what, err))
    }

    pub(crate) fn signing(what: &str, err: impl fmt::Display) -> Self {
        ChainError::Signing(format!("{}: {}", what, err))
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ChainError::Persistence {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, source: openssl::error::ErrorStack) -> Self {
        ChainError::Decode {
            path: path.into(),
            source,
        }
    }
}
