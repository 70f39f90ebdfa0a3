//! Error types for vpnctl

use std::collections::HashMap;
use std::fmt;
use std::io;
use thiserror::Error;
use tracing::warn;

use crate::container::ContainerKind;

/// Opaque error code reported by an external collaborator
/// (connector or remote transport).
///
/// vpnctl never branches on specific codes; a code only ever means
/// "something went wrong" and is turned into text by an [`ErrorDescriber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum VpnError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Another provisioning operation holds the server
    #[error("Server busy: {0}")]
    Busy(String),
    /// The request was refused before any collaborator was invoked
    #[error("{0}")]
    RejectedPrecondition(String),
    /// Remote container setup failed
    #[error("{message}")]
    RemoteSetupFailure {
        container: ContainerKind,
        code: ErrorCode,
        message: String,
    },
    /// Remote container removal failed
    #[error("{message}")]
    RemoteRemovalFailure {
        container: ContainerKind,
        code: ErrorCode,
        message: String,
    },
    /// The connector refused the connect request
    #[error("{message}")]
    ConnectorRejected { code: ErrorCode, message: String },
    /// Remote removal failed and the local config could not be updated either
    #[error("{remote}\nLocal configuration was not updated: {local}")]
    RemovalIncomplete {
        remote: Box<VpnError>,
        local: Box<VpnError>,
    },
}

impl From<serde_json::Error> for VpnError {
    fn from(error: serde_json::Error) -> Self {
        VpnError::ParseError(error.to_string())
    }
}

impl From<toml::de::Error> for VpnError {
    fn from(error: toml::de::Error) -> Self {
        VpnError::ParseError(error.to_string())
    }
}

impl From<toml::ser::Error> for VpnError {
    fn from(error: toml::ser::Error) -> Self {
        VpnError::ConfigError(error.to_string())
    }
}

impl VpnError {
    /// Opaque collaborator code carried by this error, if any
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            VpnError::RemoteSetupFailure { code, .. }
            | VpnError::RemoteRemovalFailure { code, .. }
            | VpnError::ConnectorRejected { code, .. } => Some(*code),
            VpnError::RemovalIncomplete { remote, .. } => remote.code(),
            _ => None,
        }
    }
}

pub type VpnResult<T> = Result<T, VpnError>;

/// Maps opaque collaborator codes to user-facing text
pub trait ErrorDescriber: Send + Sync {
    fn describe(&self, code: ErrorCode) -> String;
}

/// Table-driven [`ErrorDescriber`]
#[derive(Debug, Clone, Default)]
pub struct ErrorCatalog {
    messages: HashMap<u32, String>,
}

impl ErrorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from the `[errors]` table of the config file.
    ///
    /// Keys that are not decimal codes are skipped.
    pub fn from_table(table: &HashMap<String, String>) -> Self {
        let mut catalog = Self::new();
        for (key, message) in table {
            match key.trim().parse::<u32>() {
                Ok(code) => catalog.insert(ErrorCode(code), message.clone()),
                Err(_) => warn!("Ignoring error description with non-numeric key '{}'", key),
            }
        }
        catalog
    }

    pub fn insert(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.messages.insert(code.0, message.into());
    }

    pub fn with(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
        self.insert(code, message);
        self
    }
}

impl ErrorDescriber for ErrorCatalog {
    fn describe(&self, code: ErrorCode) -> String {
        self.messages
            .get(&code.0)
            .cloned()
            .unwrap_or_else(|| format!("Unknown error ({})", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookup_and_fallback() {
        let catalog = ErrorCatalog::new().with(ErrorCode(4), "SSH connection timed out");
        assert_eq!(catalog.describe(ErrorCode(4)), "SSH connection timed out");
        assert_eq!(catalog.describe(ErrorCode(77)), "Unknown error (code 77)");
    }

    #[test]
    fn test_catalog_from_table_skips_bad_keys() {
        let mut table = HashMap::new();
        table.insert("12".to_string(), "Server port already used".to_string());
        table.insert("twelve".to_string(), "ignored".to_string());

        let catalog = ErrorCatalog::from_table(&table);
        assert_eq!(catalog.describe(ErrorCode(12)), "Server port already used");
        assert_eq!(catalog.messages.len(), 1);
    }

    #[test]
    fn test_error_code_accessor() {
        let err = VpnError::ConnectorRejected {
            code: ErrorCode(3),
            message: "refused".to_string(),
        };
        assert_eq!(err.code(), Some(ErrorCode(3)));
        assert_eq!(err.to_string(), "refused");
        assert!(VpnError::NotFound("x".into()).code().is_none());
    }
}
