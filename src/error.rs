use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PortalError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("config error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Transport(String),

    #[error("HTTP {status} from {path}")]
    Status { status: u16, path: String },

    #[error("invalid JSON from {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected response: {0}")]
    Invalid(String),

    #[error("{0} is not supported")]
    NotSupported(&'static str),

    #[error("cancelled")]
    Cancelled,
}

impl PortalError {
    /// Errors that end the whole run rather than a single export branch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PortalError::Config(_) | PortalError::Auth(_) | PortalError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PortalError::Config("bad".into()).is_fatal());
        assert!(PortalError::Auth("invalid_grant".into()).is_fatal());
        assert!(PortalError::Cancelled.is_fatal());
        assert!(!PortalError::Transport("Connection failed".into()).is_fatal());
        assert!(!PortalError::Status {
            status: 500,
            path: "/xapi/portals/api/sites".into()
        }
        .is_fatal());
        assert!(!PortalError::Invalid("page has no friendlyId".into()).is_fatal());
        assert!(!PortalError::NotSupported("binary file download").is_fatal());
    }

    #[test]
    fn test_status_message_names_path() {
        let err = PortalError::Status {
            status: 404,
            path: "/xapi/portals/api/sites/abc/customcss".into(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 404 from /xapi/portals/api/sites/abc/customcss"
        );
    }
}
