//! Structured error types for fleetctl-core.
//!
//! Uses `thiserror` for composable library errors. The binary crate
//! (fleetctl-cli) wraps these in `anyhow` at command boundaries.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fleetctl operations
#[derive(Error, Debug)]
pub enum FleetError {
    /// Transport-level failure talking to the provider
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// Error response from the provider API
    #[error("provider error {code}: {message}")]
    Api { code: String, message: String },

    /// Provider response could not be decoded
    #[error("invalid provider response: {reason}")]
    Decode { reason: String },

    /// Cluster already has live members (create refuses to reuse a name)
    #[error("cluster '{cluster}' already has {count} active instance(s)")]
    ClusterExists { cluster: String, count: usize },

    /// Cluster has no live members to act on
    #[error("no active instances for cluster '{cluster}'")]
    EmptyCluster { cluster: String },

    /// Spot requests were still unfulfilled when the polling budget ran out
    #[error("spot requests unfulfilled after {attempts} polling rounds (consider raising --price)")]
    SpotTimeout { attempts: u32 },

    /// Configuration error
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A remote ssh/scp invocation failed
    #[error("remote command failed on {host}: {reason}")]
    Remote { host: String, reason: String },

    /// Script extension not recognized by `run`
    #[error("unsupported script type {path:?}: expected a .py or .sh file")]
    ScriptKind { path: PathBuf },

    /// A required external tool is missing from PATH
    #[error("required tool '{name}' not found in PATH")]
    MissingTool { name: String },

    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Result type alias for fleetctl-core operations
pub type Result<T> = std::result::Result<T, FleetError>;

impl FleetError {
    /// Create a transport error
    pub fn transport(reason: impl ToString) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }

    /// Create a provider API error
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a remote command error
    pub fn remote(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Remote {
            host: host.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FleetError::ClusterExists {
            cluster: "exp-7".into(),
            count: 3,
        };
        assert_eq!(
            err.to_string(),
            "cluster 'exp-7' already has 3 active instance(s)"
        );

        let err = FleetError::api("InvalidAMIID.NotFound", "The image id does not exist");
        assert!(err.to_string().contains("InvalidAMIID.NotFound"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: FleetError = io_err.into();
        assert!(matches!(err, FleetError::Io { .. }));
    }
}
