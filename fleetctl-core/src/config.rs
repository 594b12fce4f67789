//! Configuration for the fleetctl ecosystem.
//!
//! Launch defaults come from `~/.fleetctl/config.toml`; provider credentials
//! come from the environment only and are never written to disk.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

/// Region used when neither flag, environment, nor config file names one
pub const DEFAULT_REGION: &str = "us-west-2";

/// Login user for cluster members unless overridden
pub const DEFAULT_SSH_USER: &str = "ubuntu";

/// Contents written by `fleetctl config init`
pub const CONFIG_TEMPLATE: &str = r#"# fleetctl configuration
#
# Everything here is a default; command-line flags always win.
# Credentials are read from the environment (AWS_ACCESS_KEY_ID /
# AWS_SECRET_ACCESS_KEY) and never from this file.

[defaults]
# ami = "ami-0123456789abcdef0"
# instance_type = "t2.medium"
# region = "us-west-2"
# security_group = "sg-0123456789abcdef0"
# key_name = "my-keypair"
# count = 2
# identity_file = "/home/me/.ssh/my-keypair.pem"
# ssh_user = "ubuntu"
"#;

/// On-disk configuration (`~/.fleetctl/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub defaults: Defaults,
}

/// Launch and ssh defaults, all optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    pub ami: Option<String>,
    pub instance_type: Option<String>,
    pub region: Option<String>,
    pub security_group: Option<String>,
    pub key_name: Option<String>,
    pub count: Option<u32>,
    pub identity_file: Option<PathBuf>,
    pub ssh_user: Option<String>,
}

impl FleetConfig {
    /// Path of the config file: `~/.fleetctl/config.toml`
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fleetctl")
            .join("config.toml")
    }

    /// Load from the default location; a missing file yields the defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| {
            FleetError::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

/// Provider credentials resolved from the environment
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Read credentials from the process environment.
    ///
    /// Accepts the standard `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
    /// pair first and falls back to the legacy `AWS_KEY` / `AWS_SECRET_KEY`
    /// names. `AWS_SESSION_TOKEN` is honored when present.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Credentials::from_env`] with an injectable lookup (tests)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let first_set = |names: &[&str]| -> Option<String> {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let access_key_id = first_set(&["AWS_ACCESS_KEY_ID", "AWS_KEY"]).ok_or_else(|| {
            FleetError::config("no credentials: set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY")
        })?;
        let secret_access_key =
            first_set(&["AWS_SECRET_ACCESS_KEY", "AWS_SECRET_KEY"]).ok_or_else(|| {
                FleetError::config(
                    "no secret key: set AWS_SECRET_ACCESS_KEY alongside AWS_ACCESS_KEY_ID",
                )
            })?;

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: first_set(&["AWS_SESSION_TOKEN"]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = FleetConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert!(cfg.defaults.ami.is_none());
        assert!(cfg.defaults.count.is_none());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[defaults]
ami = "ami-9abea4fb"
instance_type = "t2.medium"
count = 4
ssh_user = "admin"
"#,
        )
        .unwrap();

        let cfg = FleetConfig::load_from(&path).unwrap();
        assert_eq!(cfg.defaults.ami.as_deref(), Some("ami-9abea4fb"));
        assert_eq!(cfg.defaults.count, Some(4));
        assert_eq!(cfg.defaults.ssh_user.as_deref(), Some("admin"));
        assert!(cfg.defaults.security_group.is_none());
    }

    #[test]
    fn test_template_parses() {
        let cfg: FleetConfig = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert!(cfg.defaults.ami.is_none());
    }

    #[test]
    fn test_credentials_lookup_precedence() {
        let env: HashMap<&str, &str> = [
            ("AWS_ACCESS_KEY_ID", "AKIASTANDARD"),
            ("AWS_KEY", "AKIALEGACY"),
            ("AWS_SECRET_KEY", "legacy-secret"),
        ]
        .into_iter()
        .collect();
        let creds =
            Credentials::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(creds.access_key_id, "AKIASTANDARD");
        // secret falls back to the legacy name
        assert_eq!(creds.secret_access_key, "legacy-secret");
        assert!(creds.session_token.is_none());
    }

    #[test]
    fn test_credentials_missing_is_config_error() {
        let err = Credentials::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, FleetError::Config { .. }));
        assert!(err.to_string().contains("AWS_ACCESS_KEY_ID"));
    }
}
