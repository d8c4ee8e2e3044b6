//! YAML plan file support.
//!
//! A plan file is an alternative to setting every environment variable by
//! hand. Every field is optional; anything left out falls back to the
//! built-in defaults, and environment variables override the file (see
//! [`Config::from_yaml_with_env_overrides`](crate::config::Config::from_yaml_with_env_overrides)).
//!
//! ```yaml
//! version: "1.0"
//! target:
//!   url: "http://localhost:8080/transaction"
//!   timeout: "30s"
//! load:
//!   vus: 15000
//!   launch:
//!     policy: ramp
//!     duration: "5s"
//! transaction:
//!   walletId: "a97de01f-caea-40be-ba2b-4d39e75fbb1d"
//!   userIds: ["f333ce48-6877-4967-9b12-7e62c3f9acc3"]
//!   amount: 1
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration as StdDuration;
use thiserror::Error;

use crate::launch_policy::LaunchPolicy;

/// Plan file versions this build understands.
pub const SUPPORTED_VERSIONS: [&str; 1] = ["1.0"];

/// Errors that can occur when loading or parsing a plan file.
#[derive(Error, Debug)]
pub enum YamlConfigError {
    #[error("Failed to read plan file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid plan file: {0}")]
    Validation(String),
}

/// Duration format for YAML (e.g., 30, "500ms", "30s", "5m").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YamlDuration {
    Seconds(u64),
    String(String),
}

impl YamlDuration {
    pub fn to_std_duration(&self) -> Result<StdDuration, YamlConfigError> {
        match self {
            YamlDuration::Seconds(s) => Ok(StdDuration::from_secs(*s)),
            YamlDuration::String(s) => crate::utils::parse_duration_string(s).map_err(|e| {
                YamlConfigError::Validation(format!("Invalid duration '{}': {}", s, e))
            }),
        }
    }
}

/// Where and how to send requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlTarget {
    pub url: Option<String>,
    pub timeout: Option<YamlDuration>,
    pub connect_timeout: Option<YamlDuration>,
    pub skip_tls_verify: Option<bool>,
    pub resolve_target_addr: Option<String>,
    pub custom_headers: Option<String>,
}

/// Launch policy in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum YamlLaunch {
    Burst,
    Ramp { duration: YamlDuration },
}

impl YamlLaunch {
    pub fn to_launch_policy(&self) -> Result<LaunchPolicy, YamlConfigError> {
        match self {
            YamlLaunch::Burst => Ok(LaunchPolicy::Burst),
            YamlLaunch::Ramp { duration } => Ok(LaunchPolicy::Ramp {
                duration: duration.to_std_duration()?,
            }),
        }
    }
}

/// How many virtual users and how they arrive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlLoad {
    pub vus: Option<usize>,
    pub iterations: Option<usize>,
    pub launch: Option<YamlLaunch>,
    pub deadline: Option<YamlDuration>,
    pub seed: Option<u64>,
}

/// The transaction body fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YamlTransaction {
    pub wallet_id: Option<String>,
    pub user_ids: Option<Vec<String>>,
    pub amount: Option<i64>,
}

/// Root plan file structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YamlConfig {
    pub version: String,

    pub name: Option<String>,

    #[serde(default)]
    pub target: YamlTarget,

    #[serde(default)]
    pub load: YamlLoad,

    #[serde(default)]
    pub transaction: YamlTransaction,
}

impl YamlConfig {
    /// Load a plan from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, YamlConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a plan from a YAML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, YamlConfigError> {
        let config: YamlConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Collects every problem in the file into one error.
    fn validate(&self) -> Result<(), YamlConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            errors.push(format!(
                "version: unsupported version '{}', expected one of {:?}",
                self.version, SUPPORTED_VERSIONS
            ));
        }

        if let Some(url) = &self.target.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!(
                    "target.url: '{}' must start with http:// or https://",
                    url
                ));
            }
        }

        for (field, duration) in [
            ("target.timeout", &self.target.timeout),
            ("target.connectTimeout", &self.target.connect_timeout),
            ("load.deadline", &self.load.deadline),
        ] {
            if let Some(Err(e)) = duration.as_ref().map(YamlDuration::to_std_duration) {
                errors.push(format!("{}: {}", field, e));
            }
        }

        if let Some(Err(e)) = self.load.launch.as_ref().map(YamlLaunch::to_launch_policy) {
            errors.push(format!("load.launch: {}", e));
        }

        if self.load.vus == Some(0) {
            errors.push("load.vus: must be greater than 0".to_string());
        }
        if self.load.iterations == Some(0) {
            errors.push("load.iterations: must be greater than 0".to_string());
        }

        if let Some(user_ids) = &self.transaction.user_ids {
            if user_ids.is_empty() {
                errors.push("transaction.userIds: must not be empty".to_string());
            }
            if let Some(pos) = user_ids.iter().position(|id| id.trim().is_empty()) {
                errors.push(format!("transaction.userIds[{}]: must not be blank", pos));
            }
        }

        if self
            .transaction
            .wallet_id
            .as_deref()
            .is_some_and(|w| w.trim().is_empty())
        {
            errors.push("transaction.walletId: must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(YamlConfigError::Validation(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config = YamlConfig::from_str("version: \"1.0\"\n").unwrap();
        assert_eq!(config.target, YamlTarget::default());
        assert_eq!(config.load, YamlLoad::default());
        assert_eq!(config.transaction, YamlTransaction::default());
    }

    #[test]
    fn parses_full_file() {
        let yaml = r#"
version: "1.0"
name: "flash sale"
target:
  url: "https://shop.example.com/transaction"
  timeout: "10s"
  connectTimeout: 2
  skipTlsVerify: true
load:
  vus: 200
  iterations: 2
  launch:
    policy: ramp
    duration: "500ms"
  deadline: "1m"
  seed: 42
transaction:
  walletId: "wallet-1"
  userIds: ["a", "b"]
  amount: 5
"#;
        let config = YamlConfig::from_str(yaml).unwrap();
        assert_eq!(
            config.target.url.as_deref(),
            Some("https://shop.example.com/transaction")
        );
        assert_eq!(
            config.target.connect_timeout,
            Some(YamlDuration::Seconds(2))
        );
        assert_eq!(config.load.vus, Some(200));
        assert_eq!(
            config
                .load
                .launch
                .as_ref()
                .unwrap()
                .to_launch_policy()
                .unwrap(),
            LaunchPolicy::Ramp {
                duration: StdDuration::from_millis(500)
            }
        );
        assert_eq!(config.load.seed, Some(42));
        assert_eq!(config.transaction.user_ids.as_ref().unwrap().len(), 2);
        assert_eq!(config.transaction.amount, Some(5));
    }

    #[test]
    fn burst_policy_parses() {
        let yaml = "version: \"1.0\"\nload:\n  launch:\n    policy: burst\n";
        let config = YamlConfig::from_str(yaml).unwrap();
        assert_eq!(config.load.launch, Some(YamlLaunch::Burst));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = YamlConfig::from_str("version: \"2.0\"\n").unwrap_err();
        assert!(err.to_string().contains("unsupported version"));
    }

    #[test]
    fn collects_multiple_errors() {
        let yaml = r#"
version: "1.0"
target:
  url: "ftp://nope"
load:
  vus: 0
transaction:
  userIds: []
"#;
        let err = YamlConfig::from_str(yaml).unwrap_err().to_string();
        assert!(err.contains("target.url"), "{}", err);
        assert!(err.contains("load.vus"), "{}", err);
        assert!(err.contains("transaction.userIds"), "{}", err);
    }

    #[test]
    fn rejects_bad_duration() {
        let yaml = "version: \"1.0\"\ntarget:\n  timeout: \"ten seconds\"\n";
        let err = YamlConfig::from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("target.timeout"));
    }

    #[test]
    fn rejects_overflowing_duration() {
        let yaml = "version: \"1.0\"\nload:\n  deadline: \"999999999999999999d\"\n";
        let err = YamlConfig::from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("too large"), "{}", err);
    }

    #[test]
    fn malformed_yaml_is_parse_error() {
        let err = YamlConfig::from_str("version: [unclosed").unwrap_err();
        assert!(matches!(err, YamlConfigError::YamlParse(_)));
    }
}
