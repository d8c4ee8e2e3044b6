use std::env;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::Duration;

use crate::client::ClientConfig;
use crate::launch_policy::LaunchPolicy;
use crate::metrics::{validate_metric_namespace, DEFAULT_METRIC_NAMESPACE};
use crate::plan::{PlanError, TestPlan};
use crate::utils::{parse_duration_string, split_escaped_list};
use crate::yaml_config::{YamlConfig, YamlConfigError};

/// Errors raised while assembling the configuration. All are fatal: nothing
/// is scheduled when configuration fails.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'. {message}")]
    InvalidValue {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("{0} must be set when {1}")]
    MissingValue(&'static str, &'static str),

    #[error(transparent)]
    PlanFile(#[from] YamlConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Main configuration for a run.
#[derive(Debug, Clone)]
pub struct Config {
    pub plan: TestPlan,
    pub client: ClientConfig,
    /// Serve live Prometheus metrics on this port while the run is going
    pub metrics_port: Option<u16>,
    pub metric_namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plan: TestPlan::default(),
            client: ClientConfig::default(),
            metrics_port: None,
            metric_namespace: DEFAULT_METRIC_NAMESPACE.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// When `PLAN_FILE` is set, the YAML file is loaded first and environment
    /// variables override it. Precedence: env > yaml > defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env_var("PLAN_FILE") {
            Some(path) => {
                let yaml = YamlConfig::from_file(&path)?;
                Self::from_yaml_with_env_overrides(&yaml)
            }
            None => {
                let mut config = Self::default();
                config.apply_env_overrides()?;
                config.plan.validate()?;
                Ok(config)
            }
        }
    }

    /// Builds configuration from a parsed plan file, then applies env overrides.
    pub fn from_yaml_with_env_overrides(yaml: &YamlConfig) -> Result<Self, ConfigError> {
        let mut config = Self::from_yaml(yaml)?;
        config.apply_env_overrides()?;
        config.plan.validate()?;
        Ok(config)
    }

    fn from_yaml(yaml: &YamlConfig) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let plan = &mut config.plan;
        let client = &mut config.client;

        if let Some(url) = &yaml.target.url {
            plan.target_url = url.clone();
        }
        if let Some(timeout) = &yaml.target.timeout {
            client.request_timeout = timeout.to_std_duration()?;
        }
        if let Some(timeout) = &yaml.target.connect_timeout {
            client.connect_timeout = timeout.to_std_duration()?;
        }
        if let Some(skip) = yaml.target.skip_tls_verify {
            client.skip_tls_verify = skip;
        }
        client.resolve_target_addr = yaml.target.resolve_target_addr.clone();
        client.custom_headers = yaml.target.custom_headers.clone();

        if let Some(vus) = yaml.load.vus {
            plan.vu_count = vus;
        }
        if let Some(iterations) = yaml.load.iterations {
            plan.iterations_per_vu = iterations;
        }
        if let Some(launch) = &yaml.load.launch {
            plan.launch_policy = launch.to_launch_policy()?;
        }
        if let Some(deadline) = &yaml.load.deadline {
            plan.launch_deadline = Some(deadline.to_std_duration()?);
        }
        plan.seed = yaml.load.seed;

        if let Some(wallet_id) = &yaml.transaction.wallet_id {
            plan.wallet_id = wallet_id.clone();
        }
        if let Some(user_ids) = &yaml.transaction.user_ids {
            plan.user_ids = user_ids.clone();
        }
        if let Some(amount) = yaml.transaction.amount {
            plan.amount = amount;
        }

        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let plan = &mut self.plan;
        let client = &mut self.client;

        if let Some(url) = env_var("TARGET_URL") {
            plan.target_url = url;
        }
        if let Some(vus) = parse_env("NUM_VUS")? {
            plan.vu_count = vus;
        }
        if let Some(iterations) = parse_env("ITERATIONS_PER_VU")? {
            plan.iterations_per_vu = iterations;
        }
        if let Some(user_ids) = env_var("USER_IDS") {
            plan.user_ids = split_escaped_list(&user_ids)
                .into_iter()
                .map(|id| id.trim().to_string())
                .collect();
        }
        if let Some(wallet_id) = env_var("WALLET_ID") {
            plan.wallet_id = wallet_id;
        }
        if let Some(amount) = parse_env("AMOUNT")? {
            plan.amount = amount;
        }
        plan.launch_policy = Self::parse_launch_policy(plan.launch_policy)?;
        if let Some(deadline) = parse_duration_env("LAUNCH_DEADLINE")? {
            plan.launch_deadline = Some(deadline);
        }
        if let Some(seed) = parse_env("RANDOM_SEED")? {
            plan.seed = Some(seed);
        }

        if let Some(timeout) = parse_duration_env("REQUEST_TIMEOUT")? {
            client.request_timeout = timeout;
        }
        if let Some(timeout) = parse_duration_env("CONNECT_TIMEOUT")? {
            client.connect_timeout = timeout;
        }
        if let Some(skip) = parse_bool_env("SKIP_TLS_VERIFY")? {
            client.skip_tls_verify = skip;
        }
        if let Some(resolve) = env_var("RESOLVE_TARGET_ADDR") {
            client.resolve_target_addr = Some(resolve);
        }
        if let Some(headers) = env_var("CUSTOM_HEADERS") {
            client.custom_headers = Some(headers);
        }

        if let Some(port) = parse_env("METRICS_PORT")? {
            self.metrics_port = Some(port);
        }
        if let Some(namespace) = env_var("METRIC_NAMESPACE") {
            let namespace = namespace.trim().to_string();
            validate_metric_namespace(&namespace).map_err(|message| {
                ConfigError::InvalidValue {
                    var: "METRIC_NAMESPACE",
                    value: namespace.clone(),
                    message,
                }
            })?;
            self.metric_namespace = namespace;
        }

        Ok(())
    }

    fn parse_launch_policy(current: LaunchPolicy) -> Result<LaunchPolicy, ConfigError> {
        let ramp_duration = parse_duration_env("RAMP_DURATION")?;

        let ramp_ignored = || ConfigError::InvalidValue {
            var: "RAMP_DURATION",
            value: env_var("RAMP_DURATION").unwrap_or_default(),
            message: "Only used with LAUNCH_POLICY=ramp; the launch policy is burst.".to_string(),
        };

        match env_var("LAUNCH_POLICY").map(|p| p.to_lowercase()) {
            Some(policy) if policy == "burst" => match ramp_duration {
                Some(_) => Err(ramp_ignored()),
                None => Ok(LaunchPolicy::Burst),
            },
            Some(policy) if policy == "ramp" => {
                let duration = match (ramp_duration, current) {
                    (Some(d), _) => d,
                    (None, LaunchPolicy::Ramp { duration }) => duration,
                    (None, LaunchPolicy::Burst) => {
                        return Err(ConfigError::MissingValue(
                            "RAMP_DURATION",
                            "LAUNCH_POLICY=ramp",
                        ))
                    }
                };
                Ok(LaunchPolicy::Ramp { duration })
            }
            Some(policy) => Err(ConfigError::InvalidValue {
                var: "LAUNCH_POLICY",
                value: policy,
                message: "Expected 'burst' or 'ramp'.".to_string(),
            }),
            None => match (ramp_duration, current) {
                (Some(duration), LaunchPolicy::Ramp { .. }) => Ok(LaunchPolicy::Ramp { duration }),
                (Some(_), LaunchPolicy::Burst) => Err(ramp_ignored()),
                (None, current) => Ok(current),
            },
        }
    }

    /// Prints the configuration summary.
    pub fn print_summary(&self) {
        let plan = &self.plan;
        println!("Starting flash-sale load test:");
        println!("  Target URL: {}", plan.target_url);
        println!("  Virtual users: {}", plan.vu_count);
        println!("  Iterations per VU: {}", plan.iterations_per_vu);
        println!("  Launch policy: {:?}", plan.launch_policy);
        match plan.launch_deadline {
            Some(deadline) => println!("  Launch deadline: {:?}", deadline),
            None => println!("  Launch deadline: none"),
        }
        println!("  Wallet ID: {}", plan.wallet_id);
        println!("  User IDs: {} candidates", plan.user_ids.len());
        println!("  Amount: {}", plan.amount);
        println!("  Request timeout: {:?}", self.client.request_timeout);
        println!("  Connect timeout: {:?}", self.client.connect_timeout);
        println!("  Skip TLS Verify: {}", self.client.skip_tls_verify);
        match self.metrics_port {
            Some(port) => println!("  Metrics endpoint: 0.0.0.0:{}/metrics", port),
            None => println!("  Metrics endpoint: disabled (METRICS_PORT not set)"),
        }
    }
}

/// Reads a variable, treating unset and blank the same.
fn env_var(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    var: name,
                    value: value.clone(),
                    message: e.to_string(),
                })
        })
        .transpose()
}

fn parse_bool_env(name: &'static str) -> Result<Option<bool>, ConfigError> {
    env_var(name)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var: name,
                value: value.clone(),
                message: "Expected true or false.".to_string(),
            }),
        })
        .transpose()
}

fn parse_duration_env(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    env_var(name)
        .map(|value| {
            parse_duration_string(&value).map_err(|message| ConfigError::InvalidValue {
                var: name,
                value: value.clone(),
                message,
            })
        })
        .transpose()
}
