//! Layered configuration.
//!
//! Sources, later ones winning: built-in defaults, `dockhand.{yaml,toml,json}`
//! in the working directory (or `--config PATH`), then `DOCKHAND__*`
//! environment variables with `__` between nested keys, e.g.
//! `DOCKHAND__CONNECTION__PASSWORD`.

use config::{Config, ConfigError, Environment, File};
use dockhand_core::resource::DEFAULT_NAME_PREFIX;
use dockhand_core::{ConnectionParameters, PortBinding, ProvisionRequest, RetryPolicy};
use dockhand_docker::PullPolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Full CLI configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DockhandConfig {
    pub connection: ConnectionParameters,
    pub container: ContainerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub suite: SuiteConfig,
}

/// What to run as the ephemeral dependency.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    pub image: String,
    pub tag: String,
    /// Extra environment as `KEY=value` entries.
    #[serde(default)]
    pub env: Vec<String>,
    /// Published ports. Defaults to the connection port on the same host port.
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    #[serde(default)]
    pub pull_policy: PullPolicy,
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Variable that receives the connection password as the bootstrap
    /// administrator credential. Set to `null` to disable.
    #[serde(default = "default_admin_password_env")]
    pub admin_password_env: Option<String>,
}

fn default_name_prefix() -> String {
    DEFAULT_NAME_PREFIX.to_string()
}

fn default_admin_password_env() -> Option<String> {
    Some("ORACLE_ADMIN_PASSWORD".to_string())
}

/// Readiness polling bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_max_elapsed_secs")]
    pub max_elapsed_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: Option<u64>,
}

fn default_initial_interval_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_max_interval_ms() -> u64 {
    5_000
}

fn default_max_elapsed_secs() -> Option<u64> {
    Some(60)
}

fn default_attempt_timeout_secs() -> Option<u64> {
    Some(10)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            multiplier: default_multiplier(),
            max_interval_ms: default_max_interval_ms(),
            max_elapsed_secs: default_max_elapsed_secs(),
            max_attempts: None,
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        RetryPolicy {
            initial_interval: Duration::from_millis(cfg.initial_interval_ms),
            multiplier: cfg.multiplier,
            max_interval: Duration::from_millis(cfg.max_interval_ms),
            max_elapsed: cfg.max_elapsed_secs.map(Duration::from_secs),
            max_attempts: cfg.max_attempts,
            attempt_timeout: cfg.attempt_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// How readiness is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Tcp,
    Postgres,
}

/// The external test command.
#[derive(Debug, Clone, Deserialize)]
pub struct SuiteConfig {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub probe: ProbeKind,
    /// Variable through which the command receives the descriptor.
    #[serde(default = "default_descriptor_env")]
    pub descriptor_env: String,
}

fn default_descriptor_env() -> String {
    "DOCKHAND_DATABASE_URL".to_string()
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            probe: ProbeKind::default(),
            descriptor_env: default_descriptor_env(),
        }
    }
}

impl DockhandConfig {
    /// Load configuration from defaults, file and environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("dockhand").required(false),
        };

        Config::builder()
            .set_default("connection.scheme", "oracle")?
            .set_default("connection.host", "localhost")?
            .set_default("connection.port", 1521_i64)?
            .set_default("connection.service", "orclpdb1")?
            .set_default("connection.username", "admin")?
            .set_default("connection.password", "secret")?
            .set_default("connection.tls", true)?
            .set_default("connection.wallet_location", "")?
            .set_default("container.image", "oracle")?
            .set_default("container.tag", "19c")?
            .add_source(file)
            .add_source(
                Environment::with_prefix("DOCKHAND")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Provisioning request for the configured container.
    pub fn provision_request(&self) -> Result<ProvisionRequest, ConfigError> {
        let mut env = parse_env(&self.container.env)?;
        if let Some(key) = &self.container.admin_password_env {
            env.entry(key.clone())
                .or_insert_with(|| self.connection.password.clone());
        }

        let ports = if self.container.ports.is_empty() {
            vec![PortBinding {
                container_port: self.connection.port,
                host_port: Some(self.connection.port),
            }]
        } else {
            self.container.ports.clone()
        };

        Ok(ProvisionRequest {
            image: self.container.image.clone(),
            tag: self.container.tag.clone(),
            env,
            ports,
            name_prefix: self.container.name_prefix.clone(),
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

fn parse_env(entries: &[String]) -> Result<BTreeMap<String, String>, ConfigError> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ConfigError::Message(format!(
                "container.env entry {:?} is not KEY=value",
                entry
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn load_yaml(yaml: &str) -> DockhandConfig {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        DockhandConfig::load(Some(file.path())).unwrap()
    }

    #[test]
    fn test_defaults_match_oracle_setup() {
        let cfg = load_yaml("{}\n");

        assert_eq!(cfg.connection.host, "localhost");
        assert_eq!(cfg.connection.port, 1521);
        assert_eq!(cfg.connection.service, "orclpdb1");
        assert_eq!(cfg.connection.wallet(), None);
        assert_eq!(cfg.container.image, "oracle");
        assert_eq!(cfg.container.tag, "19c");
        assert_eq!(cfg.suite.probe, ProbeKind::Tcp);

        let request = cfg.provision_request().unwrap();
        assert_eq!(request.image_ref(), "oracle:19c");
        assert_eq!(request.env_list(), vec!["ORACLE_ADMIN_PASSWORD=secret"]);
        assert_eq!(
            request.ports,
            vec![PortBinding {
                container_port: 1521,
                host_port: Some(1521)
            }]
        );
        assert!(cfg.retry_policy().validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let cfg = load_yaml(
            r#"
connection:
  scheme: postgres
  host: 127.0.0.1
  port: 5432
  service: app
  username: postgres
  password: hunter2
container:
  image: postgres
  tag: 16-alpine
  admin_password_env: POSTGRES_PASSWORD
  env:
    - POSTGRES_DB=app
  ports:
    - container_port: 5432
  pull_policy: always
retry:
  max_attempts: 20
  max_elapsed_secs: null
suite:
  probe: postgres
  command: ["cargo", "test"]
"#,
        );

        assert_eq!(cfg.connection.scheme, "postgres");
        assert_eq!(cfg.container.pull_policy, PullPolicy::Always);
        assert_eq!(cfg.suite.probe, ProbeKind::Postgres);
        assert_eq!(cfg.suite.command, vec!["cargo", "test"]);

        let request = cfg.provision_request().unwrap();
        assert_eq!(
            request.env_list(),
            vec!["POSTGRES_DB=app", "POSTGRES_PASSWORD=hunter2"]
        );
        assert_eq!(request.ports[0].host_port, None);

        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, Some(20));
        assert_eq!(policy.max_elapsed, None);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_explicit_env_wins_over_derived_password() {
        let cfg = load_yaml(
            r#"
container:
  env:
    - ORACLE_ADMIN_PASSWORD=other
"#,
        );
        assert_eq!(
            cfg.provision_request().unwrap().env_list(),
            vec!["ORACLE_ADMIN_PASSWORD=other"]
        );
    }

    #[test]
    fn test_malformed_env_entry_is_rejected() {
        let cfg = load_yaml(
            r#"
container:
  env:
    - JUST_A_KEY
"#,
        );
        assert!(cfg.provision_request().is_err());
    }

    #[test]
    fn test_missing_required_file_is_an_error() {
        let missing = Path::new("/nonexistent/dockhand.yaml");
        assert!(DockhandConfig::load(Some(missing)).is_err());
    }
}
