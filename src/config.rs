//! Provider configuration.
//!
//! [`ProviderConfig`] is loaded from `config/config.toml` (section `[clickhouse]`) with
//! environment overrides using the `CLICKGUARD__` prefix, e.g.
//! `CLICKGUARD__CLICKHOUSE__CLUSTER=main`. It is built once at startup and shared by
//! reference; nothing in the core mutates it afterwards.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::sql_helper::SqlHelper;

/// What the dependency sorter does when operations form a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    /// Append the unsorted remainder in original order and log a warning.
    #[default]
    PreserveOrder,
    /// Fail the whole migration.
    Fail,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    #[serde(default = "default_statement_terminator")]
    pub statement_terminator: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default = "default_replication_path")]
    pub replication_path: String,
    #[serde(default = "default_replica_name")]
    pub replica_name: String,
    #[serde(default = "default_history_table")]
    pub history_table: String,
    #[serde(default = "default_decimal_precision")]
    pub default_decimal_precision: u8,
    #[serde(default = "default_decimal_scale")]
    pub default_decimal_scale: u8,
    #[serde(default = "default_datetime_precision")]
    pub default_datetime_precision: u8,
    #[serde(default)]
    pub default_timezone: Option<String>,
    #[serde(default)]
    pub cycle_policy: CyclePolicy,
}

fn default_statement_terminator() -> String {
    ";".to_string()
}

fn default_replication_path() -> String {
    "/clickhouse/tables/{shard}/{database}/{table}".to_string()
}

fn default_replica_name() -> String {
    "{replica}".to_string()
}

fn default_history_table() -> String {
    "__migrations_history".to_string()
}

fn default_decimal_precision() -> u8 {
    18
}

fn default_decimal_scale() -> u8 {
    4
}

fn default_datetime_precision() -> u8 {
    3
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            statement_terminator: default_statement_terminator(),
            database: None,
            cluster: None,
            replication_path: default_replication_path(),
            replica_name: default_replica_name(),
            history_table: default_history_table(),
            default_decimal_precision: default_decimal_precision(),
            default_decimal_scale: default_decimal_scale(),
            default_datetime_precision: default_datetime_precision(),
            default_timezone: None,
            cycle_policy: CyclePolicy::default(),
        }
    }
}

impl ProviderConfig {
    /// Load the provider configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/config.toml").required(false))
            .add_source(Environment::with_prefix("CLICKGUARD").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An unreadable file is not fatal; env vars alone may be enough.
                if std::path::Path::new("config/config.toml").exists() {
                    log::warn!(
                        "Failed to load config file, falling back to env. Error: {}",
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix("CLICKGUARD").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        // A missing [clickhouse] section means every default applies.
        match settings.get::<ProviderConfig>("clickhouse") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(ProviderConfig::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "ClickHouse provider configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    /// SQL helper bound to this configuration's statement terminator.
    pub fn sql_helper(&self) -> SqlHelper {
        SqlHelper::new(self.statement_terminator.clone())
    }
}
