// ABOUTME: Typed deployment configuration and the layered repository.
// ABOUTME: Loads base + environment files, merges, applies env overrides, validates.

mod env;
mod error;
pub mod layer;
mod validate;

pub use env::{apply_overrides, ENV_OVERRIDES};
pub use error::ConfigError;
pub use layer::ConfigLayer;
pub use validate::{validate, ValidationReport};

use crate::types::Environment;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const BASE_CONFIG_FILENAME: &str = "deploy.yaml";
pub const ENVIRONMENTS_DIR: &str = "environments";

/// Fully resolved configuration for one deployment attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub environment: Environment,
    pub stage: String,
    pub region: String,
    pub frontend: FrontendConfig,
    pub backend: BackendConfig,
    pub deployment: DeploymentPolicy,
    pub monitoring: MonitoringConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub bucket: String,
    pub cdn_distribution_id: Option<String>,
    pub cdn_domain: Option<String>,
    pub base_url: Option<String>,
    pub websocket_url: Option<String>,
    pub build_env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub function_name: String,
    pub gateway_id: Option<String>,
    pub gateway_stage: Option<String>,
    pub gateway_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub function: FunctionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSettings {
    pub memory_mb: Option<u32>,
    pub timeout_secs: Option<u32>,
    pub reserved_concurrency: Option<u32>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPolicy {
    pub strategy: Strategy,
    pub rollback_on_failure: bool,
    pub health_check_enabled: bool,
    #[serde(with = "humantime_serde")]
    pub health_check_grace: Duration,
    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,
    pub canary_percentage: Option<u8>,
    #[serde(default, with = "humantime_serde::option")]
    pub canary_duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    AllAtOnce,
    Rolling,
    BlueGreen,
    Canary,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-at-once" => Ok(Strategy::AllAtOnce),
            "rolling" => Ok(Strategy::Rolling),
            "blue-green" => Ok(Strategy::BlueGreen),
            "canary" => Ok(Strategy::Canary),
            other => Err(format!("invalid deployment strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backups_enabled: bool,
}

/// Key substrings whose values get redacted before persistence.
const SENSITIVE_KEY_PARTS: [&str; 5] = ["api_key", "secret", "password", "token", "credential"];

impl ResolvedConfig {
    /// JSON snapshot of this config with secret-bearing values redacted.
    /// This is what gets persisted on the deployment record.
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).expect("config serializes");
        redact(&mut value);
        value
    }

    /// Short stable hash of the sanitized config, used for success-pattern
    /// keys and cheap change detection across runs.
    pub fn fingerprint(&self) -> String {
        let canonical =
            serde_json::to_string(&self.sanitized()).expect("sanitized config serializes");
        let digest = Sha256::digest(canonical.as_bytes());
        digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
    }
}

fn redact(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                let lowered = key.to_lowercase();
                if SENSITIVE_KEY_PARTS.iter().any(|part| lowered.contains(part)) {
                    *entry = serde_json::Value::String("***redacted***".to_string());
                } else {
                    redact(entry);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                redact(item);
            }
        }
        _ => {}
    }
}

/// One field-level difference between two configuration snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDiff {
    pub path: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

/// Recursive path-wise diff of two sanitized configs. Objects recurse;
/// arrays and scalars compare as whole values.
pub fn diff(before: &serde_json::Value, after: &serde_json::Value) -> Vec<ConfigDiff> {
    let mut out = Vec::new();
    diff_inner(before, after, "", &mut out);
    out
}

fn diff_inner(
    before: &serde_json::Value,
    after: &serde_json::Value,
    path: &str,
    out: &mut Vec<ConfigDiff>,
) {
    match (before, after) {
        (serde_json::Value::Object(a), serde_json::Value::Object(b)) => {
            let keys: std::collections::BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let null = serde_json::Value::Null;
                diff_inner(
                    a.get(key).unwrap_or(&null),
                    b.get(key).unwrap_or(&null),
                    &child,
                    out,
                );
            }
        }
        (a, b) => {
            if a != b {
                out.push(ConfigDiff {
                    path: path.to_string(),
                    before: a.clone(),
                    after: b.clone(),
                });
            }
        }
    }
}

/// Loads and resolves layered configuration from a directory:
/// `deploy.yaml`, then `environments/{env}.yaml`, then explicit overrides,
/// then process environment variables.
#[derive(Debug, Clone)]
pub struct ConfigRepository {
    root: PathBuf,
}

impl ConfigRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the configuration for an environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` / `ConfigError::Yaml` for file
    /// problems and `ConfigError::Validation` with every violation when
    /// the merged result is invalid.
    pub fn load(
        &self,
        environment: Environment,
        overrides: Option<ConfigLayer>,
    ) -> Result<ResolvedConfig, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        self.load_with_vars(environment, overrides, &vars)
    }

    /// Same as [`load`](Self::load) but with an explicit variable map,
    /// so callers and tests control the override source.
    pub fn load_with_vars(
        &self,
        environment: Environment,
        overrides: Option<ConfigLayer>,
        vars: &HashMap<String, String>,
    ) -> Result<ResolvedConfig, ConfigError> {
        let mut layer = self.load_layer(Path::new(BASE_CONFIG_FILENAME))?;

        let env_file = PathBuf::from(ENVIRONMENTS_DIR).join(format!("{environment}.yaml"));
        layer.merge(self.load_layer(&env_file)?);

        if let Some(overrides) = overrides {
            layer.merge(overrides);
        }

        apply_overrides(&mut layer, vars);

        let resolved = layer.resolve().map_err(|errors| ConfigError::Validation {
            errors,
            warnings: Vec::new(),
        })?;

        let report = validate(&resolved, environment);
        for warning in &report.warnings {
            tracing::warn!(environment = %environment, "config warning: {warning}");
        }
        if !report.is_valid() {
            return Err(ConfigError::Validation {
                errors: report.errors,
                warnings: report.warnings,
            });
        }

        tracing::debug!(environment = %environment, "configuration loaded");
        Ok(resolved)
    }

    fn load_layer(&self, relative: &Path) -> Result<ConfigLayer, ConfigError> {
        let path = self.root.join(relative);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let contents = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml { path, source })
    }
}
