// ABOUTME: Layered configuration structs and the recursive merge contract.
// ABOUTME: Maps merge per key; scalars, options, and arrays replace wholesale.

use super::{
    BackendConfig, DatabaseConfig, DeploymentPolicy, FrontendConfig, FunctionSettings,
    MonitoringConfig, ResolvedConfig, Strategy,
};
use crate::types::Environment;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// One layer of configuration: the base file, an environment file, or
/// explicit overrides. Every field is optional; layering resolves them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigLayer {
    pub environment: Option<Environment>,
    pub stage: Option<String>,
    pub region: Option<String>,
    #[serde(default)]
    pub frontend: FrontendLayer,
    #[serde(default)]
    pub backend: BackendLayer,
    #[serde(default)]
    pub deployment: DeploymentLayer,
    #[serde(default)]
    pub monitoring: MonitoringLayer,
    #[serde(default)]
    pub database: DatabaseLayer,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontendLayer {
    pub bucket: Option<String>,
    pub cdn_distribution_id: Option<String>,
    pub cdn_domain: Option<String>,
    pub base_url: Option<String>,
    pub websocket_url: Option<String>,
    #[serde(default)]
    pub build_env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendLayer {
    pub function_name: Option<String>,
    pub gateway_id: Option<String>,
    pub gateway_stage: Option<String>,
    pub gateway_url: Option<String>,
    pub cors_origins: Option<Vec<String>>,
    #[serde(default)]
    pub function: FunctionLayer,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionLayer {
    pub memory_mb: Option<u32>,
    pub timeout_secs: Option<u32>,
    pub reserved_concurrency: Option<u32>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentLayer {
    pub strategy: Option<Strategy>,
    pub rollback_on_failure: Option<bool>,
    pub health_check_enabled: Option<bool>,
    #[serde(default, with = "humantime_serde::option")]
    pub health_check_grace: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub health_timeout: Option<Duration>,
    pub canary_percentage: Option<u8>,
    #[serde(default, with = "humantime_serde::option")]
    pub canary_duration: Option<Duration>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoringLayer {
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseLayer {
    pub backups_enabled: Option<bool>,
}

/// Take the right-hand value when present, keep the left otherwise.
fn pick<T>(left: &mut Option<T>, right: Option<T>) {
    if right.is_some() {
        *left = right;
    }
}

impl ConfigLayer {
    /// Merge `layer` on top of `self`. Right-biased: values present in
    /// `layer` win. Nested sections merge field-by-field, maps merge per
    /// key, arrays and scalars replace wholesale.
    pub fn merge(&mut self, layer: ConfigLayer) {
        pick(&mut self.environment, layer.environment);
        pick(&mut self.stage, layer.stage);
        pick(&mut self.region, layer.region);
        self.frontend.merge(layer.frontend);
        self.backend.merge(layer.backend);
        self.deployment.merge(layer.deployment);
        pick(&mut self.monitoring.enabled, layer.monitoring.enabled);
        pick(&mut self.database.backups_enabled, layer.database.backups_enabled);
    }

    /// Resolve the fully merged layer into a validated-shape config.
    /// Missing required fields are collected and returned together.
    pub fn resolve(self) -> Result<ResolvedConfig, Vec<String>> {
        let mut missing = Vec::new();

        if self.environment.is_none() {
            missing.push("required field missing: environment".to_string());
        }
        if self.stage.is_none() {
            missing.push("required field missing: stage".to_string());
        }
        if self.region.is_none() {
            missing.push("required field missing: region".to_string());
        }
        if self.frontend.bucket.is_none() {
            missing.push("required field missing: frontend.bucket".to_string());
        }
        if self.backend.function_name.is_none() {
            missing.push("required field missing: backend.function_name".to_string());
        }

        if !missing.is_empty() {
            return Err(missing);
        }

        Ok(ResolvedConfig {
            environment: self.environment.expect("checked above"),
            stage: self.stage.expect("checked above"),
            region: self.region.expect("checked above"),
            frontend: FrontendConfig {
                bucket: self.frontend.bucket.expect("checked above"),
                cdn_distribution_id: self.frontend.cdn_distribution_id,
                cdn_domain: self.frontend.cdn_domain,
                base_url: self.frontend.base_url,
                websocket_url: self.frontend.websocket_url,
                build_env: self.frontend.build_env,
            },
            backend: BackendConfig {
                function_name: self.backend.function_name.expect("checked above"),
                gateway_id: self.backend.gateway_id,
                gateway_stage: self.backend.gateway_stage,
                gateway_url: self.backend.gateway_url,
                cors_origins: self.backend.cors_origins.unwrap_or_default(),
                function: FunctionSettings {
                    memory_mb: self.backend.function.memory_mb,
                    timeout_secs: self.backend.function.timeout_secs,
                    reserved_concurrency: self.backend.function.reserved_concurrency,
                    env: self.backend.function.env,
                },
            },
            deployment: DeploymentPolicy {
                strategy: self.deployment.strategy.unwrap_or_default(),
                rollback_on_failure: self.deployment.rollback_on_failure.unwrap_or(true),
                health_check_enabled: self.deployment.health_check_enabled.unwrap_or(true),
                health_check_grace: self
                    .deployment
                    .health_check_grace
                    .unwrap_or(Duration::from_secs(30)),
                health_timeout: self
                    .deployment
                    .health_timeout
                    .unwrap_or(Duration::from_secs(120)),
                canary_percentage: self.deployment.canary_percentage,
                canary_duration: self.deployment.canary_duration,
            },
            monitoring: MonitoringConfig {
                enabled: self.monitoring.enabled.unwrap_or(false),
            },
            database: DatabaseConfig {
                backups_enabled: self.database.backups_enabled.unwrap_or(false),
            },
        })
    }
}

impl FrontendLayer {
    fn merge(&mut self, layer: FrontendLayer) {
        pick(&mut self.bucket, layer.bucket);
        pick(&mut self.cdn_distribution_id, layer.cdn_distribution_id);
        pick(&mut self.cdn_domain, layer.cdn_domain);
        pick(&mut self.base_url, layer.base_url);
        pick(&mut self.websocket_url, layer.websocket_url);
        self.build_env.extend(layer.build_env);
    }
}

impl BackendLayer {
    fn merge(&mut self, layer: BackendLayer) {
        pick(&mut self.function_name, layer.function_name);
        pick(&mut self.gateway_id, layer.gateway_id);
        pick(&mut self.gateway_stage, layer.gateway_stage);
        pick(&mut self.gateway_url, layer.gateway_url);
        // Arrays replace wholesale, never concatenate.
        pick(&mut self.cors_origins, layer.cors_origins);
        pick(&mut self.function.memory_mb, layer.function.memory_mb);
        pick(&mut self.function.timeout_secs, layer.function.timeout_secs);
        pick(
            &mut self.function.reserved_concurrency,
            layer.function.reserved_concurrency,
        );
        self.function.env.extend(layer.function.env);
    }
}

impl DeploymentLayer {
    fn merge(&mut self, layer: DeploymentLayer) {
        pick(&mut self.strategy, layer.strategy);
        pick(&mut self.rollback_on_failure, layer.rollback_on_failure);
        pick(&mut self.health_check_enabled, layer.health_check_enabled);
        pick(&mut self.health_check_grace, layer.health_check_grace);
        pick(&mut self.health_timeout, layer.health_timeout);
        pick(&mut self.canary_percentage, layer.canary_percentage);
        pick(&mut self.canary_duration, layer.canary_duration);
    }
}
