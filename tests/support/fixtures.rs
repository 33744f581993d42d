// ABOUTME: Config fixtures shared across integration tests.
// ABOUTME: Writes a realistic deploy.yaml + environments/ tree into a temp dir.

use stagehand::config::{ConfigLayer, ResolvedConfig};
use std::fs;
use std::path::Path;

pub const BASE_YAML: &str = r#"
region: eu-central-1
frontend:
  build_env:
    APP_NAME: demo
backend:
  cors_origins: ["https://app.example.com"]
deployment:
  rollback_on_failure: true
  health_check_grace: 10ms
  health_timeout: 2s
"#;

pub const STAGING_YAML: &str = r#"
environment: staging
stage: staging
frontend:
  bucket: app-assets-staging
  cdn_distribution_id: E2STAGING123
  base_url: https://staging.example.com
backend:
  function_name: app-api-staging
  gateway_id: gw123abc
  gateway_stage: staging
  gateway_url: https://api.staging.example.com
"#;

pub const DEVELOPMENT_YAML: &str = r#"
environment: development
stage: dev
frontend:
  bucket: app-assets-dev
backend:
  function_name: app-api-dev
  cors_origins: ["*"]
"#;

/// Write the standard fixture tree under `root`.
pub fn write_config_tree(root: &Path) {
    fs::write(root.join("deploy.yaml"), BASE_YAML).unwrap();
    let env_dir = root.join("environments");
    fs::create_dir_all(&env_dir).unwrap();
    fs::write(env_dir.join("staging.yaml"), STAGING_YAML).unwrap();
    fs::write(env_dir.join("development.yaml"), DEVELOPMENT_YAML).unwrap();
}

/// The resolved staging config, as the repository would produce it.
pub fn staging_config() -> ResolvedConfig {
    let mut layer: ConfigLayer = serde_yaml::from_str(BASE_YAML).unwrap();
    layer.merge(serde_yaml::from_str(STAGING_YAML).unwrap());
    layer.resolve().unwrap()
}
