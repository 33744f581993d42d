// ABOUTME: Integration tests for layered configuration loading.
// ABOUTME: File merging, env-var overrides, and validation aggregation.

mod support;

use proptest::prelude::*;
use stagehand::config::{ConfigError, ConfigLayer, ConfigRepository};
use stagehand::types::Environment;
use std::collections::HashMap;
use std::fs;

fn no_vars() -> HashMap<String, String> {
    HashMap::new()
}

mod loading {
    use super::*;

    #[test]
    fn staging_resolves_from_base_and_environment_file() {
        let dir = tempfile::tempdir().unwrap();
        support::fixtures::write_config_tree(dir.path());

        let repo = ConfigRepository::new(dir.path());
        let config = repo
            .load_with_vars(Environment::Staging, None, &no_vars())
            .unwrap();

        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.frontend.bucket, "app-assets-staging");
        // Inherited from the base layer.
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(
            config.backend.cors_origins,
            vec!["https://app.example.com".to_string()]
        );
    }

    #[test]
    fn missing_environment_file_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("deploy.yaml"), "region: eu-central-1").unwrap();

        let repo = ConfigRepository::new(dir.path());
        let err = repo
            .load_with_vars(Environment::Production, None, &no_vars())
            .unwrap_err();

        match err {
            ConfigError::NotFound(path) => {
                assert!(path.to_string_lossy().contains("production.yaml"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn explicit_overrides_outrank_files() {
        let dir = tempfile::tempdir().unwrap();
        support::fixtures::write_config_tree(dir.path());

        let overrides: ConfigLayer = serde_yaml::from_str(
            r#"
frontend:
  bucket: override-bucket-staging
"#,
        )
        .unwrap();

        let repo = ConfigRepository::new(dir.path());
        let config = repo
            .load_with_vars(Environment::Staging, Some(overrides), &no_vars())
            .unwrap();
        assert_eq!(config.frontend.bucket, "override-bucket-staging");
    }

    #[test]
    fn env_vars_outrank_explicit_overrides() {
        let dir = tempfile::tempdir().unwrap();
        support::fixtures::write_config_tree(dir.path());

        let overrides: ConfigLayer = serde_yaml::from_str("region: us-west-2").unwrap();
        let vars: HashMap<String, String> =
            [("STAGEHAND_REGION".to_string(), "ap-south-1".to_string())].into();

        let repo = ConfigRepository::new(dir.path());
        let config = repo
            .load_with_vars(Environment::Staging, Some(overrides), &vars)
            .unwrap();
        assert_eq!(config.region, "ap-south-1");
    }
}

mod validation {
    use super::*;

    #[test]
    fn missing_required_fields_are_all_reported_at_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("deploy.yaml"), "region: eu-central-1").unwrap();
        let env_dir = dir.path().join("environments");
        fs::create_dir_all(&env_dir).unwrap();
        fs::write(env_dir.join("staging.yaml"), "environment: staging").unwrap();

        let repo = ConfigRepository::new(dir.path());
        let err = repo
            .load_with_vars(Environment::Staging, None, &no_vars())
            .unwrap_err();

        match err {
            ConfigError::Validation { errors, .. } => {
                // stage, frontend.bucket, backend.function_name all missing.
                assert_eq!(errors.len(), 3, "errors: {errors:?}");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn semantic_violations_are_aggregated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("deploy.yaml"), support::fixtures::BASE_YAML).unwrap();
        let env_dir = dir.path().join("environments");
        fs::create_dir_all(&env_dir).unwrap();
        // Staging without the CDN/gateway fields it requires, plus a
        // wildcard CORS origin.
        fs::write(
            env_dir.join("staging.yaml"),
            r#"
environment: staging
stage: staging
frontend:
  bucket: app-assets-staging
backend:
  function_name: app-api-staging
  cors_origins: ["*"]
"#,
        )
        .unwrap();

        let repo = ConfigRepository::new(dir.path());
        let err = repo
            .load_with_vars(Environment::Staging, None, &no_vars())
            .unwrap_err();

        match err {
            ConfigError::Validation { errors, .. } => {
                assert!(errors.len() >= 4, "errors: {errors:?}");
                assert!(errors.iter().any(|e| e.contains("cdn_distribution_id")));
                assert!(errors.iter().any(|e| e.contains("wildcard")));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}

proptest! {
    /// Merging is right-biased field-by-field: whatever the override layer
    /// sets wins, and anything it leaves unset survives from the base.
    #[test]
    fn merge_is_right_biased(
        base_region in proptest::option::of("[a-z]{2}-[a-z]{4}-[12]"),
        override_region in proptest::option::of("[a-z]{2}-[a-z]{4}-[12]"),
        base_stage in proptest::option::of("[a-z]{3,8}"),
        override_stage in proptest::option::of("[a-z]{3,8}"),
    ) {
        let mut merged = ConfigLayer::default();
        merged.region = base_region.clone();
        merged.stage = base_stage.clone();

        let mut overlay = ConfigLayer::default();
        overlay.region = override_region.clone();
        overlay.stage = override_stage.clone();

        merged.merge(overlay);

        prop_assert_eq!(merged.region, override_region.or(base_region));
        prop_assert_eq!(merged.stage, override_stage.or(base_stage));
    }
}
