// ABOUTME: Semantic validation of a resolved configuration.
// ABOUTME: Batches every violation into one report; warnings never block.

use super::{ResolvedConfig, Strategy};
use crate::types::Environment;
use std::time::Duration;

/// Outcome of a validation pass. Errors block the load; warnings are
/// surfaced but never fatal.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Validate a resolved configuration for the requested environment.
/// Runs every check; nothing fails fast.
pub fn validate(config: &ResolvedConfig, requested: Environment) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.environment != requested {
        report.error(format!(
            "environment mismatch: config says {}, but loading {}",
            config.environment, requested
        ));
    }

    check_resource_names(config, &mut report);
    check_required_for_environment(config, requested, &mut report);
    check_urls(config, requested, &mut report);
    check_security(config, requested, &mut report);
    check_function_limits(config, &mut report);
    check_strategy(config, &mut report);

    report
}

fn check_required_for_environment(
    config: &ResolvedConfig,
    env: Environment,
    report: &mut ValidationReport,
) {
    if env != Environment::Development {
        if config.frontend.cdn_distribution_id.is_none() {
            report.error("required field missing: frontend.cdn_distribution_id");
        }
        if config.backend.gateway_id.is_none() {
            report.error("required field missing: backend.gateway_id");
        }
        if config.backend.gateway_stage.is_none() {
            report.error("required field missing: backend.gateway_stage");
        }
    } else if config.frontend.cdn_distribution_id.is_some() {
        report.warn("CDN distribution configured for development environment");
    }

    if env == Environment::Production {
        if !config.monitoring.enabled {
            report.error("monitoring must be enabled for production");
        }
        if !config.database.backups_enabled {
            report.error("database backups must be enabled for production");
        }
        if !config.deployment.rollback_on_failure {
            report.warn("auto-rollback should be enabled for production");
        }
    }
}

fn check_resource_names(config: &ResolvedConfig, report: &mut ValidationReport) {
    let bucket = &config.frontend.bucket;
    if bucket.len() < 3 || bucket.len() > 63 {
        report.error(format!("bucket name must be 3-63 characters: {bucket}"));
    }
    let valid_bucket_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    let valid_bucket_edges = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .is_some_and(|(first, last)| {
            first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
        });
    if !valid_bucket_chars || !valid_bucket_edges {
        report.error(format!("invalid bucket name: {bucket}"));
    }

    let function = &config.backend.function_name;
    if !function
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        || function.is_empty()
    {
        report.error(format!("invalid function name: {function}"));
    }
    if function.len() > 64 {
        report.error(format!("function name too long: {function}"));
    }

    if let Some(gateway_id) = &config.backend.gateway_id
        && !gateway_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        report.warn(format!("unusual gateway ID format: {gateway_id}"));
    }

    if let Some(cdn_id) = &config.frontend.cdn_distribution_id {
        let well_formed = cdn_id.starts_with('E')
            && cdn_id[1..]
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !well_formed {
            report.warn(format!("unusual CDN distribution ID format: {cdn_id}"));
        }
    }
}

fn check_urls(config: &ResolvedConfig, env: Environment, report: &mut ValidationReport) {
    let url_fields = [
        ("frontend.base_url", config.frontend.base_url.as_deref()),
        (
            "frontend.websocket_url",
            config.frontend.websocket_url.as_deref(),
        ),
        ("backend.gateway_url", config.backend.gateway_url.as_deref()),
    ];

    for (field, url) in url_fields {
        let Some(url) = url else { continue };
        if !is_well_formed_url(url) {
            report.error(format!("invalid URL in {field}: {url}"));
        }
        if env != Environment::Development && url.contains("localhost") {
            report.error(format!(
                "localhost URL found in non-development environment: {field}"
            ));
        }
    }

    if let Some(ws) = &config.frontend.websocket_url {
        if env == Environment::Production && !ws.starts_with("wss://") {
            report.error("production websocket URL must use wss://");
        }
        if env == Environment::Development && !ws.starts_with("ws://") {
            report.warn("development websocket URL should use ws://");
        }
    }
}

fn check_security(config: &ResolvedConfig, env: Environment, report: &mut ValidationReport) {
    if env != Environment::Development
        && config.backend.cors_origins.iter().any(|o| o == "*")
    {
        report.error("CORS cannot use wildcard (*) outside development");
    }

    if env == Environment::Production
        && let Some(base_url) = &config.frontend.base_url
        && !base_url.starts_with("https://")
    {
        report.error("production API base URL must use HTTPS");
    }
}

fn check_function_limits(config: &ResolvedConfig, report: &mut ValidationReport) {
    let function = &config.backend.function;

    if let Some(memory) = function.memory_mb {
        if !(128..=10240).contains(&memory) {
            report.error(format!("function memory must be 128-10240 MB: {memory}"));
        }
        if memory % 64 != 0 {
            report.error(format!("function memory must be a multiple of 64: {memory}"));
        }
    }

    if let Some(timeout) = function.timeout_secs
        && !(1..=900).contains(&timeout)
    {
        report.error(format!("function timeout must be 1-900 seconds: {timeout}"));
    }

    if let Some(reserved) = function.reserved_concurrency
        && reserved > 1000
    {
        report.warn(format!("unusual reserved concurrency: {reserved}"));
    }
}

fn check_strategy(config: &ResolvedConfig, report: &mut ValidationReport) {
    if config.deployment.strategy != Strategy::Canary {
        return;
    }

    match config.deployment.canary_percentage {
        Some(p) if (1..=50).contains(&p) => {}
        _ => report.error("canary percentage must be 1-50%"),
    }

    match config.deployment.canary_duration {
        Some(d) if d >= Duration::from_secs(60) && d <= Duration::from_secs(3600) => {}
        _ => report.warn("canary duration should be 60-3600 seconds"),
    }
}

fn is_well_formed_url(url: &str) -> bool {
    let rest = ["https://", "http://", "wss://", "ws://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme));
    match rest {
        Some(host) => !host.is_empty() && !host.contains(char::is_whitespace),
        None => false,
    }
}
