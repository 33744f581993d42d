// ABOUTME: Environment-variable overrides with a fixed name-to-field mapping.
// ABOUTME: Applied after file merging; literal "true"/"false" coerce to bool.

use super::layer::ConfigLayer;
use super::Strategy;
use std::collections::HashMap;

/// The environment variables the repository honors, in documentation order.
pub const ENV_OVERRIDES: [&str; 8] = [
    "STAGEHAND_REGION",
    "STAGEHAND_BUCKET",
    "STAGEHAND_FUNCTION",
    "STAGEHAND_GATEWAY_ID",
    "STAGEHAND_CDN_ID",
    "STAGEHAND_API_BASE_URL",
    "STAGEHAND_STRATEGY",
    "STAGEHAND_AUTO_ROLLBACK",
];

/// Apply environment-variable overrides onto the merged layer.
///
/// The mapping is fixed: unknown variables are ignored, and a variable that
/// fails to parse (bad strategy name, non-boolean) is skipped with a warning
/// rather than aborting the load.
pub fn apply_overrides(layer: &mut ConfigLayer, vars: &HashMap<String, String>) {
    for name in ENV_OVERRIDES {
        let Some(value) = vars.get(name) else {
            continue;
        };

        match name {
            "STAGEHAND_REGION" => layer.region = Some(value.clone()),
            "STAGEHAND_BUCKET" => layer.frontend.bucket = Some(value.clone()),
            "STAGEHAND_FUNCTION" => layer.backend.function_name = Some(value.clone()),
            "STAGEHAND_GATEWAY_ID" => layer.backend.gateway_id = Some(value.clone()),
            "STAGEHAND_CDN_ID" => layer.frontend.cdn_distribution_id = Some(value.clone()),
            "STAGEHAND_API_BASE_URL" => layer.frontend.base_url = Some(value.clone()),
            "STAGEHAND_STRATEGY" => match value.parse::<Strategy>() {
                Ok(strategy) => layer.deployment.strategy = Some(strategy),
                Err(e) => tracing::warn!("ignoring {name}: {e}"),
            },
            "STAGEHAND_AUTO_ROLLBACK" => match coerce_bool(value) {
                Some(flag) => layer.deployment.rollback_on_failure = Some(flag),
                None => tracing::warn!("ignoring {name}: expected \"true\" or \"false\""),
            },
            _ => unreachable!("mapping covers exactly ENV_OVERRIDES"),
        }
        tracing::debug!("applied override from {name}");
    }
}

fn coerce_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
