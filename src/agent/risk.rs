// ABOUTME: Pre-flight risk scoring - a pure function of config, memory, and history.
// ABOUTME: Same inputs and the same clock always produce the same score.

use super::memory::Memory;
use crate::config::{self, ResolvedConfig};
use crate::store::{DeploymentStatistics, RiskAnalysis};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

const WEIGHT_KNOWN_ERRORS: f64 = 0.3;
const WEIGHT_RISKY_TIME: f64 = 0.2;
const WEIGHT_LOW_SUCCESS_RATE: f64 = 0.3;
const WEIGHT_MANY_DIFFS: f64 = 0.2;
const WEIGHT_CRITICAL_DIFFS: f64 = 0.3;
const WEIGHT_RESOURCE_FAILURES: f64 = 0.4;

const MANY_DIFFS_THRESHOLD: usize = 5;
const LOW_SUCCESS_RATE_PERCENT: f64 = 80.0;

/// Score a deployment before anything is mutated.
///
/// `last_successful_config` is the sanitized config of the environment's most
/// recent completed deployment; `resource_failures` names resources the
/// pre-flight probe found missing or unreachable.
pub fn assess(
    config: &ResolvedConfig,
    memory: &Memory,
    statistics: &DeploymentStatistics,
    last_successful_config: Option<&serde_json::Value>,
    resource_failures: &[String],
    now: DateTime<Utc>,
) -> RiskAnalysis {
    let mut score = 0.0;
    let mut factors = Vec::new();

    let known = memory.known_error_classes(config.environment);
    if !known.is_empty() {
        score += WEIGHT_KNOWN_ERRORS;
        let classes: Vec<&str> = known.iter().map(|c| c.as_str()).collect();
        factors.push(format!(
            "previously seen error patterns in {}: {}",
            config.environment,
            classes.join(", ")
        ));
    }

    if let Some(reason) = risky_time(now) {
        score += WEIGHT_RISKY_TIME;
        factors.push(format!("risky deployment time: {reason}"));
    }

    if statistics.total > 0 && statistics.success_rate < LOW_SUCCESS_RATE_PERCENT {
        score += WEIGHT_LOW_SUCCESS_RATE;
        factors.push(format!(
            "trailing success rate {:.1}% below {LOW_SUCCESS_RATE_PERCENT:.0}%",
            statistics.success_rate
        ));
    }

    if let Some(previous) = last_successful_config {
        let diffs = config::diff(previous, &config.sanitized());
        if diffs.len() > MANY_DIFFS_THRESHOLD {
            score += WEIGHT_MANY_DIFFS;
            factors.push(format!(
                "large configuration change: {} fields differ from last success",
                diffs.len()
            ));
        }
        let critical: Vec<&str> = diffs
            .iter()
            .map(|d| d.path.as_str())
            .filter(|path| is_critical_path(path))
            .collect();
        if !critical.is_empty() {
            score += WEIGHT_CRITICAL_DIFFS;
            factors.push(format!(
                "critical configuration change: {}",
                critical.join(", ")
            ));
        }
    }

    if !resource_failures.is_empty() {
        score += WEIGHT_RESOURCE_FAILURES;
        factors.push(format!(
            "resource availability problems: {}",
            resource_failures.join(", ")
        ));
    }

    let score = score.min(1.0);
    RiskAnalysis {
        score,
        factors,
        recommendation: recommendation(score).to_string(),
        analyzed_at: now,
    }
}

/// Night hours, Friday afternoon, and weekends raise the score.
fn risky_time(now: DateTime<Utc>) -> Option<&'static str> {
    let hour = now.hour();
    let weekday = now.weekday();

    if matches!(weekday, Weekday::Sat | Weekday::Sun) {
        Some("weekend")
    } else if weekday == Weekday::Fri && hour >= 15 {
        Some("friday afternoon")
    } else if hour >= 23 || hour <= 6 {
        Some("night hours")
    } else {
        None
    }
}

/// Paths whose changes can break routing or data access outright.
fn is_critical_path(path: &str) -> bool {
    path.contains("bucket") || path.contains("function_name") || path.contains("gateway")
}

fn recommendation(score: f64) -> &'static str {
    if score < 0.3 {
        "proceed"
    } else if score < 0.6 {
        "proceed with caution"
    } else if score < 0.8 {
        "requires approval"
    } else {
        "postpone"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLayer;
    use crate::provider::ErrorClass;
    use crate::types::Environment;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn staging_config() -> ResolvedConfig {
        let layer: ConfigLayer = serde_yaml::from_str(
            r#"
environment: staging
stage: staging
region: eu-central-1
frontend:
  bucket: assets-staging
backend:
  function_name: api-staging
"#,
        )
        .unwrap();
        layer.resolve().unwrap()
    }

    fn empty_stats() -> DeploymentStatistics {
        DeploymentStatistics {
            total: 0,
            successful: 0,
            failed: 0,
            rolled_back: 0,
            success_rate: 100.0,
            average_duration_ms: 0.0,
            common_errors: BTreeMap::new(),
            by_hour: BTreeMap::new(),
            by_weekday: BTreeMap::new(),
            by_user: BTreeMap::new(),
            by_branch: BTreeMap::new(),
        }
    }

    // Tuesday, mid-morning.
    fn safe_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 11, 10, 0, 0).unwrap()
    }

    #[test]
    fn clean_slate_scores_zero() {
        let analysis = assess(
            &staging_config(),
            &Memory::new(),
            &empty_stats(),
            None,
            &[],
            safe_time(),
        );
        assert_eq!(analysis.score, 0.0);
        assert!(analysis.factors.is_empty());
        assert_eq!(analysis.recommendation, "proceed");
    }

    #[test]
    fn known_errors_raise_score() {
        let mut memory = Memory::new();
        memory.record_failure(ErrorClass::Timeout, Environment::Staging, None, Utc::now());

        let analysis = assess(
            &staging_config(),
            &memory,
            &empty_stats(),
            None,
            &[],
            safe_time(),
        );
        assert_eq!(analysis.score, WEIGHT_KNOWN_ERRORS);
    }

    #[test]
    fn weekend_and_friday_afternoon_are_risky() {
        let saturday = Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap();
        assert_eq!(risky_time(saturday), Some("weekend"));

        let friday_late = Utc.with_ymd_and_hms(2024, 6, 7, 16, 0, 0).unwrap();
        assert_eq!(risky_time(friday_late), Some("friday afternoon"));

        let friday_morning = Utc.with_ymd_and_hms(2024, 6, 7, 10, 0, 0).unwrap();
        assert_eq!(risky_time(friday_morning), None);

        let late_night = Utc.with_ymd_and_hms(2024, 6, 11, 23, 30, 0).unwrap();
        assert_eq!(risky_time(late_night), Some("night hours"));
    }

    #[test]
    fn non_critical_diff_contributes_nothing() {
        let config = staging_config();
        let mut previous = config.sanitized();
        previous["backend"]["function"]["env"] =
            serde_json::json!({"LOG_LEVEL": "info"});

        let analysis = assess(
            &config,
            &Memory::new(),
            &empty_stats(),
            Some(&previous),
            &[],
            safe_time(),
        );
        assert_eq!(analysis.score, 0.0);
    }

    #[test]
    fn critical_diff_raises_score() {
        let config = staging_config();
        let mut previous = config.sanitized();
        previous["frontend"]["bucket"] = serde_json::json!("old-bucket");

        let analysis = assess(
            &config,
            &Memory::new(),
            &empty_stats(),
            Some(&previous),
            &[],
            safe_time(),
        );
        assert_eq!(analysis.score, WEIGHT_CRITICAL_DIFFS);
        assert!(analysis.factors[0].contains("frontend.bucket"));
    }

    #[test]
    fn score_is_capped_at_one() {
        let mut memory = Memory::new();
        memory.record_failure(ErrorClass::Timeout, Environment::Staging, None, Utc::now());
        let mut stats = empty_stats();
        stats.total = 10;
        stats.success_rate = 40.0;

        let config = staging_config();
        let mut previous = config.sanitized();
        previous["frontend"]["bucket"] = serde_json::json!("old-bucket");
        previous["backend"]["gateway_id"] = serde_json::json!("old-gw");
        for i in 0..6 {
            previous["frontend"]["build_env"][format!("VAR_{i}")] = serde_json::json!("x");
        }

        let saturday = Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap();
        let analysis = assess(
            &config,
            &memory,
            &stats,
            Some(&previous),
            &["bucket assets-staging missing".to_string()],
            saturday,
        );
        assert_eq!(analysis.score, 1.0);
        assert_eq!(analysis.recommendation, "postpone");
    }
}
