// ABOUTME: Aggregate statistics and pattern analysis over deployment history.
// ABOUTME: Pure functions over history entries; deterministic for a fixed clock.

use super::record::{DeploymentStatus, HistoryEntry};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregates over a trailing window of deployment history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub rolled_back: usize,
    /// Percentage in [0, 100]. 100 when the window is empty.
    pub success_rate: f64,
    pub average_duration_ms: f64,
    /// Error class -> occurrence count.
    pub common_errors: BTreeMap<String, u32>,
    pub by_hour: BTreeMap<u32, u32>,
    pub by_weekday: BTreeMap<String, u32>,
    pub by_user: BTreeMap<String, u32>,
    pub by_branch: BTreeMap<String, u32>,
}

/// Compute statistics over entries newer than `now - window_days`.
pub fn compute(entries: &[HistoryEntry], window_days: u32, now: DateTime<Utc>) -> DeploymentStatistics {
    let cutoff = now - Duration::days(i64::from(window_days));
    let recent: Vec<&HistoryEntry> = entries.iter().filter(|e| e.timestamp > cutoff).collect();

    let total = recent.len();
    let successful = recent
        .iter()
        .filter(|e| e.status == DeploymentStatus::Completed)
        .count();
    let failed = recent
        .iter()
        .filter(|e| {
            e.status == DeploymentStatus::Failed || e.status == DeploymentStatus::RolledBack
        })
        .count();
    let rolled_back = recent.iter().filter(|e| e.rolled_back).count();

    let durations: Vec<u64> = recent.iter().filter_map(|e| e.duration_ms).collect();
    let average_duration_ms = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<u64>() as f64 / durations.len() as f64
    };

    let success_rate = if total == 0 {
        100.0
    } else {
        successful as f64 / total as f64 * 100.0
    };

    let mut common_errors = BTreeMap::new();
    let mut by_hour = BTreeMap::new();
    let mut by_weekday = BTreeMap::new();
    let mut by_user = BTreeMap::new();
    let mut by_branch = BTreeMap::new();

    for entry in &recent {
        if let Some(class) = entry.error_class {
            *common_errors.entry(class.to_string()).or_insert(0) += 1;
        }
        *by_hour.entry(entry.timestamp.hour()).or_insert(0) += 1;
        *by_weekday
            .entry(entry.timestamp.weekday().to_string())
            .or_insert(0) += 1;
        *by_user.entry(entry.user.clone()).or_insert(0) += 1;
        *by_branch
            .entry(entry.branch.clone().unwrap_or_else(|| "unknown".to_string()))
            .or_insert(0) += 1;
    }

    DeploymentStatistics {
        total,
        successful,
        failed,
        rolled_back,
        success_rate,
        average_duration_ms,
        common_errors,
        by_hour,
        by_weekday,
        by_user,
        by_branch,
    }
}

/// Scheduling recommendations derived from history.
#[derive(Debug, Clone, Serialize)]
pub struct PatternReport {
    pub most_successful_hour: Option<u32>,
    pub most_failure_hour: Option<u32>,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
}

pub fn analyze(entries: &[HistoryEntry], stats: &DeploymentStatistics) -> PatternReport {
    let mut success_by_hour: BTreeMap<u32, u32> = BTreeMap::new();
    let mut failure_by_hour: BTreeMap<u32, u32> = BTreeMap::new();

    for entry in entries {
        let hour = entry.timestamp.hour();
        match entry.status {
            DeploymentStatus::Completed => *success_by_hour.entry(hour).or_insert(0) += 1,
            DeploymentStatus::Failed | DeploymentStatus::RolledBack => {
                *failure_by_hour.entry(hour).or_insert(0) += 1
            }
            _ => {}
        }
    }

    let most_successful_hour = peak_hour(&success_by_hour);
    let most_failure_hour = peak_hour(&failure_by_hour);

    let mut risk_factors = Vec::new();
    if stats.total > 0 && stats.success_rate < 90.0 {
        risk_factors.push(format!("low success rate: {:.1}%", stats.success_rate));
    }
    if let Some((class, count)) = stats.common_errors.iter().max_by_key(|(_, c)| **c) {
        risk_factors.push(format!("common error: {class} ({count} occurrences)"));
    }

    let mut recommendations = Vec::new();
    if let Some(hour) = most_successful_hour {
        recommendations.push(format!("deploy around {hour:02}:00 for best success rate"));
    }
    if let Some(hour) = most_failure_hour {
        recommendations.push(format!("avoid deploying around {hour:02}:00"));
    }
    if stats.average_duration_ms > 300_000.0 {
        recommendations.push("consider shortening the deployment pipeline".to_string());
    }

    PatternReport {
        most_successful_hour,
        most_failure_hour,
        risk_factors,
        recommendations,
    }
}

fn peak_hour(counts: &BTreeMap<u32, u32>) -> Option<u32> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .map(|(hour, _)| *hour)
}
