// ABOUTME: Learning memory: known error patterns, success patterns, prevention rules.
// ABOUTME: A derived cache - fully rebuildable by replaying store history.

use crate::provider::ErrorClass;
use crate::store::{DeploymentStatus, StateStore, StoreError};
use crate::types::Environment;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

/// How often a prevention rule must see an error before it is synthesized.
const RULE_OCCURRENCE_THRESHOLD: u32 = 2;

/// Key for the known-error table: what failed, where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorKey {
    pub class: ErrorClass,
    pub environment: Environment,
}

/// An error class observed at least once in an environment.
#[derive(Debug, Clone)]
pub struct KnownError {
    pub occurrences: u32,
    pub environments: BTreeSet<Environment>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// The most recent error message, when one was available.
    pub sample: Option<String>,
}

/// A recurring successful configuration shape.
#[derive(Debug, Clone)]
pub struct SuccessPattern {
    pub count: u32,
    pub avg_duration_ms: f64,
    pub last_seen: DateTime<Utc>,
}

/// Typed mitigation applied before a deployment when its rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mitigation {
    /// Probe and pre-create missing resources before mutating anything.
    EnsureResources,
    /// Drop wildcard origins and re-apply the explicit CORS list.
    TightenCors,
    /// Raise stage and health-check timeouts for this run.
    ExtendTimeouts,
}

impl Mitigation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mitigation::EnsureResources => "ensure_resources",
            Mitigation::TightenCors => "tighten_cors",
            Mitigation::ExtendTimeouts => "extend_timeouts",
        }
    }

    /// The mitigation synthesized for an error class, if any.
    fn for_class(class: ErrorClass) -> Option<Mitigation> {
        match class {
            ErrorClass::ResourceNotFound => Some(Mitigation::EnsureResources),
            ErrorClass::Cors => Some(Mitigation::TightenCors),
            ErrorClass::Timeout => Some(Mitigation::ExtendTimeouts),
            ErrorClass::PermissionDenied | ErrorClass::Unknown => None,
        }
    }
}

/// A typed condition -> mitigation pair synthesized from repeated failures.
#[derive(Debug, Clone)]
pub struct PreventionRule {
    pub name: String,
    pub class: ErrorClass,
    pub environment: Environment,
    pub mitigation: Mitigation,
    pub created_at: DateTime<Utc>,
}

/// In-process learning state. Every fact here is derivable from the store's
/// history, so losing it only costs accumulated shortcuts, never correctness.
#[derive(Debug, Default)]
pub struct Memory {
    known_errors: HashMap<ErrorKey, KnownError>,
    success_patterns: HashMap<String, SuccessPattern>,
    rules: Vec<PreventionRule>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild memory by replaying history for every environment.
    pub fn rebuild(store: &StateStore) -> Result<Self, StoreError> {
        let mut memory = Self::new();
        for environment in Environment::ALL {
            let mut entries = store.history(Some(environment), usize::MAX)?;
            // Replay oldest first so occurrence counts and rolling
            // averages come out the same as they did live.
            entries.reverse();
            for entry in entries {
                match entry.status {
                    DeploymentStatus::Completed => {
                        if let Some(duration_ms) = entry.duration_ms {
                            memory.record_success(
                                environment,
                                &entry.config_fingerprint,
                                duration_ms,
                                entry.timestamp,
                            );
                        }
                    }
                    DeploymentStatus::Failed | DeploymentStatus::RolledBack => {
                        if let Some(class) = entry.error_class {
                            memory.record_failure(class, environment, None, entry.timestamp);
                        }
                    }
                    _ => {}
                }
            }
        }
        tracing::debug!(
            known_errors = memory.known_errors.len(),
            rules = memory.rules.len(),
            "memory rebuilt from history"
        );
        Ok(memory)
    }

    /// Record a classified failure. When the same (class, environment) key
    /// reaches the occurrence threshold, a prevention rule is synthesized
    /// exactly once.
    pub fn record_failure(
        &mut self,
        class: ErrorClass,
        environment: Environment,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) {
        let key = ErrorKey { class, environment };
        let entry = self.known_errors.entry(key).or_insert_with(|| KnownError {
            occurrences: 0,
            environments: BTreeSet::new(),
            first_seen: at,
            last_seen: at,
            sample: None,
        });
        entry.occurrences += 1;
        entry.environments.insert(environment);
        entry.last_seen = at;
        if let Some(message) = message {
            entry.sample = Some(message.to_string());
        }

        if entry.occurrences >= RULE_OCCURRENCE_THRESHOLD
            && !self
                .rules
                .iter()
                .any(|r| r.class == class && r.environment == environment)
            && let Some(mitigation) = Mitigation::for_class(class)
        {
            let rule = PreventionRule {
                name: format!("prevent_{class}_{environment}"),
                class,
                environment,
                mitigation,
                created_at: at,
            };
            tracing::debug!(rule = %rule.name, mitigation = rule.mitigation.as_str(), "synthesized prevention rule");
            self.rules.push(rule);
        }
    }

    /// Record a successful run under its pattern key.
    pub fn record_success(
        &mut self,
        environment: Environment,
        config_fingerprint: &str,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) {
        let key = pattern_key(environment, config_fingerprint, duration_ms);
        let pattern = self
            .success_patterns
            .entry(key)
            .or_insert_with(|| SuccessPattern {
                count: 0,
                avg_duration_ms: 0.0,
                last_seen: at,
            });
        pattern.count += 1;
        pattern.avg_duration_ms +=
            (duration_ms as f64 - pattern.avg_duration_ms) / f64::from(pattern.count);
        pattern.last_seen = at;
    }

    /// Rules applicable to a deployment into `environment`.
    pub fn matching_rules(&self, environment: Environment) -> Vec<&PreventionRule> {
        self.rules
            .iter()
            .filter(|r| r.environment == environment)
            .collect()
    }

    /// Error classes previously seen in `environment`.
    pub fn known_error_classes(&self, environment: Environment) -> Vec<ErrorClass> {
        let mut classes: Vec<ErrorClass> = self
            .known_errors
            .keys()
            .filter(|k| k.environment == environment)
            .map(|k| k.class)
            .collect();
        classes.sort_by_key(|c| c.as_str());
        classes
    }

    pub fn known_error(&self, class: ErrorClass, environment: Environment) -> Option<&KnownError> {
        self.known_errors.get(&ErrorKey { class, environment })
    }

    pub fn success_pattern_count(&self) -> usize {
        self.success_patterns.len()
    }

    pub fn rules(&self) -> &[PreventionRule] {
        &self.rules
    }
}

/// Success patterns bucket durations by the minute so near-identical runs
/// of the same config land on the same key.
fn pattern_key(environment: Environment, fingerprint: &str, duration_ms: u64) -> String {
    format!("{environment}:{fingerprint}:{}", duration_ms / 60_000)
}
