//! Rolling per-error-kind counters backing the operational health endpoint
//! (§7). `healthy` when every counter is zero, `degraded` otherwise, with
//! the last error recorded per source.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastError {
    pub source: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub counters: HashMap<String, u64>,
    pub last_error: Option<LastError>,
}

struct Inner {
    counters: HashMap<String, u64>,
    last_error: Option<LastError>,
}

/// Shared, lock-guarded counters updated by every job fire outcome and read
/// by the health endpoint.
pub struct HealthRegistry {
    inner: Mutex<Inner>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                counters: HashMap::new(),
                last_error: None,
            }),
        }
    }

    /// Records a fire outcome (`ok`, `skipped_overlap`, `skipped_quiet_hours`,
    /// or `error:<kind>`). Only error outcomes move the counters and
    /// last-error slot.
    pub fn record_outcome(&self, source: &str, outcome: &str) {
        if let Some(kind) = outcome.strip_prefix("error:") {
            let mut guard = self.inner.lock().expect("health registry mutex poisoned");
            *guard.counters.entry(kind.to_string()).or_insert(0) += 1;
            guard.last_error = Some(LastError {
                source: source.to_string(),
                kind: kind.to_string(),
                message: outcome.to_string(),
            });
        }
    }

    pub fn report(&self) -> HealthReport {
        let guard = self.inner.lock().expect("health registry mutex poisoned");
        let degraded = guard.counters.values().any(|&v| v > 0);
        HealthReport {
            state: if degraded {
                HealthState::Degraded
            } else {
                HealthState::Healthy
            },
            counters: guard.counters.clone(),
            last_error: guard.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_healthy_with_no_counters() {
        let registry = HealthRegistry::new();
        let report = registry.report();
        assert_eq!(report.state, HealthState::Healthy);
        assert!(report.counters.is_empty());
    }

    #[test]
    fn an_error_outcome_flips_to_degraded_and_records_last_error() {
        let registry = HealthRegistry::new();
        registry.record_outcome("checkin_user-1", "error:transient");
        let report = registry.report();
        assert_eq!(report.state, HealthState::Degraded);
        assert_eq!(report.counters.get("transient"), Some(&1));
        assert_eq!(report.last_error.unwrap().kind, "transient");
    }

    #[test]
    fn ok_outcomes_do_not_affect_counters() {
        let registry = HealthRegistry::new();
        registry.record_outcome("checkin_user-1", "ok");
        registry.record_outcome("checkin_user-1", "skipped_quiet_hours");
        let report = registry.report();
        assert_eq!(report.state, HealthState::Healthy);
        assert!(report.counters.is_empty());
    }
}
