use crate::error::{EngineError, EngineResult};
use crate::models::{
    HealthReport, HealthStatus, ModelKind, Policy, Recommendation, UserProfile,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

pub const FALLBACK_ALGORITHM: &str = "Fallback_System";
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Per-operation circuit breaker. Closed until `failure_threshold`
/// consecutive failures, then open for `recovery_timeout`; the first call
/// after the timeout runs as a half-open probe whose outcome decides
/// whether the circuit closes again.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name,
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Gate a call. `Err(CircuitOpen)` means the caller must not run the
    /// protected operation and should fall back instead.
    pub fn check(&self) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout {
                    info!(breaker = self.name, "circuit breaker half-open, probing");
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(EngineError::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != BreakerState::Closed {
            info!(breaker = self.name, "circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        let should_open = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if should_open && inner.state != BreakerState::Open {
            warn!(
                breaker = self.name,
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            );
        }
        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state_name(&self) -> &'static str {
        match self.inner.lock().state {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().state == BreakerState::Open
    }
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub operation: String,
    pub arguments: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Rolling log of the most recent failures, used by the health checker and
/// exposed for diagnostics. Arguments are truncated before storage.
#[derive(Debug)]
pub struct ErrorLog {
    capacity: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, operation: &str, arguments: &str, error: &EngineError) {
        let mut arguments = arguments.to_string();
        if arguments.len() > 200 {
            arguments.truncate(200);
            arguments.push_str("...");
        }

        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(ErrorRecord {
            operation: operation.to_string(),
            arguments,
            message: error.to_string(),
            occurred_at: Utc::now(),
        });
    }

    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        let records = self.records.lock();
        records.iter().rev().take(limit).cloned().collect()
    }

    pub fn count_since(&self, window: Duration) -> usize {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::seconds(300));
        let records = self.records.lock();
        records.iter().filter(|r| r.occurred_at > cutoff).count()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// Rule-based recommender used whenever the ML path is unavailable. Scores
/// are deterministic functions of the profile and catalog, so the fallback
/// works even with zero trained models and zero interaction history.
#[derive(Debug, Default)]
pub struct FallbackRecommender;

impl FallbackRecommender {
    pub fn recommend(
        &self,
        user: Option<&UserProfile>,
        policies: &[Policy],
        limit: usize,
    ) -> Vec<Recommendation> {
        let mut scored: Vec<(Uuid, f64, String)> = policies
            .iter()
            .map(|policy| {
                let (score, reason) = Self::score_policy(user, policy);
                (policy.id, score, reason)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(policy_id, score, reason)| Recommendation {
                policy_id,
                score,
                reason,
                algorithm: FALLBACK_ALGORITHM.to_string(),
                confidence: FALLBACK_CONFIDENCE,
            })
            .collect()
    }

    fn score_policy(user: Option<&UserProfile>, policy: &Policy) -> (f64, String) {
        let mut score: f64 = 50.0;
        let mut reasons: Vec<&str> = Vec::new();

        if let Some(user) = user {
            if let Some(age) = user.age {
                if policy.covers_age(age) {
                    score += 20.0;
                    reasons.push("suitable for your age group");
                }
            }
            if let Some(occupation) = user.occupation.as_deref() {
                let occupation = occupation.to_lowercase();
                if (occupation.contains("construction") || occupation.contains("manual"))
                    && policy.policy_type == "health"
                {
                    score += 15.0;
                    reasons.push("health coverage recommended for physically demanding work");
                }
                if occupation.contains("office")
                    && (policy.policy_type == "life" || policy.policy_type == "health")
                {
                    score += 10.0;
                    reasons.push("popular with professionals");
                }
            }
            if let Some(lifestyle) = user.lifestyle.as_deref() {
                if lifestyle.eq_ignore_ascii_case("professional")
                    && (policy.policy_type == "life" || policy.policy_type == "health")
                {
                    score += 10.0;
                    reasons.push("popular with professionals");
                }
            }
            if user.marital_status.as_deref() == Some("married") && policy.policy_type == "life" {
                score += 10.0;
                reasons.push("life coverage valued by married policyholders");
            }
        }

        reasons.dedup();
        let reason = if reasons.is_empty() {
            "Popular choice among policyholders".to_string()
        } else {
            let mut text = reasons.join(". ");
            if let Some(first) = text.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            format!("{}.", text)
        };

        (score.min(100.0), reason)
    }
}

/// Point-in-time view of the engine assembled by the service layer. The
/// checker only interprets it.
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    pub active_models: Vec<ModelKind>,
    pub interaction_count: usize,
    pub policy_count: usize,
    pub user_count: usize,
    /// Mean fraction of filled profile fields across known users.
    pub profile_completeness: Option<f64>,
    pub storage_ok: bool,
}

pub struct HealthChecker {
    error_log: Arc<ErrorLog>,
    breakers: Vec<Arc<CircuitBreaker>>,
    error_window: Duration,
}

impl HealthChecker {
    pub fn new(error_log: Arc<ErrorLog>, breakers: Vec<Arc<CircuitBreaker>>) -> Self {
        Self {
            error_log,
            breakers,
            error_window: Duration::from_secs(300),
        }
    }

    pub fn report(&self, snapshot: &HealthSnapshot) -> HealthReport {
        let mut components = HashMap::new();
        let mut recommendations = Vec::new();
        let mut status = HealthStatus::Healthy;

        components.insert(
            "storage".to_string(),
            if snapshot.storage_ok { "ok" } else { "failed" }.to_string(),
        );
        if !snapshot.storage_ok {
            status = HealthStatus::Unhealthy;
            recommendations.push("Storage is unreachable; recommendations run in fallback mode".to_string());
        }

        components.insert(
            "models".to_string(),
            format!("{} of 3 active", snapshot.active_models.len()),
        );
        if snapshot.active_models.is_empty() {
            if status == HealthStatus::Healthy {
                status = HealthStatus::Degraded;
            }
            recommendations.push("No trained models are active; trigger a training run".to_string());
        }

        let recent_errors = self.error_log.count_since(self.error_window);
        components.insert("recent_errors".to_string(), recent_errors.to_string());
        if recent_errors > 3 {
            if status == HealthStatus::Healthy {
                status = HealthStatus::Degraded;
            }
            recommendations.push(format!(
                "{} prediction errors in the last 5 minutes; inspect the error log",
                recent_errors
            ));
        }

        for breaker in &self.breakers {
            components.insert(
                format!("breaker_{}", breaker.name()),
                breaker.state_name().to_string(),
            );
            if breaker.is_open() {
                if status == HealthStatus::Healthy {
                    status = HealthStatus::Degraded;
                }
                recommendations.push(format!(
                    "Circuit breaker '{}' is open; the affected model is bypassed",
                    breaker.name()
                ));
            }
        }

        if let Some(completeness) = snapshot.profile_completeness {
            components.insert(
                "profile_completeness".to_string(),
                format!("{:.2}", completeness),
            );
            if completeness < 0.5 {
                recommendations.push(
                    "User profiles are sparse; collect more profile fields to improve hybrid scores".to_string(),
                );
            }
        }

        components.insert("interactions".to_string(), snapshot.interaction_count.to_string());
        components.insert("policies".to_string(), snapshot.policy_count.to_string());
        components.insert("users".to_string(), snapshot.user_count.to_string());
        if snapshot.interaction_count < 10 {
            recommendations.push("Interaction history is thin; model quality improves with more tracked events".to_string());
        }

        HealthReport {
            status,
            components,
            recommendations,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("test", 5, Duration::from_secs(60))
    }

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let b = breaker();
        for _ in 0..4 {
            b.record_failure();
            assert!(b.check().is_ok());
        }
        b.record_failure();
        assert!(matches!(b.check().unwrap_err(), EngineError::CircuitOpen));
        assert_eq!(b.state_name(), "open");
    }

    #[test]
    fn success_resets_the_failure_count() {
        let b = breaker();
        for _ in 0..4 {
            b.record_failure();
        }
        b.record_success();
        for _ in 0..4 {
            b.record_failure();
        }
        assert!(b.check().is_ok());
    }

    #[test]
    fn half_open_probe_failure_reopens_immediately() {
        let b = CircuitBreaker::new("probe", 2, Duration::from_millis(0));
        b.record_failure();
        b.record_failure();
        // Recovery timeout of zero: the next check transitions to half-open.
        assert!(b.check().is_ok());
        assert_eq!(b.state_name(), "half_open");
        b.record_failure();
        assert_eq!(b.state_name(), "open");
    }

    #[test]
    fn error_log_keeps_only_the_newest_records() {
        let log = ErrorLog::new(3);
        for i in 0..5 {
            log.record(
                "predict",
                &format!("user {}", i),
                &EngineError::Prediction("boom".to_string()),
            );
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        assert_eq!(recent[0].arguments, "user 4");
        assert_eq!(recent[2].arguments, "user 2");
    }

    #[test]
    fn fallback_boosts_age_eligible_health_policies() {
        let mut user = UserProfile::new(Uuid::new_v4());
        user.age = Some(30);
        user.occupation = Some("construction".to_string());

        let in_range = Policy {
            id: Uuid::from_u128(1),
            name: "Health Basic".into(),
            policy_type: "health".into(),
            premium: 120.0,
            coverage: "hospital".into(),
            min_age: 18,
            max_age: 65,
            risk_level: "low".into(),
        };
        let out_of_range = Policy {
            id: Uuid::from_u128(2),
            name: "Senior Life".into(),
            policy_type: "life".into(),
            premium: 200.0,
            coverage: "death benefit".into(),
            min_age: 60,
            max_age: 90,
            risk_level: "medium".into(),
        };

        let recs =
            FallbackRecommender.recommend(Some(&user), &[out_of_range, in_range.clone()], 10);
        assert_eq!(recs[0].policy_id, in_range.id);
        assert_eq!(recs[0].score, 85.0);
        assert_eq!(recs[0].algorithm, FALLBACK_ALGORITHM);
        assert!(recs.iter().all(|r| r.confidence == FALLBACK_CONFIDENCE));
        assert!(recs.iter().all(|r| r.score <= 100.0));
    }

    #[test]
    fn fallback_works_without_a_profile() {
        let policy = Policy {
            id: Uuid::new_v4(),
            name: "Travel Lite".into(),
            policy_type: "travel".into(),
            premium: 30.0,
            coverage: "trip cancellation".into(),
            min_age: 18,
            max_age: 99,
            risk_level: "low".into(),
        };
        let recs = FallbackRecommender.recommend(None, &[policy], 10);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].score, 50.0);
    }

    #[test]
    fn health_report_degrades_on_error_burst() {
        let log = Arc::new(ErrorLog::new(100));
        for _ in 0..4 {
            log.record("predict", "", &EngineError::Prediction("timeout".to_string()));
        }
        let checker = HealthChecker::new(log, vec![]);
        let snapshot = HealthSnapshot {
            active_models: vec![ModelKind::Hybrid],
            interaction_count: 50,
            policy_count: 5,
            user_count: 5,
            profile_completeness: Some(0.8),
            storage_ok: true,
        };
        let report = checker.report(&snapshot);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(!report.recommendations.is_empty());
    }

    #[test]
    fn storage_failure_is_unhealthy() {
        let checker = HealthChecker::new(Arc::new(ErrorLog::new(100)), vec![]);
        let snapshot = HealthSnapshot {
            active_models: vec![ModelKind::Hybrid],
            interaction_count: 50,
            policy_count: 5,
            user_count: 5,
            profile_completeness: Some(0.8),
            storage_ok: false,
        };
        assert_eq!(checker.report(&snapshot).status, HealthStatus::Unhealthy);
    }
}
