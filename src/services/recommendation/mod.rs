use crate::algorithms::{rank_descending, ScoringContext};
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    HealthReport, InteractionEvent, InteractionKind, InteractionSummary, ModelKind,
    PerformanceReport, Policy, Recommendation, SimilarPolicy, UserProfile,
};
use crate::resilience::{
    CircuitBreaker, ErrorLog, FallbackRecommender, HealthChecker, HealthSnapshot,
};
use crate::services::store::{
    InteractionStore, ModelRegistry, PolicyStore, RecommendationLogStore, UserStore,
};
use crate::utils::validation::{profile_completeness, validate_interaction_value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const BLEND_ALGORITHM: &str = "AI_ML_Hybrid";

const SIMILARITY_THRESHOLD: f64 = 0.3;

/// Aggregated per-user view for the insights endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UserInsights {
    pub user_id: Uuid,
    pub profile_completeness: f64,
    pub profile_known: bool,
    pub interactions: InteractionSummary,
}

/// Request-path orchestrator: invokes the active models through their
/// circuit breakers, blends the scores, attaches explanations, and falls
/// back to the rule-based recommender when the ML path yields nothing.
///
/// Public entry points never return an error to the caller; every failure
/// degrades to the best available result and is logged for operators.
pub struct RecommendationService {
    users: Arc<UserStore>,
    policies: Arc<PolicyStore>,
    interactions: Arc<InteractionStore>,
    registry: Arc<ModelRegistry>,
    recommendation_log: Arc<RecommendationLogStore>,
    error_log: Arc<ErrorLog>,
    breakers: HashMap<ModelKind, Arc<CircuitBreaker>>,
    fallback: FallbackRecommender,
    health: HealthChecker,
    config: Config,
}

impl RecommendationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        users: Arc<UserStore>,
        policies: Arc<PolicyStore>,
        interactions: Arc<InteractionStore>,
        registry: Arc<ModelRegistry>,
        recommendation_log: Arc<RecommendationLogStore>,
        error_log: Arc<ErrorLog>,
    ) -> Self {
        let recovery = Duration::from_secs(config.resilience.recovery_timeout_secs);
        let threshold = config.resilience.failure_threshold;
        let breakers: HashMap<ModelKind, Arc<CircuitBreaker>> = [
            (
                ModelKind::Collaborative,
                Arc::new(CircuitBreaker::new("collaborative", threshold, recovery)),
            ),
            (
                ModelKind::ContentBased,
                Arc::new(CircuitBreaker::new("content_based", threshold, recovery)),
            ),
            (
                ModelKind::Hybrid,
                Arc::new(CircuitBreaker::new("hybrid", threshold, recovery)),
            ),
        ]
        .into_iter()
        .collect();

        let health = HealthChecker::new(
            Arc::clone(&error_log),
            breakers.values().cloned().collect(),
        );

        Self {
            users,
            policies,
            interactions,
            registry,
            recommendation_log,
            error_log,
            breakers,
            fallback: FallbackRecommender,
            health,
            config,
        }
    }

    /// Blended recommendations for a user. Always returns a ranked list;
    /// when every model is unavailable or cold, the rule-based fallback
    /// fills in.
    pub async fn get_recommendations(
        &self,
        user_id: Uuid,
        limit: Option<usize>,
    ) -> Vec<Recommendation> {
        let limit = limit
            .unwrap_or(self.config.blend.default_limit)
            .min(self.config.blend.max_limit);

        let user = self.users.get(user_id);
        let interactions = self.interactions.for_user(user_id);
        let policies = self.policies.all();
        let ctx = ScoringContext {
            user_id,
            user: user.as_ref(),
            interactions: &interactions,
            policies: &policies,
        };

        let weights = [
            (ModelKind::Collaborative, self.config.blend.collaborative_weight),
            (ModelKind::ContentBased, self.config.blend.content_weight),
            (ModelKind::Hybrid, self.config.blend.hybrid_weight),
        ];

        // A policy absent from a model's list contributes zero from that
        // model; appearing in several lists sums the weighted scores.
        let mut combined: HashMap<Uuid, f64> = HashMap::new();
        for (kind, weight) in weights {
            match self.invoke_model(kind, &ctx).await {
                Ok(scores) => {
                    for (policy_id, score) in scores {
                        *combined.entry(policy_id).or_default() += weight * score;
                    }
                }
                Err(err) => {
                    debug!(model = %kind, error = %err, "model skipped in blend");
                }
            }
        }

        let ranked = rank_descending(combined.into_iter().collect());
        let policy_index: HashMap<Uuid, &Policy> =
            policies.iter().map(|p| (p.id, p)).collect();

        let recommendations: Vec<Recommendation> = ranked
            .into_iter()
            .take(limit)
            .filter_map(|(policy_id, score)| {
                policy_index.get(&policy_id).map(|policy| Recommendation {
                    policy_id,
                    score: (score * 100.0).clamp(0.0, 100.0),
                    reason: build_explanation(user.as_ref(), policy, score),
                    algorithm: BLEND_ALGORITHM.to_string(),
                    confidence: score.clamp(0.0, 1.0),
                })
            })
            .collect();

        if recommendations.is_empty() {
            info!(user_id = %user_id, "ml blend produced nothing, serving fallback");
            let fallback = self.fallback.recommend(user.as_ref(), &policies, limit);
            self.recommendation_log.log_served(user_id, &fallback);
            return fallback;
        }

        self.recommendation_log.log_served(user_id, &recommendations);
        recommendations
    }

    /// One model invocation through its breaker, with the prediction
    /// timeout enforced. Data-insufficiency outcomes are expected and do
    /// not count against the breaker.
    async fn invoke_model(
        &self,
        kind: ModelKind,
        ctx: &ScoringContext<'_>,
    ) -> EngineResult<Vec<(Uuid, f64)>> {
        let Some(model) = self.registry.active(kind) else {
            return Err(EngineError::ModelNotTrained(kind));
        };

        let breaker = &self.breakers[&kind];
        breaker.check()?;

        let budget = Duration::from_secs(self.config.resilience.prediction_timeout_secs);
        match timeout(budget, model.recommend(ctx)).await {
            Ok(Ok(scores)) => {
                breaker.record_success();
                Ok(scores)
            }
            Ok(Err(err)) if err.is_data_insufficiency() => Err(err),
            Ok(Err(err)) => {
                breaker.record_failure();
                self.error_log.record(
                    &format!("recommend/{}", kind),
                    &format!("user_id={}", ctx.user_id),
                    &err,
                );
                warn!(model = %kind, error = %err, "model invocation failed");
                Err(err)
            }
            Err(_) => {
                let err = EngineError::Prediction(format!(
                    "{} inference exceeded {}s budget",
                    kind,
                    budget.as_secs()
                ));
                breaker.record_failure();
                self.error_log.record(
                    &format!("recommend/{}", kind),
                    &format!("user_id={}", ctx.user_id),
                    &err,
                );
                warn!(model = %kind, "model invocation timed out");
                Err(err)
            }
        }
    }

    /// Record an interaction. Click, purchase, and rating events also
    /// enrich the recommendation log so the performance report reflects
    /// served-list outcomes.
    pub fn track_interaction(
        &self,
        user_id: Uuid,
        policy_id: Uuid,
        kind: InteractionKind,
        value: f64,
        session_id: Option<String>,
    ) -> EngineResult<InteractionEvent> {
        validate_interaction_value(kind, value)
            .map_err(|e| EngineError::InvalidInput(e.to_string()))?;

        let mut event = InteractionEvent::new(user_id, policy_id, kind, value);
        if let Some(session_id) = session_id {
            event = event.with_session(session_id);
        }
        self.interactions.record(event.clone());

        match kind {
            InteractionKind::Click => {
                self.recommendation_log.mark_clicked(user_id, policy_id);
            }
            InteractionKind::Purchase => {
                self.recommendation_log.mark_purchased(user_id, policy_id);
            }
            InteractionKind::Rate | InteractionKind::Feedback => {
                self.recommendation_log.rate(user_id, policy_id, value);
            }
            _ => {}
        }

        Ok(event)
    }

    /// Catalog neighbors of a policy, scored on type, premium closeness,
    /// and age-range overlap. Unknown policy yields an empty list.
    pub fn similar_policies(&self, policy_id: Uuid, limit: usize) -> Vec<SimilarPolicy> {
        let Some(base) = self.policies.get(policy_id) else {
            debug!(policy_id = %policy_id, "similar-policies request for unknown policy");
            return Vec::new();
        };

        let mut similar: Vec<SimilarPolicy> = self
            .policies
            .all()
            .into_iter()
            .filter(|p| p.id != base.id)
            .map(|candidate| score_similarity(&base, &candidate))
            .filter(|s| s.similarity_score >= SIMILARITY_THRESHOLD)
            .collect();

        similar.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.policy_id.cmp(&b.policy_id))
        });
        similar.truncate(limit);
        similar
    }

    pub fn user_insights(&self, user_id: Uuid) -> UserInsights {
        let user = self.users.get(user_id);
        UserInsights {
            user_id,
            profile_completeness: user.as_ref().map(profile_completeness).unwrap_or(0.0),
            profile_known: user.is_some(),
            interactions: self.interactions.summarize(user_id),
        }
    }

    pub fn performance_report(&self) -> PerformanceReport {
        let (total, clicked, purchased) = self.recommendation_log.outcome_counts();
        let rate = |count: usize| {
            if total > 0 {
                count as f64 / total as f64
            } else {
                0.0
            }
        };

        PerformanceReport {
            total_recommendations: total,
            clicked,
            purchased,
            click_rate: rate(clicked),
            conversion_rate: rate(purchased),
            interactions_total: self.interactions.len(),
            interactions_by_kind: self.interactions.counts_by_kind(),
        }
    }

    /// Breaker state for diagnostics ("closed", "open", "half_open").
    pub fn breaker_state(&self, kind: ModelKind) -> &'static str {
        self.breakers[&kind].state_name()
    }

    pub fn health_check(&self) -> HealthReport {
        let users = self.users.all();
        let completeness = if users.is_empty() {
            None
        } else {
            Some(
                users.iter().map(profile_completeness).sum::<f64>() / users.len() as f64,
            )
        };

        let snapshot = HealthSnapshot {
            active_models: self.registry.active_kinds(),
            interaction_count: self.interactions.len(),
            policy_count: self.policies.len(),
            user_count: users.len(),
            profile_completeness: completeness,
            // The stores are process-local; reaching this code means they
            // are reachable.
            storage_ok: true,
        };
        self.health.report(&snapshot)
    }
}

/// Explanation text for one blended recommendation: up to two clauses
/// drawn from profile matches, padded with a confidence qualifier.
fn build_explanation(user: Option<&UserProfile>, policy: &Policy, combined: f64) -> String {
    let mut clauses: Vec<String> = Vec::new();

    if let Some(user) = user {
        if let Some(age) = user.age {
            if policy.covers_age(age) {
                clauses.push(format!(
                    "Matches your age group ({}-{})",
                    policy.min_age, policy.max_age
                ));
            }
        }
        if let Some(occupation) = user.occupation.as_deref() {
            clauses.push(format!("Tailored for {} professionals", occupation));
        }
        if let Some(lifestyle) = user.lifestyle.as_deref() {
            clauses.push(format!("Fits your {} lifestyle", lifestyle));
        }
    }

    let qualifier = if combined > 0.8 {
        "High confidence recommendation"
    } else if combined >= 0.6 {
        "Good match for your needs"
    } else {
        "Potential match worth considering"
    };
    clauses.push(qualifier.to_string());

    clauses.truncate(2);
    format!("{}.", clauses.join(". "))
}

fn score_similarity(base: &Policy, candidate: &Policy) -> SimilarPolicy {
    let mut similarity = 0.0;
    let mut reasons: Vec<&str> = Vec::new();

    if base.policy_type == candidate.policy_type {
        similarity += 0.5;
        reasons.push("same coverage category");
    }

    let max_premium = base.premium.max(candidate.premium);
    if max_premium > 0.0 {
        let closeness = 1.0 - (base.premium - candidate.premium).abs() / max_premium;
        similarity += 0.3 * closeness;
        if closeness > 0.8 {
            reasons.push("comparable premium");
        }
    }

    let overlap_start = base.min_age.max(candidate.min_age);
    let overlap_end = base.max_age.min(candidate.max_age);
    if overlap_end > overlap_start {
        let span = (base.max_age.max(candidate.max_age) - base.min_age.min(candidate.min_age)).max(1);
        let fraction = (overlap_end - overlap_start) as f64 / span as f64;
        similarity += 0.2 * fraction;
        if fraction > 0.5 {
            reasons.push("overlapping age eligibility");
        }
    }

    if reasons.is_empty() {
        reasons.push("similar overall characteristics");
    }

    SimilarPolicy {
        policy_id: candidate.id,
        similarity_score: similarity,
        reason: reasons.join("; "),
    }
}
