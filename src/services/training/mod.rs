use crate::algorithms::{CollaborativeModel, ContentModel, HybridModel};
use crate::config::Config;
use crate::error::EngineResult;
use crate::features::{encode_pair, InteractionMatrix};
use crate::models::{ModelKind, TrainedModelMeta, TrainingOutcome, TrainingReport};
use crate::resilience::{CircuitBreaker, ErrorLog};
use crate::services::store::{
    InteractionStore, ModelRegistry, PolicyFeatureStore, PolicyStore, UserStore,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Explicitly triggered training job. Fits all three models from one
/// snapshot of the interaction log and swaps each into the registry only
/// on success, so a failed retrain leaves the serving model untouched.
pub struct TrainingService {
    users: Arc<UserStore>,
    policies: Arc<PolicyStore>,
    interactions: Arc<InteractionStore>,
    registry: Arc<ModelRegistry>,
    features: Arc<PolicyFeatureStore>,
    error_log: Arc<ErrorLog>,
    breaker: Arc<CircuitBreaker>,
    config: Config,
}

impl TrainingService {
    pub fn new(
        config: Config,
        users: Arc<UserStore>,
        policies: Arc<PolicyStore>,
        interactions: Arc<InteractionStore>,
        registry: Arc<ModelRegistry>,
        features: Arc<PolicyFeatureStore>,
        error_log: Arc<ErrorLog>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            "training",
            config.resilience.failure_threshold,
            Duration::from_secs(config.resilience.recovery_timeout_secs),
        ));
        Self {
            users,
            policies,
            interactions,
            registry,
            features,
            error_log,
            breaker,
            config,
        }
    }

    /// Train and activate every model kind. Data-insufficiency on a single
    /// model is an expected outcome reported in the details, not a job
    /// failure; only operational fit failures count against the training
    /// breaker.
    pub fn train_all_models(&self) -> EngineResult<TrainingReport> {
        self.breaker.check()?;

        let started_at = Utc::now();
        let events = self.interactions.all();
        let policies = self.policies.all();
        info!(
            interactions = events.len(),
            policies = policies.len(),
            "training run started"
        );

        let mut details = Vec::new();
        let mut operational_failure = false;

        // Collaborative: truncated SVD over the interaction matrix.
        let matrix = InteractionMatrix::build(&events);
        match CollaborativeModel::fit(&matrix, self.config.collaborative.max_components) {
            Ok(model) => {
                let meta = self.meta(ModelKind::Collaborative, events.len(), None, None);
                self.registry.activate(Arc::new(model), meta);
                details.push(outcome(ModelKind::Collaborative, true, "trained"));
            }
            Err(err) => {
                operational_failure |=
                    self.note_failure(ModelKind::Collaborative, &err, &mut details);
            }
        }

        // Content: vocabulary fit plus persistence of per-policy vectors.
        match ContentModel::fit(&policies, &self.config.content) {
            Ok(model) => {
                self.features.upsert_all(model.feature_records());
                let meta = self.meta(ModelKind::ContentBased, policies.len(), None, None);
                self.registry.activate(Arc::new(model), meta);
                details.push(outcome(ModelKind::ContentBased, true, "trained"));
            }
            Err(err) => {
                operational_failure |=
                    self.note_failure(ModelKind::ContentBased, &err, &mut details);
            }
        }

        // Hybrid: supervised regression over [user | policy] pairs.
        let (rows, targets) = self.hybrid_training_set(&events, &policies);
        match HybridModel::fit(rows, targets, &self.config.hybrid) {
            Ok(model) => {
                let meta = self.meta(
                    ModelKind::Hybrid,
                    model.training_set_size,
                    Some(model.mse),
                    Some(model.mae),
                );
                self.registry.activate(Arc::new(model), meta);
                details.push(outcome(ModelKind::Hybrid, true, "trained"));
            }
            Err(err) => {
                operational_failure |= self.note_failure(ModelKind::Hybrid, &err, &mut details);
            }
        }

        if operational_failure {
            self.breaker.record_failure();
        } else {
            self.breaker.record_success();
        }

        let models_trained = details.iter().filter(|d| d.trained).count();
        info!(
            models_trained,
            models_attempted = details.len(),
            "training run finished"
        );

        Ok(TrainingReport {
            models_trained,
            models_attempted: details.len(),
            details,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Training rows for the hybrid model: one row per interaction whose
    /// user and policy are both known, targeting the weighted value.
    fn hybrid_training_set(
        &self,
        events: &[crate::models::InteractionEvent],
        policies: &[crate::models::Policy],
    ) -> (Vec<Vec<f64>>, Vec<f64>) {
        let users: HashMap<Uuid, crate::models::UserProfile> =
            self.users.all().into_iter().map(|u| (u.id, u)).collect();
        let policy_index: HashMap<Uuid, &crate::models::Policy> =
            policies.iter().map(|p| (p.id, p)).collect();

        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for event in events {
            let (Some(user), Some(policy)) = (
                users.get(&event.user_id),
                policy_index.get(&event.policy_id),
            ) else {
                continue;
            };
            rows.push(encode_pair(user, policy));
            targets.push(event.weighted_value);
        }
        (rows, targets)
    }

    fn meta(
        &self,
        kind: ModelKind,
        training_set_size: usize,
        mse: Option<f64>,
        mae: Option<f64>,
    ) -> TrainedModelMeta {
        TrainedModelMeta {
            name: format!("{}_{}", kind, Utc::now().format("%Y%m%d%H%M%S")),
            kind,
            training_set_size,
            mse,
            mae,
            trained_at: Utc::now(),
        }
    }

    /// Returns true when the failure is operational rather than expected
    /// data sparsity.
    fn note_failure(
        &self,
        kind: ModelKind,
        err: &crate::error::EngineError,
        details: &mut Vec<TrainingOutcome>,
    ) -> bool {
        details.push(outcome(kind, false, &err.to_string()));
        if err.is_data_insufficiency() {
            info!(model = %kind, error = %err, "model skipped, not enough data");
            false
        } else {
            warn!(model = %kind, error = %err, "model training failed");
            self.error_log
                .record(&format!("train/{}", kind), "", err);
            true
        }
    }
}

fn outcome(kind: ModelKind, trained: bool, detail: &str) -> TrainingOutcome {
    TrainingOutcome {
        kind,
        trained,
        detail: detail.to_string(),
    }
}
