use crate::algorithms::ScoringModel;
use crate::models::{
    InteractionEvent, InteractionSummary, ModelKind, Policy, PolicyFeatureRecord,
    RecommendationLogEntry, TrainedModelMeta, UserProfile,
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// User profile catalog.
#[derive(Debug, Default)]
pub struct UserStore {
    users: DashMap<Uuid, UserProfile>,
}

impl UserStore {
    pub fn upsert(&self, user: UserProfile) {
        self.users.insert(user.id, user);
    }

    pub fn get(&self, id: Uuid) -> Option<UserProfile> {
        self.users.get(&id).map(|u| u.clone())
    }

    pub fn all(&self) -> Vec<UserProfile> {
        self.users.iter().map(|u| u.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Policy catalog.
#[derive(Debug, Default)]
pub struct PolicyStore {
    policies: DashMap<Uuid, Policy>,
}

impl PolicyStore {
    pub fn upsert(&self, policy: Policy) {
        self.policies.insert(policy.id, policy);
    }

    pub fn get(&self, id: Uuid) -> Option<Policy> {
        self.policies.get(&id).map(|p| p.clone())
    }

    pub fn all(&self) -> Vec<Policy> {
        let mut all: Vec<Policy> = self.policies.iter().map(|p| p.clone()).collect();
        all.sort_by_key(|p| p.id);
        all
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Append-only interaction log. Events are never rewritten after insert;
/// weighting happens at construction time in `InteractionEvent::new`.
#[derive(Debug, Default)]
pub struct InteractionStore {
    events: RwLock<Vec<InteractionEvent>>,
}

impl InteractionStore {
    pub fn record(&self, event: InteractionEvent) {
        debug!(
            user_id = %event.user_id,
            policy_id = %event.policy_id,
            kind = event.kind.as_str(),
            weighted_value = event.weighted_value,
            "interaction recorded"
        );
        self.events.write().push(event);
    }

    pub fn all(&self) -> Vec<InteractionEvent> {
        self.events.read().clone()
    }

    pub fn for_user(&self, user_id: Uuid) -> Vec<InteractionEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Aggregate view of one user's history, for the insights endpoint.
    pub fn summarize(&self, user_id: Uuid) -> InteractionSummary {
        let events = self.for_user(user_id);

        let mut counts_by_kind: HashMap<String, usize> = HashMap::new();
        let mut per_policy: HashMap<Uuid, usize> = HashMap::new();
        let mut rating_sum = 0.0;
        let mut rating_count = 0usize;

        for event in &events {
            *counts_by_kind
                .entry(event.kind.as_str().to_string())
                .or_default() += 1;
            *per_policy.entry(event.policy_id).or_default() += 1;
            if event.kind == crate::models::InteractionKind::Rate {
                rating_sum += event.raw_value;
                rating_count += 1;
            }
        }

        let mut most_interacted_policies: Vec<(Uuid, usize)> = per_policy.into_iter().collect();
        most_interacted_policies.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_interacted_policies.truncate(5);

        InteractionSummary {
            total_interactions: events.len(),
            counts_by_kind,
            average_rating: (rating_count > 0).then(|| rating_sum / rating_count as f64),
            most_interacted_policies,
        }
    }

    pub fn counts_by_kind(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for event in self.events.read().iter() {
            *counts.entry(event.kind.as_str().to_string()).or_default() += 1;
        }
        counts
    }
}

/// Persisted policy term-weight vectors, keyed by (policy_id, algorithm).
/// Re-vectorizing under the same algorithm replaces the previous record.
#[derive(Debug, Default)]
pub struct PolicyFeatureStore {
    records: DashMap<(Uuid, String), PolicyFeatureRecord>,
}

impl PolicyFeatureStore {
    pub fn upsert(&self, record: PolicyFeatureRecord) {
        self.records
            .insert((record.policy_id, record.algorithm.clone()), record);
    }

    pub fn upsert_all(&self, records: Vec<PolicyFeatureRecord>) {
        for record in records {
            self.upsert(record);
        }
    }

    pub fn get(&self, policy_id: Uuid, algorithm: &str) -> Option<PolicyFeatureRecord> {
        self.records
            .get(&(policy_id, algorithm.to_string()))
            .map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

struct ActiveModel {
    model: Arc<dyn ScoringModel>,
    meta: TrainedModelMeta,
}

/// Active-model registry. Each kind holds at most one model; `activate`
/// swaps the Arc atomically under the lock, so in-flight requests finish
/// against the snapshot they already cloned while new requests see the
/// fresh model. A failed retrain never reaches `activate` and therefore
/// never clobbers a serving model.
#[derive(Default)]
pub struct ModelRegistry {
    active: RwLock<HashMap<ModelKind, ActiveModel>>,
}

impl ModelRegistry {
    pub fn activate(&self, model: Arc<dyn ScoringModel>, meta: TrainedModelMeta) {
        debug!(kind = %meta.kind, name = %meta.name, "model activated");
        self.active
            .write()
            .insert(meta.kind, ActiveModel { model, meta });
    }

    pub fn active(&self, kind: ModelKind) -> Option<Arc<dyn ScoringModel>> {
        self.active.read().get(&kind).map(|a| Arc::clone(&a.model))
    }

    pub fn meta(&self, kind: ModelKind) -> Option<TrainedModelMeta> {
        self.active.read().get(&kind).map(|a| a.meta.clone())
    }

    pub fn active_kinds(&self) -> Vec<ModelKind> {
        let mut kinds: Vec<ModelKind> = self.active.read().keys().copied().collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds
    }

    pub fn has_any(&self) -> bool {
        !self.active.read().is_empty()
    }
}

/// Log of recommendations as served, enriched afterwards when the user
/// clicks, purchases, or rates a recommended policy. Feeds the performance
/// report.
#[derive(Debug, Default)]
pub struct RecommendationLogStore {
    entries: RwLock<Vec<RecommendationLogEntry>>,
}

impl RecommendationLogStore {
    pub fn log_served(
        &self,
        user_id: Uuid,
        served: &[crate::models::Recommendation],
    ) {
        let mut entries = self.entries.write();
        for (position, rec) in served.iter().enumerate() {
            entries.push(RecommendationLogEntry {
                id: Uuid::new_v4(),
                user_id,
                policy_id: rec.policy_id,
                score: rec.score,
                algorithm: rec.algorithm.clone(),
                position_in_list: position,
                was_clicked: false,
                was_purchased: false,
                user_rating: None,
                timestamp: Utc::now(),
            });
        }
    }

    /// Marks the most recent matching entry. Returns false when the user
    /// was never served that policy.
    pub fn mark_clicked(&self, user_id: Uuid, policy_id: Uuid) -> bool {
        self.update_latest(user_id, policy_id, |e| e.was_clicked = true)
    }

    pub fn mark_purchased(&self, user_id: Uuid, policy_id: Uuid) -> bool {
        self.update_latest(user_id, policy_id, |e| e.was_purchased = true)
    }

    pub fn rate(&self, user_id: Uuid, policy_id: Uuid, rating: f64) -> bool {
        self.update_latest(user_id, policy_id, |e| e.user_rating = Some(rating))
    }

    fn update_latest(
        &self,
        user_id: Uuid,
        policy_id: Uuid,
        apply: impl FnOnce(&mut RecommendationLogEntry),
    ) -> bool {
        let mut entries = self.entries.write();
        if let Some(entry) = entries
            .iter_mut()
            .rev()
            .find(|e| e.user_id == user_id && e.policy_id == policy_id)
        {
            apply(entry);
            true
        } else {
            false
        }
    }

    /// (total served, clicked, purchased).
    pub fn outcome_counts(&self) -> (usize, usize, usize) {
        let entries = self.entries.read();
        let clicked = entries.iter().filter(|e| e.was_clicked).count();
        let purchased = entries.iter().filter(|e| e.was_purchased).count();
        (entries.len(), clicked, purchased)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
