use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A single user-policy interaction event. Append-only: once recorded it is
/// never mutated, so the training log doubles as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub policy_id: Uuid,
    pub kind: InteractionKind,
    pub raw_value: f64,
    pub weighted_value: f64,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Click,
    AddToCart,
    Rate,
    Purchase,
    Dismiss,
    ApiCall,
    Feedback,
}

impl InteractionKind {
    /// Weight applied to the raw interaction value when deriving the
    /// training signal. Dismissals count against a policy.
    pub fn weight(&self) -> f64 {
        match self {
            InteractionKind::View => 1.0,
            InteractionKind::Click => 2.0,
            InteractionKind::AddToCart => 3.0,
            InteractionKind::Rate => 4.0,
            InteractionKind::Purchase => 5.0,
            InteractionKind::Dismiss => -1.0,
            InteractionKind::ApiCall => 1.0,
            InteractionKind::Feedback => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Click => "click",
            InteractionKind::AddToCart => "add_to_cart",
            InteractionKind::Rate => "rate",
            InteractionKind::Purchase => "purchase",
            InteractionKind::Dismiss => "dismiss",
            InteractionKind::ApiCall => "api_call",
            InteractionKind::Feedback => "feedback",
        }
    }
}

impl InteractionEvent {
    pub fn new(user_id: Uuid, policy_id: Uuid, kind: InteractionKind, raw_value: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            policy_id,
            kind,
            raw_value,
            weighted_value: raw_value * kind.weight(),
            timestamp: Utc::now(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Demographic profile consumed by the hybrid model and the fallback
/// recommender. All fields are optional; encoders substitute neutral
/// defaults for anything missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub age: Option<u32>,
    pub occupation: Option<String>,
    pub lifestyle: Option<String>,
    pub health_status: Option<String>,
    pub marital_status: Option<String>,
    pub annual_income: Option<String>,
    pub risk_tolerance: Option<String>,
    pub dependents: Option<u32>,
    pub vehicle_ownership: Option<String>,
    pub smoking_status: Option<String>,
    pub exercise_habits: Option<String>,
}

impl UserProfile {
    pub fn new(id: Uuid) -> Self {
        Self { id, ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub id: Uuid,
    pub name: String,
    pub policy_type: String,
    pub premium: f64,
    pub coverage: String,
    pub min_age: u32,
    pub max_age: u32,
    pub risk_level: String,
}

impl Policy {
    /// Concatenated text fields consumed by the content vectorizer.
    pub fn feature_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.name, self.coverage, self.policy_type, self.risk_level
        )
    }

    pub fn covers_age(&self, age: u32) -> bool {
        self.min_age <= age && age <= self.max_age
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Collaborative,
    ContentBased,
    Hybrid,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Collaborative => write!(f, "collaborative"),
            ModelKind::ContentBased => write!(f, "content_based"),
            ModelKind::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Metadata for a trained model version. The registry keeps at most one
/// active entry per kind; training produces a fresh entry and swaps it in
/// only after the fit succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModelMeta {
    pub name: String,
    pub kind: ModelKind,
    pub training_set_size: usize,
    pub mse: Option<f64>,
    pub mae: Option<f64>,
    pub trained_at: DateTime<Utc>,
}

/// Persisted per-policy term-weight vector, keyed by (policy_id, algorithm)
/// so vectors from different vectorization runs can coexist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyFeatureRecord {
    pub policy_id: Uuid,
    pub algorithm: String,
    pub terms: Vec<String>,
    pub weights: Vec<f64>,
    pub computed_at: DateTime<Utc>,
}

/// A recommendation as served to the caller. `score` is the display score
/// clamped to [0, 100]; `confidence` stays in [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub policy_id: Uuid,
    pub score: f64,
    pub reason: String,
    pub algorithm: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationLogEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub policy_id: Uuid,
    pub score: f64,
    pub algorithm: String,
    pub position_in_list: usize,
    pub was_clicked: bool,
    pub was_purchased: bool,
    pub user_rating: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarPolicy {
    pub policy_id: Uuid,
    pub similarity_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionSummary {
    pub total_interactions: usize,
    pub counts_by_kind: HashMap<String, usize>,
    pub average_rating: Option<f64>,
    pub most_interacted_policies: Vec<(Uuid, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: HashMap<String, String>,
    pub recommendations: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub models_trained: usize,
    pub models_attempted: usize,
    pub details: Vec<TrainingOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub kind: ModelKind,
    pub trained: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_recommendations: usize,
    pub clicked: usize,
    pub purchased: usize,
    pub click_rate: f64,
    pub conversion_rate: f64,
    pub interactions_total: usize,
    pub interactions_by_kind: HashMap<String, usize>,
}
