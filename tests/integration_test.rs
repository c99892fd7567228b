use policyrec::algorithms::{ScoringContext, ScoringModel};
use policyrec::resilience::FALLBACK_ALGORITHM;
use policyrec::services::recommendation::BLEND_ALGORITHM;
use policyrec::*;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

fn test_config() -> Config {
    let mut config = Config::default();
    // Small corpora in tests would otherwise lose every term to the
    // document-frequency floor.
    config.content.min_document_frequency = 1;
    config.hybrid.n_trees = 10;
    config
}

fn seed_policy(name: &str, policy_type: &str, premium: f64) -> Policy {
    Policy {
        id: Uuid::new_v4(),
        name: name.to_string(),
        policy_type: policy_type.to_string(),
        premium,
        coverage: format!("{} standard cover", policy_type),
        min_age: 18,
        max_age: 65,
        risk_level: "low".to_string(),
    }
}

fn seed_user(age: u32, occupation: &str) -> UserProfile {
    let mut user = UserProfile::new(Uuid::new_v4());
    user.age = Some(age);
    user.occupation = Some(occupation.to_string());
    user.lifestyle = Some("active".to_string());
    user
}

fn seed_state() -> AppState {
    let state = AppState::new(test_config()).unwrap();

    let policies = vec![
        seed_policy("Health Basic", "health", 120.0),
        seed_policy("Health Plus", "health", 180.0),
        seed_policy("Life Secure", "life", 250.0),
        seed_policy("Auto Shield", "auto", 90.0),
    ];
    for p in &policies {
        state.policies.upsert(p.clone());
    }

    let users: Vec<UserProfile> = (0..5)
        .map(|i| seed_user(25 + i * 8, if i % 2 == 0 { "office" } else { "teacher" }))
        .collect();
    for u in &users {
        state.users.upsert(u.clone());
    }

    // Enough overlapping history for the SVD and the forest to fit.
    for (i, u) in users.iter().enumerate() {
        for p in policies.iter().take(2 + i % 3) {
            state
                .interactions
                .record(InteractionEvent::new(u.id, p.id, InteractionKind::Purchase, 1.0));
            state
                .interactions
                .record(InteractionEvent::new(u.id, p.id, InteractionKind::View, 1.0));
        }
    }

    state
}

struct FixedModel {
    kind: ModelKind,
    scores: Vec<(Uuid, f64)>,
}

#[async_trait::async_trait]
impl ScoringModel for FixedModel {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    async fn recommend(&self, _ctx: &ScoringContext<'_>) -> EngineResult<Vec<(Uuid, f64)>> {
        Ok(self.scores.clone())
    }
}

struct FailingModel {
    kind: ModelKind,
}

#[async_trait::async_trait]
impl ScoringModel for FailingModel {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    async fn recommend(&self, _ctx: &ScoringContext<'_>) -> EngineResult<Vec<(Uuid, f64)>> {
        Err(EngineError::Prediction("backend unavailable".to_string()))
    }
}

fn meta_for(kind: ModelKind) -> TrainedModelMeta {
    TrainedModelMeta {
        name: format!("{}_test", kind),
        kind,
        training_set_size: 0,
        mse: None,
        mae: None,
        trained_at: Utc::now(),
    }
}

#[tokio::test]
async fn trained_engine_serves_blended_recommendations() {
    let state = seed_state();

    let training = state.training_service.clone();
    let report = tokio::task::spawn_blocking(move || training.train_all_models())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.models_trained, 3);

    let user = seed_user(30, "office");
    state.users.upsert(user.clone());

    let recs = state
        .recommendation_service
        .get_recommendations(user.id, Some(3))
        .await;

    assert!(!recs.is_empty());
    assert!(recs.len() <= 3);
    for rec in &recs {
        assert_eq!(rec.algorithm, BLEND_ALGORITHM);
        assert!(rec.score >= 0.0 && rec.score <= 100.0);
        assert!(rec.confidence >= 0.0 && rec.confidence <= 1.0);
        assert!(rec.reason.ends_with('.'));
        // Never more than two clauses in an explanation.
        assert!(rec.reason.matches(". ").count() <= 1);
    }

    // Serving logged one entry per returned item.
    assert_eq!(state.recommendation_log.len(), recs.len());
}

#[tokio::test]
async fn profile_only_user_gets_hybrid_scores_despite_zero_history() {
    let state = seed_state();
    let training = state.training_service.clone();
    tokio::task::spawn_blocking(move || training.train_all_models())
        .await
        .unwrap()
        .unwrap();

    // Known profile, zero interactions: collaborative and content go
    // cold, the hybrid model still scores.
    let newcomer = seed_user(40, "office");
    state.users.upsert(newcomer.clone());

    let recs = state
        .recommendation_service
        .get_recommendations(newcomer.id, None)
        .await;
    assert!(!recs.is_empty());
    assert!(recs.iter().any(|r| r.algorithm == BLEND_ALGORITHM));
}

#[tokio::test]
async fn untrained_engine_falls_back_instead_of_failing() {
    let state = seed_state();
    let user = seed_user(30, "construction");
    state.users.upsert(user.clone());

    let recs = state
        .recommendation_service
        .get_recommendations(user.id, None)
        .await;

    assert!(!recs.is_empty());
    for rec in &recs {
        assert_eq!(rec.algorithm, FALLBACK_ALGORITHM);
        assert_eq!(rec.confidence, 0.3);
        assert!(rec.score <= 100.0);
    }
    // Age-eligible health policy outranks the rest for construction work.
    let top = state.policies.get(recs[0].policy_id).unwrap();
    assert_eq!(top.policy_type, "health");
}

#[tokio::test]
async fn repeated_failures_open_the_breaker_and_keep_serving_fallback() {
    let state = seed_state();
    let user = seed_user(30, "office");
    state.users.upsert(user.clone());

    state.registry.activate(
        Arc::new(FailingModel { kind: ModelKind::Collaborative }),
        meta_for(ModelKind::Collaborative),
    );

    for _ in 0..6 {
        let recs = state
            .recommendation_service
            .get_recommendations(user.id, None)
            .await;
        assert!(!recs.is_empty());
        assert!(recs.iter().all(|r| r.algorithm == FALLBACK_ALGORITHM));
    }

    assert_eq!(
        state
            .recommendation_service
            .breaker_state(ModelKind::Collaborative),
        "open"
    );
}

#[tokio::test]
async fn single_source_blend_applies_the_model_weight() {
    let state = AppState::new(test_config()).unwrap();
    let policy = seed_policy("Health Basic", "health", 120.0);
    state.policies.upsert(policy.clone());

    state.registry.activate(
        Arc::new(FixedModel {
            kind: ModelKind::Collaborative,
            scores: vec![(policy.id, 0.5)],
        }),
        meta_for(ModelKind::Collaborative),
    );

    let recs = state
        .recommendation_service
        .get_recommendations(Uuid::new_v4(), None)
        .await;

    // collaborative-only hit at raw 0.5: combined 0.4 * 0.5 = 0.2,
    // displayed as 20.
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].policy_id, policy.id);
    assert!((recs[0].score - 20.0).abs() < 1e-9);
    assert!((recs[0].confidence - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn click_and_purchase_feed_the_performance_report() {
    let state = seed_state();
    let training = state.training_service.clone();
    tokio::task::spawn_blocking(move || training.train_all_models())
        .await
        .unwrap()
        .unwrap();

    let user = seed_user(35, "teacher");
    state.users.upsert(user.clone());

    let recs = state
        .recommendation_service
        .get_recommendations(user.id, Some(2))
        .await;
    assert!(!recs.is_empty());

    let picked = recs[0].policy_id;
    state
        .recommendation_service
        .track_interaction(user.id, picked, InteractionKind::Click, 1.0, None)
        .unwrap();
    state
        .recommendation_service
        .track_interaction(user.id, picked, InteractionKind::Purchase, 1.0, None)
        .unwrap();

    let report = state.recommendation_service.performance_report();
    assert_eq!(report.clicked, 1);
    assert_eq!(report.purchased, 1);
    assert!(report.click_rate > 0.0);
    assert!(report.conversion_rate > 0.0);
}

#[tokio::test]
async fn similar_policies_prefer_same_type() {
    let state = seed_state();
    let base = state
        .policies
        .all()
        .into_iter()
        .find(|p| p.name == "Health Basic")
        .unwrap();

    let similar = state.recommendation_service.similar_policies(base.id, 5);
    assert!(!similar.is_empty());
    let top = state.policies.get(similar[0].policy_id).unwrap();
    assert_eq!(top.policy_type, "health");
    assert!(similar[0].reason.contains("same coverage category"));
}

#[tokio::test]
async fn health_report_tracks_training_state() {
    let state = seed_state();

    let before = state.recommendation_service.health_check();
    assert_eq!(before.status, HealthStatus::Degraded);
    assert!(before
        .recommendations
        .iter()
        .any(|r| r.contains("training")));

    let training = state.training_service.clone();
    tokio::task::spawn_blocking(move || training.train_all_models())
        .await
        .unwrap()
        .unwrap();

    let after = state.recommendation_service.health_check();
    assert_eq!(after.status, HealthStatus::Healthy);
    assert_eq!(after.components.get("models").unwrap(), "3 of 3 active");
}

#[tokio::test]
async fn invalid_interaction_values_are_rejected() {
    let state = seed_state();
    let user = seed_user(30, "office");
    state.users.upsert(user.clone());
    let policy_id = state.policies.all()[0].id;

    let err = state
        .recommendation_service
        .track_interaction(user.id, policy_id, InteractionKind::Rate, 9.0, None)
        .unwrap_err();
    assert!(err.to_string().contains("rating"));

    let before = state.interactions.len();
    assert!(state
        .recommendation_service
        .track_interaction(user.id, policy_id, InteractionKind::Rate, 4.5, None)
        .is_ok());
    assert_eq!(state.interactions.len(), before + 1);
}

#[tokio::test]
async fn user_insights_summarize_history_and_profile() {
    let state = seed_state();
    let user = seed_user(30, "office");
    state.users.upsert(user.clone());
    let policy_id = state.policies.all()[0].id;

    state
        .recommendation_service
        .track_interaction(user.id, policy_id, InteractionKind::View, 1.0, None)
        .unwrap();
    state
        .recommendation_service
        .track_interaction(user.id, policy_id, InteractionKind::Rate, 4.0, None)
        .unwrap();

    let insights = state.recommendation_service.user_insights(user.id);
    assert!(insights.profile_known);
    assert!(insights.profile_completeness > 0.0);
    assert_eq!(insights.interactions.total_interactions, 2);
    assert_eq!(insights.interactions.average_rating, Some(4.0));
}
