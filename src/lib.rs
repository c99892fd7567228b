pub mod algorithms;
pub mod config;
pub mod error;
pub mod features;
pub mod models;
pub mod resilience;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use models::*;

use anyhow::Result;
use resilience::ErrorLog;
use services::recommendation::RecommendationService;
use services::store::{
    InteractionStore, ModelRegistry, PolicyFeatureStore, PolicyStore, RecommendationLogStore,
    UserStore,
};
use services::training::TrainingService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub users: Arc<UserStore>,
    pub policies: Arc<PolicyStore>,
    pub interactions: Arc<InteractionStore>,
    pub registry: Arc<ModelRegistry>,
    pub features: Arc<PolicyFeatureStore>,
    pub recommendation_log: Arc<RecommendationLogStore>,
    pub error_log: Arc<ErrorLog>,
    pub recommendation_service: Arc<RecommendationService>,
    pub training_service: Arc<TrainingService>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let users = Arc::new(UserStore::default());
        let policies = Arc::new(PolicyStore::default());
        let interactions = Arc::new(InteractionStore::default());
        let registry = Arc::new(ModelRegistry::default());
        let features = Arc::new(PolicyFeatureStore::default());
        let recommendation_log = Arc::new(RecommendationLogStore::default());
        let error_log = Arc::new(ErrorLog::new(config.resilience.error_log_capacity));

        let recommendation_service = Arc::new(RecommendationService::new(
            config.clone(),
            users.clone(),
            policies.clone(),
            interactions.clone(),
            registry.clone(),
            recommendation_log.clone(),
            error_log.clone(),
        ));

        let training_service = Arc::new(TrainingService::new(
            config.clone(),
            users.clone(),
            policies.clone(),
            interactions.clone(),
            registry.clone(),
            features.clone(),
            error_log.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            users,
            policies,
            interactions,
            registry,
            features,
            recommendation_log,
            error_log,
            recommendation_service,
            training_service,
        })
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
