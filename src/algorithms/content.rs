use crate::algorithms::{rank_descending, ScoringContext, ScoringModel};
use crate::config::ContentConfig;
use crate::error::{EngineError, EngineResult};
use crate::features::TfidfVectorizer;
use crate::models::{ModelKind, Policy, PolicyFeatureRecord};
use crate::utils::cosine_similarity;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

pub const CONTENT_ALGORITHM: &str = "tfidf";

/// Content-based filter over policy text. Training is vectorization: fit the
/// vocabulary once over the catalog and keep one term-weight vector per
/// policy. Prediction builds an interaction-weighted profile vector for the
/// user and ranks other policies by cosine similarity.
#[derive(Debug, Clone)]
pub struct ContentModel {
    vectorizer: TfidfVectorizer,
    policy_ids: Vec<Uuid>,
    vectors: Vec<Vec<f64>>,
    index: HashMap<Uuid, usize>,
}

impl ContentModel {
    pub fn fit(policies: &[Policy], config: &ContentConfig) -> EngineResult<Self> {
        if policies.is_empty() {
            return Err(EngineError::InsufficientData(
                "no policies available for feature extraction".to_string(),
            ));
        }

        let documents: Vec<String> = policies.iter().map(|p| p.feature_text()).collect();
        let mut vectorizer = TfidfVectorizer::new(
            config.max_terms,
            config.min_document_frequency,
            config.max_document_fraction,
        );
        vectorizer.fit(&documents);

        let policy_ids: Vec<Uuid> = policies.iter().map(|p| p.id).collect();
        let vectors: Vec<Vec<f64>> = documents.iter().map(|d| vectorizer.transform(d)).collect();
        let index = policy_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        info!(
            policies = policy_ids.len(),
            vocabulary = vectorizer.vocabulary_size(),
            "content-based filtering model trained"
        );

        Ok(Self { vectorizer, policy_ids, vectors, index })
    }

    /// Per-policy feature records for persistence, tagged with the
    /// vectorization algorithm so runs can coexist.
    pub fn feature_records(&self) -> Vec<PolicyFeatureRecord> {
        self.policy_ids
            .iter()
            .zip(self.vectors.iter())
            .map(|(policy_id, weights)| PolicyFeatureRecord {
                policy_id: *policy_id,
                algorithm: CONTENT_ALGORITHM.to_string(),
                terms: self.vectorizer.terms.clone(),
                weights: weights.clone(),
                computed_at: Utc::now(),
            })
            .collect()
    }

    pub fn vector_for(&self, policy_id: Uuid) -> Option<&[f64]> {
        self.index.get(&policy_id).map(|i| self.vectors[*i].as_slice())
    }
}

#[async_trait::async_trait]
impl ScoringModel for ContentModel {
    fn kind(&self) -> ModelKind {
        ModelKind::ContentBased
    }

    async fn recommend(&self, ctx: &ScoringContext<'_>) -> EngineResult<Vec<(Uuid, f64)>> {
        if ctx.interactions.is_empty() {
            debug!(user_id = %ctx.user_id, "no interaction history, skipping content scores");
            return Ok(Vec::new());
        }

        let weighted: Vec<(&[f64], f64)> = ctx
            .interactions
            .iter()
            .filter_map(|event| {
                self.vector_for(event.policy_id)
                    .map(|vector| (vector, event.weighted_value))
            })
            .collect();

        let dim = self.vectorizer.vocabulary_size();
        let profile = crate::utils::weighted_average(&weighted, dim);
        if profile.iter().all(|v| *v == 0.0) {
            // Dismiss-heavy histories cancel out: no usable profile.
            return Ok(Vec::new());
        }

        let interacted = ctx.interacted_policies();
        let scored: Vec<(Uuid, f64)> = self
            .policy_ids
            .iter()
            .zip(self.vectors.iter())
            .filter(|(id, _)| !interacted.contains(id))
            .map(|(id, vector)| (*id, cosine_similarity(&profile, vector)))
            .filter(|(_, similarity)| *similarity > 0.0)
            .collect();

        Ok(rank_descending(scored))
    }
}
