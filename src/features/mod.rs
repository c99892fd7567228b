use crate::models::{InteractionEvent, Policy, UserProfile};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;
use uuid::Uuid;

/// User x policy matrix of summed weighted interaction values, together with
/// the ID lists captured at build time. An index position is only meaningful
/// relative to the same build, so the lists travel with every model trained
/// from this matrix.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    pub matrix: Array2<f64>,
    pub user_ids: Vec<Uuid>,
    pub policy_ids: Vec<Uuid>,
}

impl InteractionMatrix {
    pub fn build(events: &[InteractionEvent]) -> Self {
        if events.is_empty() {
            warn!("no interaction data available, building empty matrix");
            return Self {
                matrix: Array2::zeros((0, 0)),
                user_ids: Vec::new(),
                policy_ids: Vec::new(),
            };
        }

        // BTreeMap keys give a stable, sorted index order.
        let mut user_index: BTreeMap<Uuid, usize> = BTreeMap::new();
        let mut policy_index: BTreeMap<Uuid, usize> = BTreeMap::new();
        for event in events {
            let next = user_index.len();
            user_index.entry(event.user_id).or_insert(next);
            let next = policy_index.len();
            policy_index.entry(event.policy_id).or_insert(next);
        }

        let user_ids: Vec<Uuid> = user_index.keys().copied().collect();
        let policy_ids: Vec<Uuid> = policy_index.keys().copied().collect();
        let user_pos: HashMap<Uuid, usize> =
            user_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let policy_pos: HashMap<Uuid, usize> =
            policy_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut matrix = Array2::zeros((user_ids.len(), policy_ids.len()));
        for event in events {
            let row = user_pos[&event.user_id];
            let col = policy_pos[&event.policy_id];
            matrix[[row, col]] += event.weighted_value;
        }

        Self { matrix, user_ids, policy_ids }
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    pub fn user_row(&self, user_id: Uuid) -> Option<usize> {
        self.user_ids.iter().position(|id| *id == user_id)
    }
}

/// Document-frequency weighted term vectorizer. The vocabulary is fit once
/// per training run and then frozen: transforming unseen text ignores new
/// terms instead of erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    pub terms: Vec<String>,
    term_index: HashMap<String, usize>,
    idf: Vec<f64>,
    max_terms: usize,
    min_document_frequency: usize,
    max_document_fraction: f64,
}

impl TfidfVectorizer {
    pub fn new(max_terms: usize, min_document_frequency: usize, max_document_fraction: f64) -> Self {
        Self {
            terms: Vec::new(),
            term_index: HashMap::new(),
            idf: Vec::new(),
            max_terms,
            min_document_frequency,
            max_document_fraction,
        }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.len() >= 2)
            .map(|token| token.to_string())
            .collect()
    }

    /// Fit the vocabulary and IDF weights over a document corpus. Terms below
    /// the minimum document frequency or above the maximum document fraction
    /// are excluded; the vocabulary is capped at `max_terms`, keeping the
    /// most frequent terms.
    pub fn fit(&mut self, documents: &[String]) {
        let n_docs = documents.len();
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();

        for doc in documents {
            let mut seen: Vec<String> = Self::tokenize(doc);
            seen.sort();
            seen.dedup();
            for term in seen {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let max_df = (self.max_document_fraction * n_docs as f64).floor() as usize;
        let mut candidates: Vec<(String, usize)> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df >= self.min_document_frequency && *df <= max_df.max(1))
            .collect();

        // Most frequent terms first when trimming to the cap, then
        // alphabetical for a deterministic vocabulary.
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(self.max_terms);
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        self.terms = candidates.iter().map(|(t, _)| t.clone()).collect();
        self.term_index = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        self.idf = candidates
            .iter()
            .map(|(_, df)| (((1 + n_docs) as f64) / ((1 + df) as f64)).ln() + 1.0)
            .collect();
    }

    /// Transform text into an L2-normalized term-weight vector over the
    /// fitted vocabulary. Terms not seen during fit are dropped.
    pub fn transform(&self, text: &str) -> Vec<f64> {
        let mut vector = vec![0.0; self.terms.len()];
        for token in Self::tokenize(text) {
            if let Some(&i) = self.term_index.get(&token) {
                vector[i] += self.idf[i];
            }
        }
        crate::utils::normalize_vector(&mut vector);
        vector
    }

    pub fn vocabulary_size(&self) -> usize {
        self.terms.len()
    }
}

// Bucket lists for the fixed-order one-hot encodings. Order is part of the
// model contract: a trained hybrid model is only valid against vectors built
// with the same layout.
const OCCUPATIONS: &[&str] = &[
    "construction", "office", "teacher", "healthcare", "student", "manager",
];
const LIFESTYLES: &[&str] = &["active", "sedentary", "moderate", "family-oriented", "professional"];
const HEALTH_STATUSES: &[&str] = &["excellent", "good", "fair", "poor", "smoker", "non-smoker"];
const MARITAL_STATUSES: &[&str] = &["single", "married", "divorced", "widowed"];
const POLICY_TYPES: &[&str] = &["health", "life", "auto", "home", "travel", "business"];
const RISK_LEVELS: &[&str] = &["low", "medium", "high"];

fn one_hot(value: Option<&str>, buckets: &[&str], features: &mut Vec<f64>) {
    let value = value.map(|v| v.to_lowercase());
    for bucket in buckets {
        let hit = value.as_deref() == Some(*bucket);
        features.push(if hit { 1.0 } else { 0.0 });
    }
}

fn income_ordinal(income: Option<&str>) -> f64 {
    match income.map(|v| v.to_lowercase()).as_deref() {
        Some("under_1m") => 1.0,
        Some("1m_3m") => 2.0,
        Some("3m_5m") => 3.0,
        Some("5m_10m") => 4.0,
        Some("10m_20m") => 5.0,
        Some("over_20m") => 6.0,
        _ => 1.0,
    }
}

fn risk_tolerance_ordinal(risk: Option<&str>) -> f64 {
    match risk.map(|v| v.to_lowercase()).as_deref() {
        Some("conservative") => 1.0,
        Some("aggressive") => 3.0,
        _ => 2.0,
    }
}

/// Fixed-order numeric encoding of a user profile. Missing attributes fall
/// back to neutral defaults so encoding never fails.
pub fn encode_user(user: &UserProfile) -> Vec<f64> {
    let mut features = Vec::with_capacity(user_feature_len());

    features.push(user.age.unwrap_or(25) as f64);
    one_hot(user.occupation.as_deref(), OCCUPATIONS, &mut features);
    one_hot(user.lifestyle.as_deref(), LIFESTYLES, &mut features);
    one_hot(user.health_status.as_deref(), HEALTH_STATUSES, &mut features);
    one_hot(user.marital_status.as_deref(), MARITAL_STATUSES, &mut features);
    features.push(income_ordinal(user.annual_income.as_deref()));
    features.push(risk_tolerance_ordinal(user.risk_tolerance.as_deref()));
    features.push(user.dependents.unwrap_or(0) as f64);

    let owns_vehicle = user
        .vehicle_ownership
        .as_deref()
        .map(|v| !v.eq_ignore_ascii_case("none"))
        .unwrap_or(false);
    features.push(if owns_vehicle { 1.0 } else { 0.0 });

    let smoker = user
        .smoking_status
        .as_deref()
        .map(|v| v.eq_ignore_ascii_case("current"))
        .unwrap_or(false);
    features.push(if smoker { 1.0 } else { 0.0 });

    let exercises = matches!(
        user.exercise_habits.as_deref().map(|v| v.to_lowercase()).as_deref(),
        Some("regularly") | Some("daily")
    );
    features.push(if exercises { 1.0 } else { 0.0 });

    features
}

pub fn user_feature_len() -> usize {
    1 + OCCUPATIONS.len() + LIFESTYLES.len() + HEALTH_STATUSES.len() + MARITAL_STATUSES.len() + 6
}

/// Fixed-order numeric encoding of a policy.
pub fn encode_policy(policy: &Policy) -> Vec<f64> {
    let mut features = Vec::with_capacity(policy_feature_len());

    features.push(policy.premium);
    features.push(policy.min_age as f64);
    features.push(policy.max_age as f64);
    one_hot(Some(&policy.policy_type), POLICY_TYPES, &mut features);
    one_hot(Some(&policy.risk_level), RISK_LEVELS, &mut features);

    features
}

pub fn policy_feature_len() -> usize {
    3 + POLICY_TYPES.len() + RISK_LEVELS.len()
}

/// Concatenated [user | policy] vector for the hybrid model.
pub fn encode_pair(user: &UserProfile, policy: &Policy) -> Vec<f64> {
    let mut features = encode_user(user);
    features.extend(encode_policy(policy));
    features
}

/// Column-wise standardization fitted on the training split only and reused
/// unchanged at inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len().max(1) as f64;

        let mut mean = vec![0.0; dim];
        for row in rows {
            for (i, v) in row.iter().enumerate() {
                mean[i] += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut std = vec![0.0; dim];
        for row in rows {
            for (i, v) in row.iter().enumerate() {
                std[i] += (v - mean[i]) * (v - mean[i]);
            }
        }
        for s in std.iter_mut() {
            *s = (*s / n).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Self { mean, std }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(i, v)| (v - self.mean[i]) / self.std[i])
            .collect()
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

/// Deterministic train/validation split. Indices are shuffled with the given
/// seed so repeated training runs see the same partition.
pub fn train_validation_split(
    n: usize,
    validation_fraction: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_validation = ((n as f64) * validation_fraction).round() as usize;
    let n_validation = n_validation.min(n.saturating_sub(1));
    let validation = indices.split_off(n - n_validation);
    (indices, validation)
}
