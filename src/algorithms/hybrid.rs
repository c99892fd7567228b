use crate::algorithms::{rank_descending, ScoringContext, ScoringModel};
use crate::config::HybridConfig;
use crate::error::{EngineError, EngineResult};
use crate::features::{encode_pair, train_validation_split, StandardScaler};
use crate::models::ModelKind;
use crate::utils::{mean_absolute_error, mean_squared_error};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};
use uuid::Uuid;

/// Supervised hybrid model: bagged regression trees over concatenated
/// [user | policy] feature vectors, trained to predict the weighted
/// interaction value. Unlike the other two models it has no cold-start gap;
/// any pair with known attributes can be scored.
#[derive(Debug, Clone)]
pub struct HybridModel {
    forest: RandomForestRegressor,
    scaler: StandardScaler,
    pub mse: f64,
    pub mae: f64,
    pub training_set_size: usize,
}

impl HybridModel {
    pub fn fit(rows: Vec<Vec<f64>>, targets: Vec<f64>, config: &HybridConfig) -> EngineResult<Self> {
        if rows.len() < 2 {
            return Err(EngineError::InsufficientData(format!(
                "{} training rows are not enough for the hybrid model",
                rows.len()
            )));
        }
        debug_assert_eq!(rows.len(), targets.len());

        let (train_idx, validation_idx) =
            train_validation_split(rows.len(), config.validation_fraction, config.random_seed);

        let train_rows: Vec<Vec<f64>> = train_idx.iter().map(|&i| rows[i].clone()).collect();
        let train_targets: Vec<f64> = train_idx.iter().map(|&i| targets[i]).collect();

        // Standardization statistics come from the training split only and
        // are reused unchanged at inference.
        let scaler = StandardScaler::fit(&train_rows);
        let train_scaled = scaler.transform_all(&train_rows);

        let forest = RandomForestRegressor::fit(&train_scaled, &train_targets, config);

        let (eval_rows, eval_targets): (Vec<Vec<f64>>, Vec<f64>) = if validation_idx.is_empty() {
            (train_scaled.clone(), train_targets.clone())
        } else {
            (
                validation_idx
                    .iter()
                    .map(|&i| scaler.transform(&rows[i]))
                    .collect(),
                validation_idx.iter().map(|&i| targets[i]).collect(),
            )
        };
        let predictions: Vec<f64> = eval_rows.iter().map(|r| forest.predict(r)).collect();
        let mse = mean_squared_error(&eval_targets, &predictions);
        let mae = mean_absolute_error(&eval_targets, &predictions);

        info!(
            training_rows = train_idx.len(),
            validation_rows = validation_idx.len(),
            mse,
            mae,
            "hybrid model trained"
        );

        Ok(Self {
            forest,
            scaler,
            mse,
            mae,
            training_set_size: train_idx.len(),
        })
    }

    pub fn predict_pair(&self, features: &[f64]) -> f64 {
        self.forest.predict(&self.scaler.transform(features))
    }
}

#[async_trait::async_trait]
impl ScoringModel for HybridModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Hybrid
    }

    async fn recommend(&self, ctx: &ScoringContext<'_>) -> EngineResult<Vec<(Uuid, f64)>> {
        let Some(user) = ctx.user else {
            debug!(user_id = %ctx.user_id, "unknown user profile, skipping hybrid scores");
            return Ok(Vec::new());
        };

        let interacted = ctx.interacted_policies();
        let scored: Vec<(Uuid, f64)> = ctx
            .policies
            .iter()
            .filter(|policy| !interacted.contains(&policy.id))
            .map(|policy| (policy.id, self.predict_pair(&encode_pair(user, policy))))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        Ok(rank_descending(scored))
    }
}

/// Bagging ensemble of regression trees, trained in parallel. Each tree gets
/// its own seeded RNG so a retrain over identical data reproduces the same
/// forest.
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    pub fn fit(rows: &[Vec<f64>], targets: &[f64], config: &HybridConfig) -> Self {
        let n = rows.len();
        let trees: Vec<RegressionTree> = (0..config.n_trees)
            .into_par_iter()
            .map(|tree_index| {
                let mut rng = StdRng::seed_from_u64(
                    config.random_seed.wrapping_add(tree_index as u64),
                );
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(rows, targets, &sample, config)
            })
            .collect();

        Self { trees }
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        sum / self.trees.len() as f64
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: TreeNode,
}

impl RegressionTree {
    fn fit(rows: &[Vec<f64>], targets: &[f64], sample: &[usize], config: &HybridConfig) -> Self {
        let root = Self::build(rows, targets, sample, 0, config);
        Self { root }
    }

    fn build(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        depth: usize,
        config: &HybridConfig,
    ) -> TreeNode {
        let mean = indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len().max(1) as f64;

        if depth >= config.max_depth || indices.len() < config.min_samples_split {
            return TreeNode::Leaf { value: mean };
        }

        let Some((feature, threshold)) =
            Self::best_split(rows, targets, indices, config.min_samples_leaf)
        else {
            return TreeNode::Leaf { value: mean };
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| rows[i][feature] <= threshold);

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(Self::build(rows, targets, &left_idx, depth + 1, config)),
            right: Box::new(Self::build(rows, targets, &right_idx, depth + 1, config)),
        }
    }

    /// Exhaustive variance-reduction split search: per feature, sort the
    /// sampled values and evaluate every boundary between distinct values
    /// using running sums.
    fn best_split(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        min_samples_leaf: usize,
    ) -> Option<(usize, f64)> {
        let n_features = rows.first()?.len();
        let n = indices.len();
        let mut best: Option<(usize, f64, f64)> = None;

        for feature in 0..n_features {
            let mut pairs: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (rows[i][feature], targets[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let total_sum: f64 = pairs.iter().map(|(_, y)| y).sum();
            let total_sq: f64 = pairs.iter().map(|(_, y)| y * y).sum();

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for split in 1..n {
                left_sum += pairs[split - 1].1;
                left_sq += pairs[split - 1].1 * pairs[split - 1].1;

                if pairs[split - 1].0 == pairs[split].0 {
                    continue;
                }
                if split < min_samples_leaf || n - split < min_samples_leaf {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_cost = left_sq - left_sum * left_sum / split as f64;
                let right_cost = right_sq - right_sum * right_sum / (n - split) as f64;
                let cost = left_cost + right_cost;

                if best.map(|(_, _, c)| cost < c).unwrap_or(true) {
                    let threshold = (pairs[split - 1].0 + pairs[split].0) / 2.0;
                    best = Some((feature, threshold, cost));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }

    fn predict(&self, features: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split { feature, threshold, left, right } => {
                    node = if features[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::encode_pair;
    use crate::models::{Policy, UserProfile};

    fn small_config() -> HybridConfig {
        HybridConfig {
            n_trees: 20,
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
            validation_fraction: 0.2,
            random_seed: 42,
        }
    }

    #[test]
    fn forest_learns_a_threshold_function() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 5.0 }).collect();

        let forest = RandomForestRegressor::fit(&rows, &targets, &small_config());
        assert!(forest.predict(&[5.0]) < 2.0);
        assert!(forest.predict(&[35.0]) > 4.0);
    }

    #[test]
    fn fit_with_one_row_is_insufficient_data() {
        let err = HybridModel::fit(vec![vec![1.0]], vec![1.0], &small_config()).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn refit_over_identical_data_is_deterministic() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i * 2) as f64]).collect();
        let targets: Vec<f64> = (0..30).map(|i| i as f64 / 3.0).collect();

        let a = HybridModel::fit(rows.clone(), targets.clone(), &small_config()).unwrap();
        let b = HybridModel::fit(rows, targets, &small_config()).unwrap();
        assert_eq!(a.mse, b.mse);
        assert_eq!(a.predict_pair(&[7.0, 14.0]), b.predict_pair(&[7.0, 14.0]));
    }

    #[tokio::test]
    async fn scores_user_with_no_interaction_history() {
        let mut user = UserProfile::new(Uuid::new_v4());
        user.age = Some(30);
        user.occupation = Some("office".into());

        let health = Policy {
            id: Uuid::new_v4(),
            name: "Health Basic".into(),
            policy_type: "health".into(),
            premium: 120.0,
            coverage: "hospital".into(),
            min_age: 18,
            max_age: 65,
            risk_level: "low".into(),
        };
        let auto = Policy {
            id: Uuid::new_v4(),
            name: "Auto Shield".into(),
            policy_type: "auto".into(),
            premium: 90.0,
            coverage: "collision".into(),
            min_age: 25,
            max_age: 70,
            risk_level: "medium".into(),
        };

        // Train on positive interactions from other users so every
        // prediction lands above zero.
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..20 {
            let mut other = UserProfile::new(Uuid::new_v4());
            other.age = Some(25 + i);
            rows.push(encode_pair(&other, &health));
            targets.push(4.0);
            rows.push(encode_pair(&other, &auto));
            targets.push(3.0);
        }

        let model = HybridModel::fit(rows, targets, &small_config()).unwrap();
        let policies = vec![health.clone(), auto.clone()];
        let ctx = ScoringContext {
            user_id: user.id,
            user: Some(&user),
            interactions: &[],
            policies: &policies,
        };

        let recs = model.recommend(&ctx).await.unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|(_, score)| *score > 0.0));
    }
}
