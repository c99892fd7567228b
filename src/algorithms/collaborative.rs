use crate::algorithms::{rank_descending, ScoringContext, ScoringModel};
use crate::error::{EngineError, EngineResult};
use crate::features::InteractionMatrix;
use crate::models::ModelKind;
use nalgebra::DMatrix;
use tracing::{debug, info};
use uuid::Uuid;

/// Matrix-factorization collaborative filter. Fitting runs a truncated SVD
/// over the user x policy matrix; prediction projects a known user's row
/// into latent space and reconstructs an affinity score for every policy.
///
/// The snapshot carries the matrix and its ID lists from build time: latent
/// positions are only meaningful against that exact indexing.
#[derive(Debug, Clone)]
pub struct CollaborativeModel {
    user_ids: Vec<Uuid>,
    policy_ids: Vec<Uuid>,
    rows: DMatrix<f64>,
    /// policies x k matrix of item latent factors.
    item_factors: DMatrix<f64>,
    pub components: usize,
}

impl CollaborativeModel {
    pub fn fit(interactions: &InteractionMatrix, max_components: usize) -> EngineResult<Self> {
        let (n_users, n_policies) = interactions.matrix.dim();
        let min_dim = n_users.min(n_policies);

        if min_dim < 2 {
            return Err(EngineError::InsufficientData(format!(
                "matrix of {}x{} cannot support any latent dimension",
                n_users, n_policies
            )));
        }

        let k = max_components.min(min_dim - 1);
        debug_assert!(k >= 1 && k < min_dim);

        let rows = DMatrix::from_fn(n_users, n_policies, |r, c| interactions.matrix[[r, c]]);
        let svd = rows.clone().svd(true, true);
        let v_t = svd.v_t.ok_or_else(|| {
            EngineError::ModelTraining("SVD did not produce right singular vectors".to_string())
        })?;

        // nalgebra does not guarantee singular value order; pick the k
        // largest explicitly.
        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&a, &b| {
            svd.singular_values[b]
                .partial_cmp(&svd.singular_values[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(k);

        let item_factors =
            DMatrix::from_fn(n_policies, k, |policy, factor| v_t[(order[factor], policy)]);

        info!(
            users = n_users,
            policies = n_policies,
            components = k,
            "collaborative filtering model trained"
        );

        Ok(Self {
            user_ids: interactions.user_ids.clone(),
            policy_ids: interactions.policy_ids.clone(),
            rows,
            item_factors,
            components: k,
        })
    }

    /// Reconstructed affinity row for a user index: project onto the latent
    /// factors, then back into policy space.
    fn reconstruct(&self, user_index: usize) -> Vec<f64> {
        let row = self.rows.row(user_index);
        let latent = &row * &self.item_factors;
        let reconstructed = &latent * self.item_factors.transpose();
        reconstructed.iter().copied().collect()
    }
}

#[async_trait::async_trait]
impl ScoringModel for CollaborativeModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Collaborative
    }

    async fn recommend(&self, ctx: &ScoringContext<'_>) -> EngineResult<Vec<(Uuid, f64)>> {
        let Some(user_index) = self.user_ids.iter().position(|id| *id == ctx.user_id) else {
            // Cold start: the user was not in the training matrix. The
            // blender relies on the other models instead.
            debug!(user_id = %ctx.user_id, "user not in training matrix, skipping collaborative scores");
            return Ok(Vec::new());
        };

        let reconstructed = self.reconstruct(user_index);
        let user_row = self.rows.row(user_index);

        let scored: Vec<(Uuid, f64)> = reconstructed
            .iter()
            .enumerate()
            .filter(|(i, score)| user_row[*i] <= 0.0 && **score > 0.0)
            .map(|(i, score)| (self.policy_ids[i], *score))
            .collect();

        Ok(rank_descending(scored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InteractionEvent, InteractionKind};

    fn matrix_from(events: &[InteractionEvent]) -> InteractionMatrix {
        InteractionMatrix::build(events)
    }

    #[test]
    fn two_by_two_matrix_fits_with_one_component() {
        let users: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let policies: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();

        let events = vec![
            InteractionEvent::new(users[0], policies[0], InteractionKind::Purchase, 1.0),
            InteractionEvent::new(users[0], policies[1], InteractionKind::Purchase, 1.0),
            InteractionEvent::new(users[1], policies[0], InteractionKind::View, 1.0),
        ];

        let model = CollaborativeModel::fit(&matrix_from(&events), 50).unwrap();
        assert_eq!(model.components, 1);
    }

    #[test]
    fn degenerate_matrix_is_insufficient_data() {
        let user = Uuid::new_v4();
        let policy = Uuid::new_v4();
        let events = vec![InteractionEvent::new(user, policy, InteractionKind::View, 1.0)];

        let err = CollaborativeModel::fit(&matrix_from(&events), 50).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));

        let err = CollaborativeModel::fit(&matrix_from(&[]), 50).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }

    #[test]
    fn component_count_is_capped() {
        let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let policies: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let mut events = Vec::new();
        for u in &users {
            for p in &policies {
                events.push(InteractionEvent::new(*u, *p, InteractionKind::View, 1.0));
            }
        }

        let model = CollaborativeModel::fit(&matrix_from(&events), 2).unwrap();
        assert_eq!(model.components, 2);

        let model = CollaborativeModel::fit(&matrix_from(&events), 50).unwrap();
        assert_eq!(model.components, 3);
    }

    #[tokio::test]
    async fn unknown_user_gets_empty_result() {
        let users: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let policies: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let events = vec![
            InteractionEvent::new(users[0], policies[0], InteractionKind::Purchase, 1.0),
            InteractionEvent::new(users[1], policies[1], InteractionKind::Purchase, 1.0),
        ];

        let model = CollaborativeModel::fit(&matrix_from(&events), 50).unwrap();
        let stranger = Uuid::new_v4();
        let ctx = ScoringContext {
            user_id: stranger,
            user: None,
            interactions: &[],
            policies: &[],
        };

        assert!(model.recommend(&ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interacted_policies_are_excluded() {
        let users: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let policies: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        // Users 0 and 1 share taste; user 0 has not seen policy 2.
        let events = vec![
            InteractionEvent::new(users[0], policies[0], InteractionKind::Purchase, 1.0),
            InteractionEvent::new(users[0], policies[1], InteractionKind::Purchase, 1.0),
            InteractionEvent::new(users[1], policies[0], InteractionKind::Purchase, 1.0),
            InteractionEvent::new(users[1], policies[1], InteractionKind::Purchase, 1.0),
            InteractionEvent::new(users[1], policies[2], InteractionKind::Purchase, 1.0),
            InteractionEvent::new(users[2], policies[2], InteractionKind::View, 1.0),
        ];

        let model = CollaborativeModel::fit(&matrix_from(&events), 50).unwrap();
        let ctx = ScoringContext {
            user_id: users[0],
            user: None,
            interactions: &[],
            policies: &[],
        };

        let recs = model.recommend(&ctx).await.unwrap();
        assert!(recs.iter().all(|(id, _)| *id != policies[0] && *id != policies[1]));
        assert!(recs.iter().all(|(_, score)| *score > 0.0));
    }
}
