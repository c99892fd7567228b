pub mod collaborative;
pub mod content;
pub mod hybrid;

pub use collaborative::CollaborativeModel;
pub use content::ContentModel;
pub use hybrid::HybridModel;

use crate::error::EngineResult;
use crate::models::{InteractionEvent, ModelKind, Policy, UserProfile};
use uuid::Uuid;

/// Everything a trained model may need to score one user at request time.
/// Models are immutable snapshots; all mutable state lives in the stores.
pub struct ScoringContext<'a> {
    pub user_id: Uuid,
    pub user: Option<&'a UserProfile>,
    /// This user's interaction history.
    pub interactions: &'a [InteractionEvent],
    /// The full policy catalog at request time.
    pub policies: &'a [Policy],
}

impl ScoringContext<'_> {
    /// Policies the user has already interacted with, excluded from
    /// recommendation output by every model.
    pub fn interacted_policies(&self) -> std::collections::HashSet<Uuid> {
        self.interactions.iter().map(|e| e.policy_id).collect()
    }
}

/// Common capability of the three scoring algorithms. The blender iterates
/// over these uniformly, so adding an algorithm does not touch blend logic.
#[async_trait::async_trait]
pub trait ScoringModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Ranked (policy_id, raw score) pairs for the user. An empty result is
    /// a cold-start signal, not an error.
    async fn recommend(&self, ctx: &ScoringContext<'_>) -> EngineResult<Vec<(Uuid, f64)>>;
}

/// Descending score order with policy-id ascending tie-break, so rankings
/// are deterministic across runs.
pub fn rank_descending(mut scored: Vec<(Uuid, f64)>) -> Vec<(Uuid, f64)> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored
}
