use crate::models::{InteractionKind, UserProfile};
use anyhow::{anyhow, Result};

/// Fields counted toward profile completeness. Matches the attributes the
/// hybrid encoder and fallback recommender read.
const PROFILE_FIELDS: usize = 11;

/// Fraction of profile fields the user has filled in, used as the
/// data-quality component of the health report.
pub fn profile_completeness(user: &UserProfile) -> f64 {
    let completed = [
        user.age.is_some(),
        user.occupation.is_some(),
        user.lifestyle.is_some(),
        user.health_status.is_some(),
        user.marital_status.is_some(),
        user.annual_income.is_some(),
        user.risk_tolerance.is_some(),
        user.dependents.is_some(),
        user.vehicle_ownership.is_some(),
        user.smoking_status.is_some(),
        user.exercise_habits.is_some(),
    ]
    .iter()
    .filter(|&&set| set)
    .count();

    completed as f64 / PROFILE_FIELDS as f64
}

pub fn validate_user_profile(user: &UserProfile) -> Result<()> {
    if user.id.is_nil() {
        return Err(anyhow!("user ID cannot be nil"));
    }

    if let Some(age) = user.age {
        if !(18..=100).contains(&age) {
            return Err(anyhow!("invalid age value: {}", age));
        }
    }

    Ok(())
}

pub fn validate_interaction_value(kind: InteractionKind, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(anyhow!("interaction value must be finite"));
    }

    match kind {
        InteractionKind::Rate | InteractionKind::Feedback => {
            if !(0.0..=5.0).contains(&value) {
                return Err(anyhow!("rating must be between 0 and 5, got {}", value));
            }
        }
        _ => {
            if value < 0.0 {
                return Err(anyhow!("interaction value cannot be negative"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn completeness_of_empty_profile_is_zero() {
        let user = UserProfile::new(Uuid::new_v4());
        assert_eq!(profile_completeness(&user), 0.0);
    }

    #[test]
    fn completeness_counts_filled_fields() {
        let mut user = UserProfile::new(Uuid::new_v4());
        user.age = Some(30);
        user.occupation = Some("office".into());
        let score = profile_completeness(&user);
        assert!((score - 2.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn rating_values_are_bounded() {
        assert!(validate_interaction_value(InteractionKind::Rate, 4.5).is_ok());
        assert!(validate_interaction_value(InteractionKind::Rate, 6.0).is_err());
        assert!(validate_interaction_value(InteractionKind::View, -1.0).is_err());
        assert!(validate_interaction_value(InteractionKind::Click, f64::NAN).is_err());
    }

    #[test]
    fn profile_age_bounds() {
        let mut user = UserProfile::new(Uuid::new_v4());
        user.age = Some(30);
        assert!(validate_user_profile(&user).is_ok());
        user.age = Some(150);
        assert!(validate_user_profile(&user).is_err());
    }
}
