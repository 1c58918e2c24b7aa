//! Credit pricing for video generation.
//!
//! The price of a generation is a base cost keyed on duration plus a
//! flat surcharge for private visibility. Charged exactly once at
//! submission; never recomputed afterwards.

use crate::error::CoreError;
use crate::request::Visibility;

/// (duration seconds, base cost in credits).
pub const BASE_COSTS: &[(i32, i64)] = &[(60, 5), (120, 8), (180, 12), (300, 15)];

/// Flat surcharge for `visibility = private`.
pub const PRIVATE_SURCHARGE: i64 = 3;

/// Look up the base cost for a duration.
///
/// Returns a validation error for durations outside the supported set;
/// callers validate duration first, so hitting the error path here means
/// a submission slipped through unvalidated.
pub fn base_cost(duration_seconds: i32) -> Result<i64, CoreError> {
    BASE_COSTS
        .iter()
        .find(|(d, _)| *d == duration_seconds)
        .map(|(_, cost)| *cost)
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "No price for duration {duration_seconds}s"
            ))
        })
}

/// Total credits to charge for a submission.
pub fn credits_for(duration_seconds: i32, visibility: Visibility) -> Result<i64, CoreError> {
    let base = base_cost(duration_seconds)?;
    let surcharge = match visibility {
        Visibility::Private => PRIVATE_SURCHARGE,
        Visibility::Public => 0,
    };
    Ok(base + surcharge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_costs_match_price_table() {
        assert_eq!(base_cost(60).unwrap(), 5);
        assert_eq!(base_cost(120).unwrap(), 8);
        assert_eq!(base_cost(180).unwrap(), 12);
        assert_eq!(base_cost(300).unwrap(), 15);
    }

    #[test]
    fn unsupported_duration_has_no_price() {
        assert!(base_cost(90).is_err());
        assert!(base_cost(0).is_err());
        assert!(base_cost(-60).is_err());
    }

    #[test]
    fn public_pays_base_only() {
        assert_eq!(credits_for(60, Visibility::Public).unwrap(), 5);
        assert_eq!(credits_for(300, Visibility::Public).unwrap(), 15);
    }

    #[test]
    fn private_pays_base_plus_surcharge() {
        assert_eq!(credits_for(60, Visibility::Private).unwrap(), 8);
        assert_eq!(credits_for(120, Visibility::Private).unwrap(), 11);
        assert_eq!(credits_for(180, Visibility::Private).unwrap(), 15);
        assert_eq!(credits_for(300, Visibility::Private).unwrap(), 18);
    }
}
