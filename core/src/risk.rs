//! Login risk scoring. Pure function so it stays independently testable;
//! persistence and enrichment happen in the API crate.

/// Signals observed around an authentication attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskFactors {
    pub new_device: bool,
    pub new_location: bool,
    /// Consecutive failed attempts preceding this one.
    pub failed_attempts: u32,
    pub vpn_detected: bool,
    /// Local hour of day (0-23) at the caller's location, when known.
    pub time_of_day: Option<u8>,
}

/// Hours considered dead-of-night for the caller; logins in this band get
/// a small bump.
const NIGHT_HOURS: std::ops::RangeInclusive<u8> = 2..=5;

const FAILED_ATTEMPT_WEIGHT: u32 = 10;
const FAILED_ATTEMPT_CAP: u32 = 40;

/// Deterministic weighted sum of risk factors, clamped to 0-100.
pub fn calculate_risk_score(factors: &RiskFactors) -> u8 {
    let mut score: u32 = 0;
    if factors.new_device {
        score += 20;
    }
    if factors.new_location {
        score += 25;
    }
    score += factors
        .failed_attempts
        .saturating_mul(FAILED_ATTEMPT_WEIGHT)
        .min(FAILED_ATTEMPT_CAP);
    if factors.vpn_detected {
        score += 15;
    }
    if factors
        .time_of_day
        .is_some_and(|hour| NIGHT_HOURS.contains(&hour))
    {
        score += 10;
    }
    score.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_factors_scores_zero() {
        assert_eq!(calculate_risk_score(&RiskFactors::default()), 0);
    }

    #[test]
    fn all_factors_clamp_to_one_hundred() {
        // 20 + 25 + 40 + 15 + 10 = 110, clamped.
        let factors = RiskFactors {
            new_device: true,
            new_location: true,
            failed_attempts: 10,
            vpn_detected: true,
            time_of_day: Some(3),
        };
        assert_eq!(calculate_risk_score(&factors), 100);
    }

    #[test]
    fn failed_attempts_are_capped_at_forty() {
        let factors = RiskFactors {
            failed_attempts: 100,
            ..Default::default()
        };
        assert_eq!(calculate_risk_score(&factors), 40);
    }

    #[test]
    fn extreme_failed_attempt_counts_do_not_overflow() {
        let factors = RiskFactors {
            failed_attempts: u32::MAX,
            ..Default::default()
        };
        assert_eq!(calculate_risk_score(&factors), 40);
    }

    #[test]
    fn night_hours_add_ten_only_inside_band() {
        let at = |hour| RiskFactors {
            time_of_day: Some(hour),
            ..Default::default()
        };
        assert_eq!(calculate_risk_score(&at(2)), 10);
        assert_eq!(calculate_risk_score(&at(5)), 10);
        assert_eq!(calculate_risk_score(&at(1)), 0);
        assert_eq!(calculate_risk_score(&at(6)), 0);
    }

    #[test]
    fn partial_factors_sum_without_clamping() {
        let factors = RiskFactors {
            new_device: true,
            failed_attempts: 2,
            ..Default::default()
        };
        assert_eq!(calculate_risk_score(&factors), 40);
    }
}
