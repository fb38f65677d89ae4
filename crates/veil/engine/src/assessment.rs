//! The current risk assessment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veil_types::{RiskLevel, Strategy, Trend};

use crate::error::{EngineError, EngineResult};

/// Result of one assessment tick. Replaced as a whole, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Score in [0, 1].
    pub risk_score: f64,

    /// Level derived from the score.
    pub risk_level: RiskLevel,

    /// Strategy in force after this tick.
    pub strategy: Strategy,

    /// Direction of the score against its rolling average.
    pub trend: Trend,

    /// When the tick that produced this assessment ran.
    pub last_assessment: DateTime<Utc>,

    /// Tick counter, zero before the first tick.
    pub tick: u64,
}

impl RiskAssessment {
    /// State at startup: `log_only`, low risk.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            strategy: Strategy::LogOnly,
            trend: Trend::Stable,
            last_assessment: now,
            tick: 0,
        }
    }

    pub fn new(
        risk_score: f64,
        risk_level: RiskLevel,
        strategy: Strategy,
        trend: Trend,
        last_assessment: DateTime<Utc>,
        tick: u64,
    ) -> EngineResult<Self> {
        if !(0.0..=1.0).contains(&risk_score) {
            return Err(EngineError::InvariantViolation(format!(
                "assessment score {} outside [0, 1]",
                risk_score
            )));
        }
        Ok(Self {
            risk_score,
            risk_level,
            strategy,
            trend,
            last_assessment,
            tick,
        })
    }

    /// Same assessment with a different strategy, used after a fallback.
    pub fn with_strategy(&self, strategy: Strategy) -> Self {
        Self {
            strategy,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_is_log_only_low() {
        let a = RiskAssessment::initial(Utc::now());
        assert_eq!(a.strategy, Strategy::LogOnly);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.tick, 0);
    }

    #[test]
    fn test_out_of_range_score_is_invariant_violation() {
        let err = RiskAssessment::new(
            1.2,
            RiskLevel::Critical,
            Strategy::SessionPause,
            Trend::Increasing,
            Utc::now(),
            1,
        )
        .unwrap_err();
        assert!(err.is_fatal());

        assert!(RiskAssessment::new(
            f64::NAN,
            RiskLevel::Low,
            Strategy::LogOnly,
            Trend::Stable,
            Utc::now(),
            1
        )
        .is_err());
    }
}
