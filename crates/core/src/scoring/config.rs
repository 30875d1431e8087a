use crate::config::env_parse;

/// Tunable constants of the recommendation heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Starting score before any signal is applied.
    pub base_score: f64,
    /// Points per net upgrade (subtracted per net downgrade).
    pub action_weight: f64,
    /// Points for a group where every classified rating is a buy; scaled by
    /// `buy_share - sell_share`.
    pub rating_weight: f64,
    /// Upgrade ratio strictly above this is low risk.
    pub low_risk_ratio: f64,
    /// Upgrade ratio strictly below this is high risk.
    pub high_risk_ratio: f64,
    /// Expected return in percent per net upgrade. Net downgrades give a negative value.
    pub return_per_net_upgrade: f64,
    /// Expected return when upgrades and downgrades balance.
    pub default_return_pct: f64,
    /// Scores at or above this add "Strong analyst consensus" to the reason.
    pub strong_consensus_score: f64,
    /// Scores at or below this add "Weak analyst sentiment" to the reason.
    pub weak_sentiment_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: 50.0,
            action_weight: 10.0,
            rating_weight: 30.0,
            low_risk_ratio: 0.7,
            high_risk_ratio: 0.3,
            return_per_net_upgrade: 2.5,
            default_return_pct: 5.0,
            strong_consensus_score: 70.0,
            weak_sentiment_score: 30.0,
        }
    }
}

impl ScoringConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let d = Self::default();
        let out = Self {
            base_score: env_parse("SCORE_BASE", d.base_score),
            action_weight: env_parse("SCORE_ACTION_WEIGHT", d.action_weight),
            rating_weight: env_parse("SCORE_RATING_WEIGHT", d.rating_weight),
            low_risk_ratio: env_parse("RISK_LOW_RATIO", d.low_risk_ratio),
            high_risk_ratio: env_parse("RISK_HIGH_RATIO", d.high_risk_ratio),
            return_per_net_upgrade: env_parse("RETURN_PER_NET_UPGRADE", d.return_per_net_upgrade),
            default_return_pct: env_parse("RETURN_DEFAULT_PCT", d.default_return_pct),
            strong_consensus_score: env_parse("REASON_STRONG_SCORE", d.strong_consensus_score),
            weak_sentiment_score: env_parse("REASON_WEAK_SCORE", d.weak_sentiment_score),
        };
        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("base_score", self.base_score),
            ("action_weight", self.action_weight),
            ("rating_weight", self.rating_weight),
            ("low_risk_ratio", self.low_risk_ratio),
            ("high_risk_ratio", self.high_risk_ratio),
            ("return_per_net_upgrade", self.return_per_net_upgrade),
            ("default_return_pct", self.default_return_pct),
            ("strong_consensus_score", self.strong_consensus_score),
            ("weak_sentiment_score", self.weak_sentiment_score),
        ];
        for (name, value) in fields {
            anyhow::ensure!(value.is_finite(), "{name} must be finite (got {value})");
        }

        anyhow::ensure!(
            (0.0..=1.0).contains(&self.high_risk_ratio)
                && (0.0..=1.0).contains(&self.low_risk_ratio)
                && self.high_risk_ratio <= self.low_risk_ratio,
            "risk ratios must satisfy 0 <= high ({}) <= low ({}) <= 1",
            self.high_risk_ratio,
            self.low_risk_ratio
        );

        anyhow::ensure!(
            self.weak_sentiment_score < self.strong_consensus_score,
            "weak_sentiment_score ({}) must be below strong_consensus_score ({})",
            self.weak_sentiment_score,
            self.strong_consensus_score
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ScoringConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_risk_ratios() {
        let cfg = ScoringConfig {
            low_risk_ratio: 0.2,
            high_risk_ratio: 0.8,
            ..ScoringConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_weights() {
        let cfg = ScoringConfig {
            rating_weight: f64::NAN,
            ..ScoringConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
