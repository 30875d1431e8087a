//! Heuristic scoring of one ticker's analyst events.
//!
//! Everything here is pure: counts come from a [`SignalClassifier`], arithmetic from a
//! [`ScoringConfig`]. The same input slice always produces the same result.

pub mod classify;
pub mod config;

use crate::domain::event::AnalystEvent;
use crate::domain::recommendation::{RecommendationScore, RiskLevel, Sentiment};
pub use classify::{ActionSignal, RatingSignal, SignalClassifier, SubstringClassifier};
pub use config::ScoringConfig;

/// Signal counts for one group of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalTally {
    pub upgrades: i32,
    pub downgrades: i32,
    pub buys: i32,
    pub sells: i32,
    pub holds: i32,
}

impl SignalTally {
    pub fn total_actions(&self) -> i32 {
        self.upgrades + self.downgrades
    }

    pub fn total_ratings(&self) -> i32 {
        self.buys + self.sells + self.holds
    }
}

#[derive(Debug, Clone)]
pub struct Scorer<C = SubstringClassifier> {
    config: ScoringConfig,
    classifier: C,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default(), SubstringClassifier::default())
    }
}

impl Scorer {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(ScoringConfig::from_env()?, SubstringClassifier::default()))
    }
}

impl<C: SignalClassifier> Scorer<C> {
    pub fn new(config: ScoringConfig, classifier: C) -> Self {
        Self { config, classifier }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn tally<E: AsRef<AnalystEvent>>(&self, events: &[E]) -> SignalTally {
        let mut t = SignalTally::default();
        for event in events {
            let event = event.as_ref();
            match self.classifier.classify_action(&event.action) {
                Some(ActionSignal::Upgrade) => t.upgrades += 1,
                Some(ActionSignal::Downgrade) => t.downgrades += 1,
                None => {}
            }
            match self.classifier.classify_rating(&event.rating_to) {
                Some(RatingSignal::Buy) => t.buys += 1,
                Some(RatingSignal::Sell) => t.sells += 1,
                Some(RatingSignal::Hold) => t.holds += 1,
                None => {}
            }
        }
        t
    }

    pub fn evaluate<E: AsRef<AnalystEvent>>(&self, events: &[E]) -> RecommendationScore {
        let t = self.tally(events);
        let score = self.score(&t);

        RecommendationScore {
            score,
            risk_level: self.risk_level(&t),
            expected_return_pct: self.expected_return_pct(&t),
            sentiment: self.sentiment(&t),
            reason: self.reason(&t, score),
            upgrade_count: t.upgrades,
            downgrade_count: t.downgrades,
        }
    }

    /// Clamped to `[0, 100]`.
    pub fn score(&self, t: &SignalTally) -> f64 {
        let c = &self.config;
        let mut score = c.base_score;

        // Net upgrades push the score up, net downgrades push it down by the same step.
        score += f64::from(t.upgrades - t.downgrades) * c.action_weight;

        let total = t.total_ratings();
        if total > 0 {
            let total = f64::from(total);
            let buy_share = f64::from(t.buys) / total;
            let sell_share = f64::from(t.sells) / total;
            score += (buy_share - sell_share) * c.rating_weight;
        }

        score.clamp(0.0, 100.0)
    }

    pub fn risk_level(&self, t: &SignalTally) -> RiskLevel {
        let total = t.total_actions();
        if total == 0 {
            return RiskLevel::Medium;
        }

        let upgrade_ratio = f64::from(t.upgrades) / f64::from(total);
        if upgrade_ratio > self.config.low_risk_ratio {
            RiskLevel::Low
        } else if upgrade_ratio < self.config.high_risk_ratio {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        }
    }

    /// Percent. Balanced groups get the configured default; otherwise the net upgrade
    /// count (negative for net downgrades) times the per-upgrade return.
    pub fn expected_return_pct(&self, t: &SignalTally) -> f64 {
        if t.upgrades == t.downgrades {
            return self.config.default_return_pct;
        }
        f64::from(t.upgrades - t.downgrades) * self.config.return_per_net_upgrade
    }

    pub fn sentiment(&self, t: &SignalTally) -> Sentiment {
        if t.upgrades > t.downgrades && t.buys > t.sells {
            Sentiment::Bullish
        } else if t.downgrades > t.upgrades && t.sells > t.buys {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        }
    }

    /// `score` must be the clamped score of the same tally.
    pub fn reason(&self, t: &SignalTally, score: f64) -> String {
        let mut clauses: Vec<String> = Vec::with_capacity(3);

        if t.upgrades > t.downgrades {
            clauses.push(format!("{} upgrades vs {} downgrades", t.upgrades, t.downgrades));
        } else if t.downgrades > t.upgrades {
            clauses.push(format!("{} downgrades vs {} upgrades", t.downgrades, t.upgrades));
        }

        if t.buys > t.sells {
            clauses.push(format!("{} buy ratings vs {} sell ratings", t.buys, t.sells));
        } else if t.sells > t.buys {
            clauses.push(format!("{} sell ratings vs {} buy ratings", t.sells, t.buys));
        }

        if score >= self.config.strong_consensus_score {
            clauses.push("Strong analyst consensus".to_string());
        } else if score <= self.config.weak_sentiment_score {
            clauses.push("Weak analyst sentiment".to_string());
        }

        if clauses.is_empty() {
            return "Mixed analyst opinions".to_string();
        }
        clauses.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn ev(action: &str, rating_to: &str) -> AnalystEvent {
        AnalystEvent {
            ticker: "TICK".to_string(),
            company: "Tick Corp".to_string(),
            target_from: "$10.00".to_string(),
            target_to: "$11.00".to_string(),
            action: action.to_string(),
            brokerage: "Acme".to_string(),
            rating_from: "Hold".to_string(),
            rating_to: rating_to.to_string(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 20, 14, 30, 0).unwrap(),
        }
    }

    fn scorer() -> Scorer {
        Scorer::default()
    }

    fn repeat(n: usize, action: &str, rating_to: &str) -> Vec<AnalystEvent> {
        (0..n).map(|_| ev(action, rating_to)).collect()
    }

    fn tally(u: i32, d: i32, b: i32, s: i32, h: i32) -> SignalTally {
        SignalTally {
            upgrades: u,
            downgrades: d,
            buys: b,
            sells: s,
            holds: h,
        }
    }

    #[test]
    fn mixed_group_with_net_upgrade_and_buys() {
        let scorer = scorer();
        let events = vec![
            ev("Upgraded", "Buy"),
            ev("Downgraded", "Hold"),
            ev("Upgraded", "Buy"),
        ];

        let out = scorer.evaluate(&events);
        assert_relative_eq!(out.score, 80.0, epsilon = 1e-9);
        assert_eq!(out.risk_level, RiskLevel::Medium);
        assert_relative_eq!(out.expected_return_pct, 2.5);
        assert_eq!(out.sentiment, Sentiment::Bullish);
        assert_eq!(
            out.reason,
            "2 upgrades vs 1 downgrades; 2 buy ratings vs 0 sell ratings; Strong analyst consensus"
        );
        assert_eq!((out.upgrade_count, out.downgrade_count), (2, 1));
    }

    #[test]
    fn single_initiation_with_neutral_rating_stays_at_base() {
        let scorer = scorer();
        let out = scorer.evaluate(&[ev("Initiated", "Neutral")]);

        assert_relative_eq!(out.score, 50.0);
        assert_eq!(out.risk_level, RiskLevel::Medium);
        assert_relative_eq!(out.expected_return_pct, 5.0);
        assert_eq!(out.sentiment, Sentiment::Neutral);
        assert_eq!(out.reason, "Mixed analyst opinions");
        assert_eq!((out.upgrade_count, out.downgrade_count), (0, 0));
    }

    #[test]
    fn score_clamps_at_one_hundred() {
        let scorer = scorer();
        let out = scorer.evaluate(&repeat(12, "upgraded by", "Strong-Buy"));

        assert_eq!(out.score, 100.0);
        assert_eq!(out.risk_level, RiskLevel::Low);
        assert_relative_eq!(out.expected_return_pct, 30.0);
        assert_eq!(
            out.reason,
            "12 upgrades vs 0 downgrades; 12 buy ratings vs 0 sell ratings; Strong analyst consensus"
        );
    }

    #[test]
    fn score_clamps_at_zero_and_reports_weak_sentiment() {
        let scorer = scorer();
        let out = scorer.evaluate(&repeat(7, "Downgraded", "Sell"));

        assert_eq!(out.score, 0.0);
        assert_eq!(out.risk_level, RiskLevel::High);
        assert_eq!(out.sentiment, Sentiment::Bearish);
        assert_eq!(
            out.reason,
            "7 downgrades vs 0 upgrades; 7 sell ratings vs 0 buy ratings; Weak analyst sentiment"
        );
    }

    #[test]
    fn net_downgrades_give_negative_expected_return() {
        let scorer = scorer();
        assert_relative_eq!(scorer.expected_return_pct(&tally(1, 3, 0, 0, 0)), -5.0);
        assert_relative_eq!(scorer.expected_return_pct(&tally(3, 1, 0, 0, 0)), 5.0);
        assert_relative_eq!(scorer.expected_return_pct(&tally(4, 0, 0, 0, 0)), 10.0);
        assert_relative_eq!(scorer.expected_return_pct(&tally(2, 2, 0, 0, 0)), 5.0);
        assert_relative_eq!(scorer.expected_return_pct(&tally(0, 0, 0, 0, 0)), 5.0);
    }

    #[test]
    fn score_stays_in_bounds_for_every_small_tally() {
        let scorer = scorer();
        for u in 0..8 {
            for d in 0..8 {
                for b in 0..5 {
                    for s in 0..5 {
                        for h in 0..3 {
                            let score = scorer.score(&tally(u, d, b, s, h));
                            assert!(
                                (0.0..=100.0).contains(&score),
                                "u={u} d={d} b={b} s={s} h={h} -> {score}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn risk_follows_upgrade_ratio_thresholds() {
        let scorer = scorer();
        for u in 0..30 {
            for d in 0..30 {
                let t = tally(u, d, 0, 0, 0);
                let level = scorer.risk_level(&t);
                if u + d == 0 {
                    assert_eq!(level, RiskLevel::Medium);
                    continue;
                }
                let ratio = f64::from(u) / f64::from(u + d);
                if ratio > 0.7 {
                    assert_eq!(level, RiskLevel::Low, "u={u} d={d}");
                } else if ratio < 0.3 {
                    assert_eq!(level, RiskLevel::High, "u={u} d={d}");
                } else {
                    assert_eq!(level, RiskLevel::Medium, "u={u} d={d}");
                }
            }
        }
        // Exactly on a threshold is medium.
        assert_eq!(scorer.risk_level(&tally(7, 3, 0, 0, 0)), RiskLevel::Medium);
        assert_eq!(scorer.risk_level(&tally(3, 7, 0, 0, 0)), RiskLevel::Medium);
    }

    #[test]
    fn sentiment_needs_both_signals_to_agree() {
        let scorer = scorer();
        assert_eq!(scorer.sentiment(&tally(2, 1, 1, 0, 0)), Sentiment::Bullish);
        assert_eq!(scorer.sentiment(&tally(2, 1, 0, 1, 0)), Sentiment::Neutral);
        assert_eq!(scorer.sentiment(&tally(1, 2, 0, 1, 0)), Sentiment::Bearish);
        assert_eq!(scorer.sentiment(&tally(1, 2, 1, 1, 0)), Sentiment::Neutral);
        assert_eq!(scorer.sentiment(&tally(0, 0, 3, 0, 0)), Sentiment::Neutral);
    }

    #[test]
    fn reason_lists_only_applicable_clauses() {
        let scorer = scorer();
        // Ratings only, mid score.
        let t = tally(0, 0, 1, 2, 0);
        let score = scorer.score(&t);
        assert_relative_eq!(score, 40.0, epsilon = 1e-9);
        assert_eq!(scorer.reason(&t, score), "2 sell ratings vs 1 buy ratings");

        // Score threshold alone.
        let t = tally(2, 0, 0, 0, 0);
        assert_eq!(scorer.reason(&t, 70.0), "2 upgrades vs 0 downgrades; Strong analyst consensus");
    }

    #[test]
    fn evaluation_is_deterministic() {
        let scorer = scorer();
        let events = vec![
            ev("Downgraded", "Underperform"),
            ev("Upgraded", "Outperform"),
            ev("Target lowered by", "Hold"),
            ev("downgraded by", "Sell"),
        ];
        let first = scorer.evaluate(&events);
        for _ in 0..20 {
            assert_eq!(scorer.evaluate(&events), first);
        }
    }

    #[test]
    fn accepts_borrowed_events() {
        let scorer = scorer();
        let owned = vec![ev("Upgraded", "Buy"), ev("Upgraded", "Buy")];
        let borrowed: Vec<&AnalystEvent> = owned.iter().collect();
        assert_eq!(scorer.evaluate(&borrowed), scorer.evaluate(&owned));
    }

    struct RaisedIsUpgrade;

    impl SignalClassifier for RaisedIsUpgrade {
        fn classify_action(&self, action: &str) -> Option<ActionSignal> {
            let a = action.to_lowercase();
            if a.contains("raised") {
                Some(ActionSignal::Upgrade)
            } else if a.contains("lowered") {
                Some(ActionSignal::Downgrade)
            } else {
                None
            }
        }

        fn classify_rating(&self, _rating: &str) -> Option<RatingSignal> {
            None
        }
    }

    #[test]
    fn classifier_is_pluggable() {
        let scorer = Scorer::new(ScoringConfig::default(), RaisedIsUpgrade);
        let out = scorer.evaluate(&[ev("target raised by", "Buy"), ev("Upgraded", "Buy")]);
        assert_eq!((out.upgrade_count, out.downgrade_count), (1, 0));
        assert_relative_eq!(out.score, 60.0);
        // Ratings are ignored by this classifier, so sentiment cannot be bullish.
        assert_eq!(out.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn constants_come_from_config() {
        let cfg = ScoringConfig {
            base_score: 40.0,
            action_weight: 5.0,
            rating_weight: 10.0,
            return_per_net_upgrade: 1.0,
            default_return_pct: 0.0,
            ..ScoringConfig::default()
        };
        let scorer = Scorer::new(cfg, SubstringClassifier::default());
        let out = scorer.evaluate(&[ev("Upgraded", "Buy"), ev("Initiated", "Hold")]);
        // 40 + 5 + 10 * (1/2)
        assert_relative_eq!(out.score, 50.0, epsilon = 1e-9);
        assert_relative_eq!(out.expected_return_pct, 1.0);
        assert_relative_eq!(scorer.expected_return_pct(&SignalTally::default()), 0.0);
    }
}
