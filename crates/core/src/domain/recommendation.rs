use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

/// Every recommendation produced by the engine targets the same horizon today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeHorizon {
    #[default]
    Medium,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }
}

impl TimeHorizon {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => anyhow::bail!("unknown risk level: {other}"),
        }
    }
}

impl FromStr for Sentiment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bullish" => Ok(Self::Bullish),
            "bearish" => Ok(Self::Bearish),
            "neutral" => Ok(Self::Neutral),
            other => anyhow::bail!("unknown sentiment: {other}"),
        }
    }
}

impl FromStr for TimeHorizon {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "medium" => Ok(Self::Medium),
            other => anyhow::bail!("unknown time horizon: {other}"),
        }
    }
}

/// Scorer output for one ticker group. Never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationScore {
    pub score: f64,
    pub risk_level: RiskLevel,
    pub expected_return_pct: f64,
    pub sentiment: Sentiment,
    pub reason: String,
    pub upgrade_count: i32,
    pub downgrade_count: i32,
}

/// The persisted verdict for one ticker from one generation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub generation_id: Uuid,
    pub generated_at: DateTime<Utc>,
    /// Stored event row used to display the security.
    pub security_ref: Uuid,
    pub ticker: String,
    pub company: String,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub expected_return_pct: f64,
    pub time_horizon: TimeHorizon,
    pub reason: String,
    pub sentiment: Sentiment,
    pub upgrade_count: i32,
    pub downgrade_count: i32,
}
