use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One analyst action on one security at one point in time.
///
/// `action` and `rating_to` stay as raw provider text; classification happens at scoring
/// time through a `SignalClassifier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalystEvent {
    pub ticker: String,
    pub company: String,
    pub target_from: String,
    pub target_to: String,
    pub action: String,
    pub brokerage: String,
    pub rating_from: String,
    pub rating_to: String,
    pub occurred_at: DateTime<Utc>,
}

/// An event as read back from the store, carrying the row identity that recommendations
/// point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub ingested_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AnalystEvent,
}

impl StoredEvent {
    pub fn ticker(&self) -> &str {
        &self.event.ticker
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.event.occurred_at
    }
}

impl AsRef<AnalystEvent> for StoredEvent {
    fn as_ref(&self) -> &AnalystEvent {
        &self.event
    }
}

impl AsRef<AnalystEvent> for AnalystEvent {
    fn as_ref(&self) -> &AnalystEvent {
        self
    }
}
