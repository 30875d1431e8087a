use crate::domain::event::AnalystEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One page of the analyst feed, exactly as the provider sends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    #[serde(default)]
    pub next_page: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub ticker: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub company: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub target_from: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub target_to: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub action: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub brokerage: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rating_from: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rating_to: String,
    #[serde(default)]
    pub time: Option<String>,
}

/// Validated page: the events that survived mapping plus the cursor for the next call.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub events: Vec<AnalystEvent>,
    pub next_cursor: Option<String>,
    pub skipped: usize,
}

impl FeedPage {
    /// Maps raw items into events. Items without a ticker are skipped, everything else is
    /// kept verbatim. An empty or whitespace `next_page` ends the stream.
    pub fn into_event_page(self, ingested_at: DateTime<Utc>) -> EventPage {
        let mut events = Vec::with_capacity(self.items.len());
        let mut skipped = 0;
        for item in self.items {
            match item.into_event(ingested_at) {
                Some(event) => events.push(event),
                None => skipped += 1,
            }
        }

        let next_cursor = self
            .next_page
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        EventPage {
            events,
            next_cursor,
            skipped,
        }
    }
}

impl FeedItem {
    fn into_event(self, ingested_at: DateTime<Utc>) -> Option<AnalystEvent> {
        if self.ticker.trim().is_empty() {
            tracing::warn!(company = %self.company, "feed item without ticker; skipping");
            return None;
        }

        let occurred_at = parse_occurred_at(self.time.as_deref()).unwrap_or(ingested_at);

        Some(AnalystEvent {
            ticker: self.ticker,
            company: self.company,
            target_from: self.target_from,
            target_to: self.target_to,
            action: self.action,
            brokerage: self.brokerage,
            rating_from: self.rating_from,
            rating_to: self.rating_to,
            occurred_at,
        })
    }
}

/// Free-text fields may arrive as `null`; they read as empty text.
fn null_as_empty<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(de)?.unwrap_or_default())
}

fn parse_occurred_at(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
