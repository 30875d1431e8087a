use crate::domain::event::StoredEvent;
use std::collections::BTreeMap;

/// Events of one ticker in the order they were read from the store. Only built by
/// [`group_by_ticker`], so a group never has zero events.
#[derive(Debug, Clone)]
pub struct TickerGroup<'a> {
    ticker: &'a str,
    events: Vec<&'a StoredEvent>,
}

impl<'a> TickerGroup<'a> {
    pub fn ticker(&self) -> &'a str {
        self.ticker
    }

    pub fn events(&self) -> &[&'a StoredEvent] {
        &self.events
    }

    /// The most recent event of the group. Ties on `occurred_at` go to the earliest event
    /// in input order, so the answer only depends on the order the caller supplied.
    pub fn representative(&self) -> &'a StoredEvent {
        let mut best = self.events[0];
        for &event in &self.events[1..] {
            if event.occurred_at() > best.occurred_at() {
                best = event;
            }
        }
        best
    }
}

/// Groups events by ticker, taken verbatim. Groups are returned sorted by ticker; each
/// group keeps the relative order of its events.
pub fn group_by_ticker(events: &[StoredEvent]) -> Vec<TickerGroup<'_>> {
    let mut groups: BTreeMap<&str, Vec<&StoredEvent>> = BTreeMap::new();
    for event in events {
        groups.entry(event.ticker()).or_default().push(event);
    }

    groups
        .into_iter()
        .map(|(ticker, events)| TickerGroup { ticker, events })
        .collect()
}
