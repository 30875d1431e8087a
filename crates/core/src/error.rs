use std::fmt;

/// Failure talking to the analyst feed. Carries enough context to tell which page broke
/// without replaying the whole chain.
#[derive(Debug, Clone)]
pub struct FeedError {
    pub stage: &'static str,
    pub page: usize,
    pub cursor: Option<String>,
    pub detail: String,
    pub raw_body: Option<String>,
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feed error (stage={}, page={}, cursor={}): {}",
            self.stage,
            self.page,
            self.cursor.as_deref().unwrap_or("<first>"),
            self.detail
        )
    }
}

impl std::error::Error for FeedError {}

/// A generation cycle found nothing to analyse. Distinct from a run that succeeded with
/// zero recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoEventsError;

impl fmt::Display for NoEventsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no analyst events available for analysis")
    }
}

impl std::error::Error for NoEventsError {}

/// True when `err` (or anything it wraps) is a [`NoEventsError`].
pub fn is_no_events(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<NoEventsError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn no_events_is_detectable_through_context() {
        let err = Err::<(), _>(NoEventsError)
            .context("generation cycle failed")
            .unwrap_err();
        assert!(is_no_events(&err));
        assert!(!is_no_events(&anyhow::anyhow!("db down")));
    }

    #[test]
    fn feed_error_names_stage_and_page() {
        let err = FeedError {
            stage: "http",
            page: 3,
            cursor: Some("ZZZ".to_string()),
            detail: "status=502 Bad Gateway".to_string(),
            raw_body: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("stage=http"));
        assert!(msg.contains("page=3"));
        assert!(msg.contains("cursor=ZZZ"));
    }
}
