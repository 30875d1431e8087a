pub mod aggregate;
pub mod cycle;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod scoring;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub feed_url: Option<String>,
        pub feed_api_token: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                feed_url: non_empty_var("FEED_URL"),
                feed_api_token: non_empty_var("FEED_API_TOKEN"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_feed_url(&self) -> anyhow::Result<&str> {
            self.feed_url.as_deref().context("FEED_URL is required")
        }

        pub fn require_feed_api_token(&self) -> anyhow::Result<&str> {
            self.feed_api_token
                .as_deref()
                .context("FEED_API_TOKEN is required")
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    /// Reads a numeric env override, falling back to `default` when unset or unparsable.
    pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
        std::env::var(key)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }

}
