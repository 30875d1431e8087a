use anyhow::Context;
use std::time::Duration;

/// Parses durations written like `6h`, `90m`, `1h30m`, `1.5h`, `45s` or `250ms`.
/// Zero is rejected since a schedule cannot tick at it.
pub fn parse_interval(raw: &str) -> anyhow::Result<Duration> {
    let s = raw.trim();
    anyhow::ensure!(!s.is_empty(), "empty duration");

    let mut total_secs = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .with_context(|| format!("missing unit in duration {raw:?}"))?;
        anyhow::ensure!(num_len > 0, "expected a number in duration {raw:?}");
        let value: f64 = rest[..num_len]
            .parse()
            .with_context(|| format!("invalid number in duration {raw:?}"))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_secs = match &rest[..unit_len] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            other => anyhow::bail!("unknown unit {other:?} in duration {raw:?}"),
        };
        rest = &rest[unit_len..];
        total_secs += value * unit_secs;
    }

    anyhow::ensure!(
        total_secs.is_finite() && total_secs > 0.0,
        "duration {raw:?} must be positive"
    );
    Duration::try_from_secs_f64(total_secs)
        .with_context(|| format!("duration {raw:?} out of range"))
}

/// Reads an interval from `key`. Unset uses `default` silently; an unparsable value
/// uses `default` with a warning.
pub fn interval_from_env(key: &str, default: Duration) -> Duration {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    if raw.trim().is_empty() {
        return default;
    }

    match parse_interval(&raw) {
        Ok(d) => d,
        Err(err) => {
            tracing::warn!(
                key,
                value = %raw,
                default_secs = default.as_secs(),
                error = %err,
                "invalid interval; using default"
            );
            default
        }
    }
}
