use std::path::PathBuf;

use anyhow::Context as _;
use chrono_tz::Tz;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://tenderwatch.db";
pub const DEFAULT_SCRAPE_CRON: &str = "0 0 */6 * * *";

/// Service settings read from `TENDERWATCH_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub scheduler: SchedulerConfig,
    pub chrome: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Six-field cron expression, seconds first.
    pub cron: String,
    pub timezone: Tz,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: DEFAULT_SCRAPE_CRON.to_string(),
            timezone: Tz::UTC,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`; unset and blank variables take
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url =
            var("TENDERWATCH_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let mut scheduler = SchedulerConfig::default();
        if let Some(raw) = var("TENDERWATCH_SCHEDULER_ENABLED") {
            scheduler.enabled = parse_bool(&raw)
                .with_context(|| format!("invalid TENDERWATCH_SCHEDULER_ENABLED={raw:?}"))?;
        }
        if let Some(raw) = var("TENDERWATCH_SCRAPE_CRON") {
            scheduler.cron = parse_cron(&raw)
                .with_context(|| format!("invalid TENDERWATCH_SCRAPE_CRON={raw:?}"))?;
        }
        if let Some(raw) = var("TENDERWATCH_SCRAPE_TZ") {
            scheduler.timezone = parse_timezone(&raw)
                .with_context(|| format!("invalid TENDERWATCH_SCRAPE_TZ={raw:?}"))?;
        }

        Ok(Self {
            database_url,
            scheduler,
            chrome: var("TENDERWATCH_CHROME").map(PathBuf::from),
        })
    }
}

pub fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

/// Checks the field count only; the scheduler validates the fields.
pub fn parse_cron(raw: &str) -> anyhow::Result<String> {
    let fields = raw.split_whitespace().collect::<Vec<_>>();
    if !(6..=7).contains(&fields.len()) {
        anyhow::bail!(
            "expected 6 fields (sec min hour day month weekday), got {}",
            fields.len()
        );
    }
    Ok(fields.join(" "))
}

pub fn parse_timezone(raw: &str) -> anyhow::Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|err| anyhow::anyhow!("unknown timezone: {err}"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.chrome, None);
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("TENDERWATCH_DATABASE_URL", "sqlite::memory:"),
            ("TENDERWATCH_SCHEDULER_ENABLED", " off "),
            ("TENDERWATCH_SCRAPE_CRON", "0  30 9 * * Mon-Fri"),
            ("TENDERWATCH_SCRAPE_TZ", "Asia/Kolkata"),
            ("TENDERWATCH_CHROME", "/usr/bin/chromium"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.cron, "0 30 9 * * Mon-Fri");
        assert_eq!(config.scheduler.timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(config.chrome, Some(PathBuf::from("/usr/bin/chromium")));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("TENDERWATCH_DATABASE_URL", "  ")])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_bool("maybe").is_err());
        assert!(parse_cron("*/5 * * * *").is_err());
        assert!(parse_timezone("Mars/Olympus").is_err());
        let err = Config::from_lookup(lookup(&[("TENDERWATCH_SCRAPE_TZ", "Nowhere")])).unwrap_err();
        assert!(format!("{err:#}").contains("TENDERWATCH_SCRAPE_TZ"));
    }
}
