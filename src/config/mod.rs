// src/config/mod.rs
//! Application configuration: optional TOML file, then environment overrides, then clamping.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/scraper.toml";
pub const ENV_CONFIG_PATH: &str = "SCRAPER_CONFIG_PATH";

/// Upper bound for the summary cache TTL (30 days).
pub const MAX_SUMMARY_CACHE_TTL_SECS: u64 = 30 * 86_400;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub federal_register: FederalRegisterConfig,
    pub summarizer: SummarizerConfig,
    /// Postgres URL; when absent the in-memory store is used.
    pub database_url: Option<String>,
    /// CORS origins; empty means permissive.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub interval_minutes: u32,
    pub lookback_days: u32,
    pub batch_size: usize,
    pub stale_after_minutes: u32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            lookback_days: 1,
            batch_size: 50,
            stale_after_minutes: 60,
        }
    }
}

impl ScraperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FederalRegisterConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub per_page: u32,
    pub max_pages: u32,
    pub page_delay_ms: u64,
}

impl Default for FederalRegisterConfig {
    fn default() -> Self {
        Self {
            api_url: "https://www.federalregister.gov/api/v1".to_string(),
            timeout_secs: 30,
            per_page: 100,
            max_pages: 2,
            page_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub api_url: String,
    /// Blank means "not configured": summaries degrade to truncated text.
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub use_mock: bool,
    pub cache_ttl_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.x.ai/v1".to_string(),
            api_key: String::new(),
            model: "grok-4-fast".to_string(),
            timeout_secs: 60,
            use_mock: false,
            cache_ttl_secs: 86_400,
        }
    }
}

impl SummarizerConfig {
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl AppConfig {
    /// Load using env var + fallbacks:
    /// 1) $SCRAPER_CONFIG_PATH (must exist)
    /// 2) config/scraper.toml (if present)
    /// 3) built-in defaults
    ///
    /// Process environment overrides are applied on top, then values are clamped.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => Self::from_file(Path::new(&p))?,
            Err(_) => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
                if fallback.exists() {
                    Self::from_file(&fallback)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scraper config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing scraper config {}", path.display()))
    }

    /// Overlay values from an environment lookup. Unparseable values are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let s = &mut self.scraper;
        env_parse(&lookup, "SCRAPER_INTERVAL_MINUTES", &mut s.interval_minutes);
        env_parse(&lookup, "SCRAPER_DAYS_LOOKBACK", &mut s.lookback_days);
        env_parse(&lookup, "SCRAPER_BATCH_SIZE", &mut s.batch_size);
        env_parse(&lookup, "SCRAPER_STALE_MINUTES", &mut s.stale_after_minutes);

        let fr = &mut self.federal_register;
        env_string(&lookup, "FEDERAL_REGISTER_API_URL", &mut fr.api_url);
        env_parse(&lookup, "FEDERAL_REGISTER_TIMEOUT", &mut fr.timeout_secs);
        env_parse(&lookup, "FEDERAL_REGISTER_PER_PAGE", &mut fr.per_page);
        env_parse(&lookup, "FEDERAL_REGISTER_MAX_PAGES", &mut fr.max_pages);
        env_parse(&lookup, "FEDERAL_REGISTER_PAGE_DELAY_MS", &mut fr.page_delay_ms);

        let sm = &mut self.summarizer;
        env_string(&lookup, "GROK_API_URL", &mut sm.api_url);
        env_string(&lookup, "GROK_API_KEY", &mut sm.api_key);
        env_string(&lookup, "GROK_MODEL", &mut sm.model);
        env_parse(&lookup, "GROK_TIMEOUT", &mut sm.timeout_secs);
        env_parse(&lookup, "SUMMARY_CACHE_TTL_SECS", &mut sm.cache_ttl_secs);
        if let Some(v) = lookup("USE_MOCK_GROK") {
            sm.use_mock = parse_bool(&v);
        }

        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(raw) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Clamp every numeric knob into its supported range.
    pub fn sanitize(&mut self) {
        let s = &mut self.scraper;
        s.interval_minutes = s.interval_minutes.clamp(1, 1_440);
        s.lookback_days = s.lookback_days.clamp(1, 30);
        s.batch_size = s.batch_size.clamp(1, 1_000);
        s.stale_after_minutes = s.stale_after_minutes.clamp(1, 1_440);

        let fr = &mut self.federal_register;
        fr.timeout_secs = fr.timeout_secs.clamp(5, 300);
        fr.per_page = fr.per_page.clamp(1, 1_000);
        fr.max_pages = fr.max_pages.clamp(1, 100);
        fr.page_delay_ms = fr.page_delay_ms.min(10_000);
        trim_trailing_slash(&mut fr.api_url);

        let sm = &mut self.summarizer;
        sm.timeout_secs = sm.timeout_secs.clamp(10, 300);
        sm.cache_ttl_secs = sm.cache_ttl_secs.min(MAX_SUMMARY_CACHE_TTL_SECS);
        trim_trailing_slash(&mut sm.api_url);
    }

    /// Non-fatal configuration gaps worth a startup warning.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.summarizer.use_mock && !self.summarizer.has_credential() {
            out.push("GROK_API_KEY is not configured; summaries will be truncated text");
        }
        if self.database_url.is_none() {
            out.push("DATABASE_URL is not set; using the in-memory store");
        }
        out
    }
}

fn env_parse<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(target: "config", key, value = %raw, "ignoring unparseable value"),
        }
    }
}

fn env_string<F>(lookup: &F, key: &str, target: &mut String)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().to_string();
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn trim_trailing_slash(url: &mut String) {
    while url.ends_with('/') {
        url.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::{env, fs};

    #[test]
    fn env_overrides_and_clamps() {
        let vars: HashMap<&str, &str> = [
            ("SCRAPER_INTERVAL_MINUTES", "0"),
            ("SCRAPER_DAYS_LOOKBACK", "90"),
            ("FEDERAL_REGISTER_PER_PAGE", "not-a-number"),
            ("FEDERAL_REGISTER_MAX_PAGES", "5"),
            ("GROK_API_URL", "https://example.test/v1/"),
            ("USE_MOCK_GROK", "True"),
            ("ALLOWED_ORIGINS", "http://a.test, ,http://b.test"),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        cfg.sanitize();

        assert_eq!(cfg.scraper.interval_minutes, 1);
        assert_eq!(cfg.scraper.lookback_days, 30);
        assert_eq!(cfg.federal_register.per_page, 100);
        assert_eq!(cfg.federal_register.max_pages, 5);
        assert_eq!(cfg.summarizer.api_url, "https://example.test/v1");
        assert!(cfg.summarizer.use_mock);
        assert_eq!(cfg.allowed_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn cache_ttl_is_capped_at_thirty_days() {
        let vars: HashMap<&str, &str> = [("SUMMARY_CACHE_TTL_SECS", "10000000000000")]
            .into_iter()
            .collect();

        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.summarizer.cache_ttl_secs, 10_000_000_000_000);
        cfg.sanitize();
        assert_eq!(cfg.summarizer.cache_ttl_secs, MAX_SUMMARY_CACHE_TTL_SECS);

        cfg.summarizer.cache_ttl_secs = 3_600;
        cfg.sanitize();
        assert_eq!(cfg.summarizer.cache_ttl_secs, 3_600);
    }

    #[test]
    fn missing_key_is_a_warning_not_an_error() {
        let cfg = AppConfig::default();
        assert!(!cfg.summarizer.has_credential());
        assert_eq!(cfg.warnings().len(), 2);
    }

    #[serial_test::serial]
    #[test]
    fn load_reads_file_from_env_path() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("scraper.toml");
        fs::write(
            &p,
            r#"
[scraper]
lookback_days = 3
batch_size = 10

[federal_register]
max_pages = 4
"#,
        )
        .unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        let cfg = AppConfig::load().unwrap();
        env::remove_var(ENV_CONFIG_PATH);

        assert_eq!(cfg.scraper.lookback_days, 3);
        assert_eq!(cfg.scraper.batch_size, 10);
        assert_eq!(cfg.scraper.interval_minutes, 15);
        assert_eq!(cfg.federal_register.max_pages, 4);
    }

    #[serial_test::serial]
    #[test]
    fn load_fails_when_env_path_missing() {
        env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
        let res = AppConfig::load();
        env::remove_var(ENV_CONFIG_PATH);
        assert!(res.is_err());
    }
}
