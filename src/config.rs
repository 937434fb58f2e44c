// src/config.rs
//! Runtime configuration: environment variables plus the sources file
//! (routing overrides, adapter declarations, refresh targets).

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::acquire::{CoordinatorConfig, RetryPolicy};
use crate::cache::{CachePolicy, DedupPolicy};
use crate::jobs::DEFAULT_QUEUE_CAPACITY;
use crate::normalize::NormalizerConfig;
use crate::scheduler::RefreshTarget;
use crate::sources::AdapterSpec;
use crate::store::postgrest::{PostgrestConfig, DEFAULT_TABLE};

const ENV_SOURCES_PATH: &str = "SOURCES_CONFIG_PATH";

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory,
    Postgrest(PostgrestConfig),
}

impl StoreConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgrest(_) => "postgrest",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub coordinator: CoordinatorConfig,
    pub cache: CachePolicy,
    pub normalizer: NormalizerConfig,
    pub queue_capacity: usize,
    pub store: StoreConfig,
    /// `None` disables the periodic refresh.
    pub refresh_interval: Option<Duration>,
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            cache: CachePolicy::default(),
            normalizer: NormalizerConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            store: StoreConfig::Memory,
            refresh_interval: None,
            environment: "development".to_string(),
        }
    }
}

impl AppConfig {
    /// Read every knob from the environment; unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();

        let coordinator = CoordinatorConfig {
            adapter_timeout: Duration::from_secs(env_parse(
                "SCRAPER_ADAPTER_TIMEOUT_SECS",
                d.coordinator.adapter_timeout.as_secs(),
            )?),
            max_in_flight: env_parse("SCRAPER_MAX_IN_FLIGHT", d.coordinator.max_in_flight)?,
            per_adapter_limit: env_parse("SCRAPER_PER_ADAPTER_LIMIT", d.coordinator.per_adapter_limit)?,
        };
        if coordinator.max_in_flight == 0 {
            bail!("SCRAPER_MAX_IN_FLIGHT must be at least 1");
        }

        let retry = RetryPolicy::single()
            .with_attempts(env_parse("SCRAPER_MAX_ATTEMPTS", 1u32)?)
            .with_backoff(Duration::from_millis(env_parse("SCRAPER_RETRY_BACKOFF_MS", 1000u64)?));

        let cache = CachePolicy {
            min_result_count: env_parse("CACHE_MIN_RESULTS", d.cache.min_result_count)?,
            result_limit: env_parse("CACHE_RESULT_LIMIT", d.cache.result_limit)?,
            dedup: env_parse("CACHE_DEDUP", DedupPolicy::None)?,
            retry,
        };

        let mut normalizer = d.normalizer;
        normalizer.ten_point_divisor =
            env_parse("RATING_TEN_POINT_DIVISOR", normalizer.ten_point_divisor)?;
        if normalizer.ten_point_divisor.is_nan() || normalizer.ten_point_divisor <= 0.0 {
            bail!("RATING_TEN_POINT_DIVISOR must be a positive number");
        }

        let refresh_secs: u64 = env_parse("REFRESH_INTERVAL_SECS", 0)?;

        Ok(Self {
            coordinator,
            cache,
            normalizer,
            queue_capacity: env_parse("JOB_QUEUE_CAPACITY", d.queue_capacity)?,
            store: store_from_env()?,
            refresh_interval: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
            environment: std::env::var("APP_ENV")
                .or_else(|_| std::env::var("SHUTTLE_ENV"))
                .unwrap_or(d.environment),
        })
    }
}

fn store_from_env() -> Result<StoreConfig> {
    let url = non_empty_env("SUPABASE_URL");
    let key = non_empty_env("SUPABASE_SERVICE_ROLE_KEY").or_else(|| non_empty_env("SUPABASE_KEY"));
    let backend = non_empty_env("STORE_BACKEND").map(|s| s.to_ascii_lowercase());

    let wants_postgrest = match backend.as_deref() {
        Some("memory") => false,
        Some("postgrest") | Some("supabase") => true,
        Some(other) => bail!("unknown STORE_BACKEND '{other}' (expected 'memory' or 'postgrest')"),
        None => url.is_some() && key.is_some(),
    };
    if !wants_postgrest {
        return Ok(StoreConfig::Memory);
    }

    let (Some(url), Some(key)) = (url, key) else {
        bail!("postgrest store needs SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY");
    };
    let table = non_empty_env("STORE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());
    Ok(StoreConfig::Postgrest(PostgrestConfig::new(url, key).with_table(table)))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `name` if set and non-empty, else return `default`.
pub fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match non_empty_env(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow!("invalid value for {name} ('{raw}'): {e}")),
        None => Ok(default),
    }
}

/// Contents of the sources file. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesFile {
    /// Per-pair overrides keyed like `digital_service`.
    #[serde(default)]
    pub routing: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub adapters: Vec<AdapterSpec>,
    #[serde(default)]
    pub refresh: Vec<RefreshTarget>,
}

/// Load a sources file from an explicit path. TOML or JSON, by extension
/// first and content second. Relative fixture paths resolve against the
/// file's directory.
pub fn load_sources_from(path: &Path) -> Result<SourcesFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut file = parse_sources(&content, &ext)
        .with_context(|| format!("parsing sources file {}", path.display()))?;

    if let Some(dir) = path.parent() {
        for spec in file.adapters.iter_mut() {
            if let AdapterSpec::Fixture { path: p, .. } = spec {
                if p.is_relative() {
                    *p = dir.join(&*p);
                }
            }
        }
    }
    Ok(file)
}

/// Load sources using env var + fallbacks:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
///
/// Nothing found means built-in routing and no adapters.
pub fn load_sources_default() -> Result<SourcesFile> {
    if let Some(p) = non_empty_env(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_SOURCES_PATH} points to non-existent path {}", pb.display());
        }
        return load_sources_from(&pb);
    }
    for candidate in ["config/sources.toml", "config/sources.json"] {
        let pb = PathBuf::from(candidate);
        if pb.exists() {
            return load_sources_from(&pb);
        }
    }
    Ok(SourcesFile::default())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<SourcesFile> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => {
            if let Ok(v) = serde_json::from_str(s) {
                return Ok(v);
            }
            toml::from_str(s).map_err(|e| anyhow!("unsupported sources format: {e}"))
        }
    }
}
