use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::dedup::{DEFAULT_SIMILARITY_THRESHOLD, DedupError, DedupOptions, DedupStrategy};
use crate::fetcher::FetchOptions;
use crate::models::{GameSource, ParseMethod};
use crate::rate_limiter::RateLimiter;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Dedup(#[from] DedupError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScraperSection {
    /// Minimum gap between requests to one host
    pub delay_ms: u64,
    /// Random extra gap, as a fraction of `delay_ms` (0.0 to 1.0)
    pub jitter: f64,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    /// Pages fetched at once
    pub concurrency: usize,
    pub method: ParseMethod,
}

impl Default for ScraperSection {
    fn default() -> Self {
        Self {
            delay_ms: 2000,
            jitter: 0.1,
            max_retries: 3,
            timeout_seconds: 30,
            concurrency: 3,
            method: ParseMethod::Content,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DedupSection {
    pub enabled: bool,
    pub strategy: String,
    pub threshold: f64,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: DedupStrategy::default().to_string(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
    pub image_dir: PathBuf,
    pub image_delay_ms: u64,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            image_dir: PathBuf::from("images"),
            image_delay_ms: 1000,
        }
    }
}

/// Run settings: built-in defaults, optionally overlaid by a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScraperConfig {
    pub scraper: ScraperSection,
    pub dedup: DedupSection,
    pub output: OutputSection,
    pub games: Vec<GameSource>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperSection::default(),
            dedup: DedupSection::default(),
            output: OutputSection::default(),
            games: default_games(),
        }
    }
}

pub fn default_games() -> Vec<GameSource> {
    vec![
        GameSource::new(
            "MW2_2022",
            "https://www.imfdb.org/wiki/Call_of_Duty:_Modern_Warfare_II_(2022)",
        ),
        GameSource::new(
            "MW3_2023",
            "https://www.imfdb.org/wiki/Call_of_Duty:_Modern_Warfare_III_(2023)",
        ),
        GameSource::new("Ready_or_Not", "https://www.imfdb.org/wiki/Ready_or_Not"),
        GameSource::new(
            "Delta_Force_2024",
            "https://www.imfdb.org/wiki/Delta_Force_(2024_VG)",
        ),
    ]
}

/// `<config dir>/imfdb-scraper/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("imfdb-scraper").join("config.toml"))
}

impl ScraperConfig {
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: ScraperConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the default location when `None`. A missing file
    /// yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path.is_some();
        let Some(path) = path.map(Path::to_path_buf).or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            if explicit {
                tracing::warn!("Configuration file not found at {:?}, using defaults", path);
            } else {
                tracing::debug!("no configuration file at {:?}", path);
            }
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&content, &path)?;
        tracing::info!(path = %path.display(), games = config.games.len(), "loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for game in &self.games {
            if game.name.trim().is_empty() {
                return Err(ConfigError::Invalid("game name cannot be empty".into()));
            }
            if game.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "URL for game '{}' cannot be empty",
                    game.name
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.dedup.threshold) {
            return Err(ConfigError::Invalid(format!(
                "dedup threshold {} must be within [0, 1]",
                self.dedup.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.scraper.jitter) {
            return Err(ConfigError::Invalid(format!(
                "jitter {} must be within [0, 1]",
                self.scraper.jitter
            )));
        }
        if self.scraper.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.scraper.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("timeout must be greater than 0".into()));
        }
        self.dedup.strategy.parse::<DedupStrategy>()?;
        Ok(())
    }

    pub fn dedup_options(&self) -> Result<DedupOptions, ConfigError> {
        let strategy = self.dedup.strategy.parse::<DedupStrategy>()?;
        Ok(DedupOptions::new(strategy, self.dedup.threshold))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new(self.scraper.max_retries, self.request_delay())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.scraper.delay_ms)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::with_jitter(self.request_delay(), self.scraper.jitter)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.scraper.timeout_seconds)
    }

    pub fn image_delay(&self) -> Duration {
        Duration::from_millis(self.output.image_delay_ms)
    }

    pub fn game(&self, name: &str) -> Option<&GameSource> {
        self.games.iter().find(|g| g.name == name)
    }
}
