use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub selector: SelectorConfig,
    pub planner: PlannerConfig,
    pub harvest: HarvestConfig,
    pub logging: LoggingConfig,
}

/// Tunables for candidate generation and ranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Minimum match count for structural-pattern candidates
    pub structural_min_matches: usize,
    /// Minimum repetition for a class to count as a repeated child pattern
    pub repeated_class_min: usize,
    /// Class tokens of at least this many lowercase alphanumerics (with a
    /// digit) are treated as generated hashes and penalized. Empirical, not
    /// load-bearing.
    pub hash_class_min_len: usize,
    /// Fallback chain length behind the primary, before the terminal body
    pub max_fallbacks: usize,
    /// How many elements to request when sampling matched elements
    pub sample_limit: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            structural_min_matches: 3,
            repeated_class_min: 3,
            hash_class_min_len: 8,
            max_fallbacks: 3,
            sample_limit: 50,
        }
    }
}

/// Tunables for complexity analysis and strategy planning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Base duration assumed for the primary extraction phase
    pub extraction_base_ms: u64,
    /// Extra extraction time budgeted when a vision source participates
    pub vision_extra_ms: u64,
    /// Extra extraction time budgeted when a navigation source participates
    pub navigation_extra_ms: u64,
    pub max_memory_mb: u64,
    pub max_cpu_percent: u8,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            extraction_base_ms: 10_000,
            vision_extra_ms: 10_000,
            navigation_extra_ms: 8_000,
            max_memory_mb: 512,
            max_cpu_percent: 80,
        }
    }
}

/// Tunables for harvest coordination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Sessions older than this are eligible for purging
    pub session_retention_secs: u64,
    /// Applied per dispatched source when the plan carries no timeout
    pub default_source_timeout_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            session_retention_secs: 3600,
            default_source_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: PathBuf,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            console_enabled: true,
            log_directory: PathBuf::from("logs"),
            max_files: 5,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            selector: SelectorConfig::default(),
            planner: PlannerConfig::default(),
            harvest: HarvestConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it on first run
    pub async fn load() -> Result<Self> {
        let config_path = get_config_path();

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            info!("No configuration file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub async fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut config: AppConfig = toml::from_str(&content)?;

        ConfigOverrides::apply(&mut config);
        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to the default location
    pub async fn save(&self) -> Result<()> {
        let config_path = get_config_path();

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(&config_path, content).await?;

        info!("Configuration saved to: {}", config_path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.selector.structural_min_matches == 0 {
            return Err(anyhow::anyhow!("selector.structural_min_matches must be > 0"));
        }

        if self.selector.hash_class_min_len < 4 {
            return Err(anyhow::anyhow!("selector.hash_class_min_len must be >= 4"));
        }

        if self.planner.extraction_base_ms == 0 {
            return Err(anyhow::anyhow!("planner.extraction_base_ms must be > 0"));
        }

        if self.planner.max_cpu_percent == 0 || self.planner.max_cpu_percent > 100 {
            return Err(anyhow::anyhow!("planner.max_cpu_percent must be in 1..=100"));
        }

        if self.harvest.session_retention_secs == 0 {
            return Err(anyhow::anyhow!("harvest.session_retention_secs must be > 0"));
        }

        if self.harvest.default_source_timeout_ms == 0 {
            return Err(anyhow::anyhow!("harvest.default_source_timeout_ms must be > 0"));
        }

        Ok(())
    }
}

/// Get the configuration file path
fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("io", "pageharvest", "pageharvest")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides to configuration
    pub fn apply(config: &mut AppConfig) {
        if let Ok(level) = std::env::var("PAGEHARVEST_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(retention) = std::env::var("PAGEHARVEST_SESSION_RETENTION_SECS") {
            if let Ok(secs) = retention.parse::<u64>() {
                config.harvest.session_retention_secs = secs;
            }
        }

        if let Ok(timeout) = std::env::var("PAGEHARVEST_SOURCE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.harvest.default_source_timeout_ms = ms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_retention() {
        let mut config = AppConfig::default();
        config.harvest.session_retention_secs = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::default();
        let content = toml::to_string_pretty(&config).unwrap();
        tokio::fs::write(&path, content).await.unwrap();

        let loaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(
            loaded.selector.structural_min_matches,
            config.selector.structural_min_matches
        );
        assert_eq!(loaded.planner.extraction_base_ms, config.planner.extraction_base_ms);
    }
}
