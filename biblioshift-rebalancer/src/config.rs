//! Rebalancer configuration
//!
//! Configuration loaded from environment variables and command line.

use biblioshift_core::AuthorId;
use biblioshift_inventory::DbConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Order in which candidate books are planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityMode {
    /// Selector order (ascending book id)
    #[default]
    None,
    /// Newest books first
    YearDesc,
    /// Books by the configured authors first (newest first), then the rest by id
    AuthorFirst,
}

impl PriorityMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, PriorityMode::None)
    }
}

impl FromStr for PriorityMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "none" => Ok(Self::None),
            "year_desc" => Ok(Self::YearDesc),
            "author_first" => Ok(Self::AuthorFirst),
            other => Err(ConfigError::InvalidValue(
                "priority".to_string(),
                format!("'{other}' (expected none, year_desc or author_first)"),
            )),
        }
    }
}

impl fmt::Display for PriorityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::YearDesc => write!(f, "year_desc"),
            Self::AuthorFirst => write!(f, "author_first"),
        }
    }
}

/// Parse a comma-separated author id list. Blank entries are skipped.
pub fn parse_author_ids(s: &str) -> Result<BTreeSet<AuthorId>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<AuthorId>().map_err(|_| {
                ConfigError::InvalidValue("authors".to_string(), format!("'{part}' is not an id"))
            })
        })
        .collect()
}

/// Options for one rebalance run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceOptions {
    /// Never plan a move into a library without free capacity
    pub capacity_aware: bool,
    pub priority: PriorityMode,
    /// Authors promoted by [`PriorityMode::AuthorFirst`]
    pub authors: BTreeSet<AuthorId>,
    /// Plan only; leave holdings untouched
    pub dry_run: bool,
}

impl Default for RebalanceOptions {
    fn default() -> Self {
        Self {
            capacity_aware: false,
            priority: PriorityMode::None,
            authors: BTreeSet::new(),
            dry_run: true,
        }
    }
}

impl RebalanceOptions {
    /// Normalize option combinations.
    ///
    /// Priority ordering only matters when books compete for capacity, so any
    /// priority mode turns capacity awareness on.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.priority.is_enabled() && !self.capacity_aware {
            warn!(priority = %self.priority, "Priority ordering implies capacity awareness");
            self.capacity_aware = true;
        }

        match self.priority {
            PriorityMode::AuthorFirst if self.authors.is_empty() => {
                warn!("author_first without authors: candidates are planned in id order");
            }
            PriorityMode::None | PriorityMode::YearDesc if !self.authors.is_empty() => {
                warn!(priority = %self.priority, "Author ids are only used by author_first");
            }
            _ => {}
        }

        if self.authors.iter().any(|id| *id <= 0) {
            return Err(ConfigError::InvalidValue(
                "authors".to_string(),
                "author ids must be positive".to_string(),
            ));
        }

        Ok(self)
    }
}

/// Rebalancer configuration
#[derive(Debug, Clone)]
pub struct RebalancerConfig {
    /// PostgreSQL database URL
    pub database_url: String,

    /// Connection pool size
    pub max_connections: u32,

    /// How long an apply waits for row locks
    pub lock_timeout_ms: u64,

    /// Default run options
    pub options: RebalanceOptions,

    /// Moves listed in the human-readable report
    pub preview_limit: usize,
}

impl Default for RebalancerConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            lock_timeout_ms: 5_000,
            options: RebalanceOptions::default(),
            preview_limit: 50,
        }
    }
}

/// Smallest pool that can plan: one connection streams candidates, one reads
pub const MIN_CONNECTIONS: u32 = 2;

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), v)),
        _ => Ok(default),
    }
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

impl RebalancerConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(None)
    }

    /// Create configuration from environment variables, with an explicit
    /// database URL taking precedence over `DATABASE_URL`
    pub fn from_env_with(database_url: Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = match database_url {
            Some(url) => url,
            None => std::env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?,
        };

        let max_connections = env_parse("BIBLIOSHIFT_DB_MAX_CONNECTIONS", defaults.max_connections)?;
        let lock_timeout_ms = env_parse("BIBLIOSHIFT_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms)?;
        let preview_limit = env_parse("BIBLIOSHIFT_PREVIEW_LIMIT", defaults.preview_limit)?;
        let priority = env_parse("BIBLIOSHIFT_PRIORITY", PriorityMode::None)?;

        let authors = match std::env::var("BIBLIOSHIFT_AUTHORS") {
            Ok(v) => parse_author_ids(&v)?,
            Err(_) => BTreeSet::new(),
        };

        let config = Self {
            database_url,
            max_connections,
            lock_timeout_ms,
            options: RebalanceOptions {
                capacity_aware: env_flag("BIBLIOSHIFT_CAPACITY_AWARE"),
                priority,
                authors,
                dry_run: true,
            },
            preview_limit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the database settings
    ///
    /// A run streams candidates on one connection while it reads holdings on
    /// another, so the pool needs at least two. A zero lock timeout would
    /// let PostgreSQL wait on row locks forever.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections < MIN_CONNECTIONS {
            return Err(ConfigError::InvalidValue(
                "BIBLIOSHIFT_DB_MAX_CONNECTIONS".to_string(),
                format!("{} (at least {MIN_CONNECTIONS} required)", self.max_connections),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "BIBLIOSHIFT_LOCK_TIMEOUT_MS".to_string(),
                "0 (must be positive)".to_string(),
            ));
        }
        Ok(())
    }

    /// Get lock timeout as Duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Database settings for the inventory store
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.database_url.clone(),
            max_connections: self.max_connections,
            lock_timeout: self.lock_timeout(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RebalancerConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.preview_limit, 50);
        assert!(config.options.dry_run);
        assert!(!config.options.capacity_aware);
        assert_eq!(config.options.priority, PriorityMode::None);
    }

    #[test]
    fn test_lock_timeout_duration() {
        let config = RebalancerConfig {
            lock_timeout_ms: 1_500,
            ..Default::default()
        };
        assert_eq!(config.lock_timeout(), Duration::from_millis(1_500));
        assert_eq!(config.db_config().lock_timeout, Duration::from_millis(1_500));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(RebalancerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_single_connection_pool_rejected() {
        let config = RebalancerConfig {
            max_connections: 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(key, _)) if key == "BIBLIOSHIFT_DB_MAX_CONNECTIONS"
        ));

        let config = RebalancerConfig {
            max_connections: MIN_CONNECTIONS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_lock_timeout_rejected() {
        let config = RebalancerConfig {
            lock_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(key, _)) if key == "BIBLIOSHIFT_LOCK_TIMEOUT_MS"
        ));
    }

    #[test]
    fn test_priority_parse_and_display() {
        for mode in [
            PriorityMode::None,
            PriorityMode::YearDesc,
            PriorityMode::AuthorFirst,
        ] {
            assert_eq!(mode.to_string().parse::<PriorityMode>().unwrap(), mode);
        }
        assert!(matches!(
            "oldest".parse::<PriorityMode>(),
            Err(ConfigError::InvalidValue(_, _))
        ));
    }

    #[test]
    fn test_parse_author_ids() {
        let ids = parse_author_ids("3, 1,,2 ").unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(parse_author_ids("").unwrap().is_empty());
        assert!(parse_author_ids("1,abc").is_err());
    }

    #[test]
    fn test_priority_implies_capacity_awareness() {
        let options = RebalanceOptions {
            priority: PriorityMode::YearDesc,
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(options.capacity_aware);
    }

    #[test]
    fn test_base_options_unchanged_by_validation() {
        let options = RebalanceOptions::default().validate().unwrap();
        assert_eq!(options, RebalanceOptions::default());
    }

    #[test]
    fn test_non_positive_author_rejected() {
        let options = RebalanceOptions {
            priority: PriorityMode::AuthorFirst,
            authors: [0].into_iter().collect(),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}
