//! Environment-driven configuration of the storage layer

use crate::archive::ArchiveLimits;
use std::path::PathBuf;
use std::str::FromStr;

/// Directory used for staging uploads
pub const ENV_TEMP_DIR: &str = "CASE_TEMP_DIR";
/// Maximum number of entries accepted in an archive
pub const ENV_ARCHIVE_MAX_ENTRIES: &str = "CASE_ARCHIVE_MAX_ENTRIES";
/// Maximum decompressed size of all archive entries together
pub const ENV_ARCHIVE_MAX_TOTAL_BYTES: &str = "CASE_ARCHIVE_MAX_TOTAL_BYTES";
/// Number of connection attempts before giving up on the database
pub const ENV_DATABASE_MAX_RETRIES: &str = "DATABASE_MAX_RETRIES";
/// Delay before the first connection retry, doubled on every attempt
pub const ENV_DATABASE_RETRY_DELAY_SECONDS: &str = "DATABASE_RETRY_DELAY_SECONDS";

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root under which per-operation temporary directories are created
    pub temp_root: PathBuf,
    /// Zip-bomb protection for archive imports
    pub archive_limits: ArchiveLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir(),
            archive_limits: ArchiveLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            temp_root: std::env::var_os(ENV_TEMP_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_root),
            archive_limits: ArchiveLimits {
                max_entries: env_or(ENV_ARCHIVE_MAX_ENTRIES, defaults.archive_limits.max_entries),
                max_total_bytes: env_or(
                    ENV_ARCHIVE_MAX_TOTAL_BYTES,
                    defaults.archive_limits.max_total_bytes,
                ),
            },
        }
    }
}

/// Database connection retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRetryConfig {
    pub max_attempts: u32,
    pub initial_delay_seconds: u64,
}

impl Default for DatabaseRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_seconds: 1,
        }
    }
}

impl DatabaseRetryConfig {
    /// Get retry configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: env_or(ENV_DATABASE_MAX_RETRIES, defaults.max_attempts).max(1),
            initial_delay_seconds: env_or(
                ENV_DATABASE_RETRY_DELAY_SECONDS,
                defaults.initial_delay_seconds,
            ),
        }
    }
}
