//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! environment variables or configuration files.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Historical sync configuration.
    pub sync: SyncSettings,
    /// Indexing store / row cache configuration.
    pub store: StoreSettings,
    /// RPC retry and prefetch configuration.
    pub rpc: RpcSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `PALISADE_` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("sync.max_task_concurrency", 20)?
            .set_default("sync.default_max_block_range", 2000)?
            .set_default("sync.trace_block_range", 10)?
            .set_default("sync.checkpoint_debounce_ms", 500)?
            .set_default("sync.progress_log_interval_secs", 10)?
            .set_default("sync.child_address_batch_size", 500)?
            .set_default("store.max_cache_bytes", 1_073_741_824_u64)?
            .set_default("store.flush_ratio", 0.35)?
            .set_default("store.max_query_parameters", 65_534)?
            .set_default("rpc.max_retry_attempts", 10)?
            .set_default("rpc.retry_base_backoff_ms", 125)?
            .set_default("rpc.memory_cache_max_entries", 100_000_u64)?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (PALISADE_ prefix)
            .add_source(
                Environment::with_prefix("PALISADE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Sync validation
        if self.sync.max_task_concurrency == 0 {
            errors.push("sync.max_task_concurrency must be non-zero".into());
        }
        if self.sync.default_max_block_range == 0 {
            errors.push("sync.default_max_block_range must be non-zero".into());
        }
        if self.sync.trace_block_range == 0 {
            errors.push("sync.trace_block_range must be non-zero".into());
        }
        if self.sync.child_address_batch_size == 0 {
            errors.push("sync.child_address_batch_size must be non-zero".into());
        }

        // Store validation
        if self.store.max_cache_bytes == 0 {
            errors.push("store.max_cache_bytes must be non-zero".into());
        }
        if !(0.0..=1.0).contains(&self.store.flush_ratio) {
            errors.push("store.flush_ratio must be within [0, 1]".into());
        }
        if self.store.max_query_parameters == 0 {
            errors.push("store.max_query_parameters must be non-zero".into());
        }

        // RPC validation
        if self.rpc.max_retry_attempts == 0 {
            errors.push("rpc.max_retry_attempts must be non-zero".into());
        }
        if self.rpc.retry_base_backoff_ms == 0 {
            errors.push("rpc.retry_base_backoff_ms must be non-zero".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNC SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Historical sync scheduler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    /// Maximum sync tasks in flight per chain.
    pub max_task_concurrency: usize,
    /// Default `eth_getLogs` range when a source has no override.
    pub default_max_block_range: u64,
    /// Fixed chunk size for trace-filter sources.
    pub trace_block_range: u64,
    /// Minimum spacing between emitted checkpoints, milliseconds.
    pub checkpoint_debounce_ms: u64,
    /// Interval between sync progress log lines, seconds.
    pub progress_log_interval_secs: u64,
    /// Child addresses fetched per sync-store batch.
    pub child_address_batch_size: usize,
}

impl SyncSettings {
    /// Checkpoint debounce as a `Duration`.
    #[must_use]
    pub const fn checkpoint_debounce(&self) -> Duration {
        Duration::from_millis(self.checkpoint_debounce_ms)
    }

    /// Progress log interval as a `Duration`.
    #[must_use]
    pub const fn progress_log_interval(&self) -> Duration {
        Duration::from_secs(self.progress_log_interval_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_task_concurrency: 20,
            default_max_block_range: 2000,
            trace_block_range: 10,
            checkpoint_debounce_ms: 500,
            progress_log_interval_secs: 10,
            child_address_batch_size: 500,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Indexing store / row cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// Row cache size threshold that triggers eviction at flush time.
    pub max_cache_bytes: u64,
    /// Fraction of entries (oldest first) evicted by an over-budget
    /// flush. Must be within `[0, 1]`.
    pub flush_ratio: f64,
    /// Bind-parameter budget per flush statement (Postgres caps at
    /// 65535).
    pub max_query_parameters: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_cache_bytes: 1_073_741_824,
            flush_ratio: 0.35,
            max_query_parameters: 65_534,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPC SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// RPC retry and response cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    /// Attempts per user-visible RPC action.
    pub max_retry_attempts: u32,
    /// First retry backoff, milliseconds; doubles each attempt.
    pub retry_base_backoff_ms: u64,
    /// Capacity of the in-memory RPC response cache.
    pub memory_cache_max_entries: u64,
}

impl RpcSettings {
    /// Base backoff as a `Duration`.
    #[must_use]
    pub const fn retry_base_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_base_backoff_ms)
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            max_retry_attempts: 10,
            retry_base_backoff_ms: 125,
            memory_cache_max_entries: 100_000,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
