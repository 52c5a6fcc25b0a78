//! Configuration management.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for synapt.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Directory holding the record, weight, and task databases.
    pub data_dir: PathBuf,
    /// How many recent records feed back into classification and generation.
    pub context_window: usize,
    /// Maximum number of recall results.
    pub recall_limit: usize,
    /// Generative backend configuration.
    pub llm: LlmConfig,
    /// Durable fact log configuration.
    pub durable: DurableConfig,
    /// Synchronizer timing.
    pub sync: SyncConfig,
    /// Capability dispatch settings.
    pub dispatch: DispatchConfig,
    /// Keyword weight learning settings.
    pub weights: WeightConfig,
}

/// Generative backend configuration.
///
/// API keys are never stored here; backends read them from the
/// environment (`OPENAI_API_KEY` and friends).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Backend name: "openai", "ollama", "scripted".
    pub backend: String,
    /// Model name override.
    pub model: Option<String>,
    /// Base URL override (for self-hosted endpoints).
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            model: None,
            endpoint: None,
            timeout_ms: None,
            connect_timeout_ms: None,
        }
    }
}

/// Durable fact log configuration.
///
/// With no endpoint configured the agent runs fully local: records queue
/// in the local store until an endpoint is set.
#[derive(Debug, Clone, Default)]
pub struct DurableConfig {
    /// Base URL of the fact log service.
    pub endpoint: Option<String>,
    /// Bearer token for the fact log service.
    pub api_token: Option<String>,
}

/// Synchronizer timing configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Whether the agent starts the background worker on construction.
    pub auto_start: bool,
    /// Startup grace period before the first sync cycle, in seconds.
    pub initial_delay_secs: u64,
    /// Interval between sync cycles, in seconds.
    pub interval_secs: u64,
    /// Ceiling for the failure backoff interval, in seconds.
    pub max_backoff_secs: u64,
    /// How long `stop` waits for the worker, in seconds.
    pub stop_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            initial_delay_secs: 60,
            interval_secs: 300,
            max_backoff_secs: 3_600,
            stop_timeout_secs: 5,
        }
    }
}

impl SyncConfig {
    /// Returns the initial delay as a [`Duration`].
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Returns the cycle interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the backoff ceiling as a [`Duration`].
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Returns the stop timeout as a [`Duration`].
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Capability dispatch configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Per-call timeout for dispatch model calls, in milliseconds.
    pub call_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: crate::routing::DEFAULT_CALL_TIMEOUT_MS,
        }
    }
}

/// Keyword weight learning configuration.
#[derive(Debug, Clone)]
pub struct WeightConfig {
    /// Weight added to each keyword on positive feedback.
    pub boost_amount: f32,
    /// Weight removed from every keyword per decay pass.
    pub decay_rate: f32,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            boost_amount: 0.1,
            decay_rate: 0.05,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Context window size.
    pub context_window: Option<usize>,
    /// Recall result limit.
    pub recall_limit: Option<usize>,
    /// Generative backend section.
    pub llm: Option<ConfigFileLlm>,
    /// Durable fact log section.
    pub durable: Option<ConfigFileDurable>,
    /// Synchronizer section.
    pub sync: Option<ConfigFileSync>,
    /// Dispatch section.
    pub dispatch: Option<ConfigFileDispatch>,
    /// Weight learning section.
    pub weights: Option<ConfigFileWeights>,
}

/// LLM section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Backend name.
    pub backend: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Base URL.
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// Durable store section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDurable {
    /// Fact log base URL.
    pub endpoint: Option<String>,
    /// Bearer token.
    pub api_token: Option<String>,
}

/// Synchronizer section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileSync {
    /// Auto-start flag.
    pub auto_start: Option<bool>,
    /// Initial delay in seconds.
    pub initial_delay_secs: Option<u64>,
    /// Cycle interval in seconds.
    pub interval_secs: Option<u64>,
    /// Backoff ceiling in seconds.
    pub max_backoff_secs: Option<u64>,
    /// Stop timeout in seconds.
    pub stop_timeout_secs: Option<u64>,
}

/// Dispatch section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileDispatch {
    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: Option<u64>,
}

/// Weights section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileWeights {
    /// Boost amount per positive feedback.
    pub boost_amount: Option<f32>,
    /// Decay rate per pass.
    pub decay_rate: Option<f32>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            context_window: 6,
            recall_limit: 10,
            llm: LlmConfig::default(),
            durable: DurableConfig::default(),
            sync: SyncConfig::default(),
            dispatch: DispatchConfig::default(),
            weights: WeightConfig::default(),
        }
    }
}

/// Platform data directory for synapt, falling back to `.synapt` when no
/// home directory can be resolved.
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "synapt").map_or_else(
        || PathBuf::from(".synapt"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

impl CoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/synapt/` on macOS)
    /// 2. XDG config dir (`~/.config/synapt/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found. Environment
    /// overrides are applied last either way.
    #[must_use]
    pub fn load_default() -> Self {
        Self::load_default_file().with_env_overrides()
    }

    fn load_default_file() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        // Check platform-specific config dir first
        let platform_config = base_dirs.config_dir().join("synapt").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        // Fall back to XDG-style ~/.config/synapt/ for Unix compatibility
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("synapt")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `CoreConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(context_window) = file.context_window {
            config.context_window = context_window;
        }
        if let Some(recall_limit) = file.recall_limit {
            config.recall_limit = recall_limit;
        }
        if let Some(llm) = file.llm {
            if let Some(backend) = llm.backend {
                config.llm.backend = backend;
            }
            config.llm.model = llm.model;
            config.llm.endpoint = llm.endpoint;
            config.llm.timeout_ms = llm.timeout_ms;
            config.llm.connect_timeout_ms = llm.connect_timeout_ms;
        }
        if let Some(durable) = file.durable {
            config.durable.endpoint = durable.endpoint;
            config.durable.api_token = durable.api_token;
        }
        if let Some(sync) = file.sync {
            if let Some(v) = sync.auto_start {
                config.sync.auto_start = v;
            }
            if let Some(v) = sync.initial_delay_secs {
                config.sync.initial_delay_secs = v;
            }
            if let Some(v) = sync.interval_secs {
                config.sync.interval_secs = v;
            }
            if let Some(v) = sync.max_backoff_secs {
                config.sync.max_backoff_secs = v;
            }
            if let Some(v) = sync.stop_timeout_secs {
                config.sync.stop_timeout_secs = v;
            }
        }
        if let Some(dispatch) = file.dispatch {
            if let Some(v) = dispatch.call_timeout_ms {
                config.dispatch.call_timeout_ms = v;
            }
        }
        if let Some(weights) = file.weights {
            if let Some(v) = weights.boost_amount {
                config.weights.boost_amount = v;
            }
            if let Some(v) = weights.decay_rate {
                config.weights.decay_rate = v;
            }
        }

        config
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("SYNAPT_DATA_DIR") {
            if !v.is_empty() {
                self.data_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("SYNAPT_LLM_BACKEND") {
            if !v.is_empty() {
                self.llm.backend = v;
            }
        }
        if let Ok(v) = std::env::var("SYNAPT_DURABLE_ENDPOINT") {
            if !v.is_empty() {
                self.durable.endpoint = Some(v);
            }
        }
        if let Ok(v) = std::env::var("SYNAPT_DURABLE_API_TOKEN") {
            if !v.is_empty() {
                self.durable.api_token = Some(v);
            }
        }
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the generative backend name.
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.llm.backend = backend.into();
        self
    }

    /// Path of the conversation record database.
    #[must_use]
    pub fn records_db_path(&self) -> PathBuf {
        self.data_dir.join("records.db")
    }

    /// Path of the keyword weight database.
    #[must_use]
    pub fn weights_db_path(&self) -> PathBuf {
        self.data_dir.join("weights.db")
    }

    /// Path of the task database.
    #[must_use]
    pub fn tasks_db_path(&self) -> PathBuf {
        self.data_dir.join("tasks.db")
    }
}
