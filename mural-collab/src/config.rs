//! Remote store configuration.
//!
//! The store URL and access credential come from the environment at startup
//! and are required: missing or empty values are logged at error level and
//! rejected, never silently ignored.

/// Environment variable naming the document/object store base URL.
pub const ENV_STORE_URL: &str = "MURAL_STORE_URL";

/// Environment variable holding the store access credential.
pub const ENV_STORE_KEY: &str = "MURAL_STORE_KEY";

/// Cache lifetime advertised for uploaded attachments (30 days).
pub const FILE_CACHE_MAX_AGE_SECS: u64 = 2_592_000;

const DEFAULT_SCENE_TABLE: &str = "scenes";
const DEFAULT_ASSET_BUCKET: &str = "scene-assets";

/// Configuration errors. Fatal at init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Store URL unset or empty
    MissingUrl,
    /// Store credential unset or empty
    MissingKey,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingUrl => write!(f, "{ENV_STORE_URL} is unset or empty"),
            ConfigError::MissingKey => write!(f, "{ENV_STORE_KEY} is unset or empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Remote store endpoints and credential.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the remote store
    pub base_url: String,
    /// Access credential sent with every request
    pub api_key: String,
    /// Row table holding one scene document per room
    pub scene_table: String,
    /// Bucket holding binary attachments
    pub asset_bucket: String,
    /// `max-age` advertised on uploaded attachments, in seconds
    pub cache_max_age_secs: u64,
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            scene_table: DEFAULT_SCENE_TABLE.to_owned(),
            asset_bucket: DEFAULT_ASSET_BUCKET.to_owned(),
            cache_max_age_secs: FILE_CACHE_MAX_AGE_SECS,
        }
    }

    /// Read the store URL and credential from the environment.
    ///
    /// Missing values are loudly reported — a collaboration build without a
    /// reachable store is a deployment mistake, not a mode.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(ENV_STORE_URL).unwrap_or_default();
        let api_key = std::env::var(ENV_STORE_KEY).unwrap_or_default();

        if base_url.is_empty() {
            log::error!("{ENV_STORE_URL} is unset or empty; remote persistence is unavailable");
            return Err(ConfigError::MissingUrl);
        }
        if api_key.is_empty() {
            log::error!("{ENV_STORE_KEY} is unset or empty; remote persistence is unavailable");
            return Err(ConfigError::MissingKey);
        }

        Ok(Self::new(base_url, api_key))
    }

    pub fn with_scene_table(mut self, table: impl Into<String>) -> Self {
        self.scene_table = table.into();
        self
    }

    pub fn with_asset_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.asset_bucket = bucket.into();
        self
    }
}
