use crate::storage::{self, StorageManager};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_API_KEY_ENV: &str = "CM_EMBEDDING_API_KEY";
const DEFAULT_INDEX_NAMESPACE: &str = "contacts";
const DEFAULT_INDEX_API_KEY_ENV: &str = "CM_INDEX_API_KEY";
/// Default similarity threshold for semantic search
const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.3;
const DEFAULT_TOP_K: usize = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration for semantic contact lookup
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SemanticSearchConfig {
    /// Enable or disable semantic search
    #[serde(default)]
    pub enabled: bool,

    /// Base url of an OpenAI-compatible embeddings API
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Name of the environment variable holding the embeddings API key
    #[serde(default = "default_embedding_api_key_env")]
    pub embedding_api_key_env: String,

    /// Data plane url of the hosted vector index
    #[serde(default)]
    pub index_url: String,

    #[serde(default = "default_index_namespace")]
    pub index_namespace: String,

    /// Name of the environment variable holding the vector index API key
    #[serde(default = "default_index_api_key_env")]
    pub index_api_key_env: String,

    /// Default similarity threshold [0.0, 1.0]
    #[serde(default = "default_semantic_threshold")]
    pub default_threshold: f32,

    /// Number of neighbours requested from the index
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SemanticSearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_api_key_env: default_embedding_api_key_env(),
            index_url: String::new(),
            index_namespace: default_index_namespace(),
            index_api_key_env: default_index_api_key_env(),
            default_threshold: DEFAULT_SEMANTIC_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_api_key_env() -> String {
    DEFAULT_EMBEDDING_API_KEY_ENV.to_string()
}

fn default_index_namespace() -> String {
    DEFAULT_INDEX_NAMESPACE.to_string()
}

fn default_index_api_key_env() -> String {
    DEFAULT_INDEX_API_KEY_ENV.to_string()
}

fn default_semantic_threshold() -> f32 {
    DEFAULT_SEMANTIC_THRESHOLD
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default)]
    pub semantic_search: SemanticSearchConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            semantic_search: SemanticSearchConfig::default(),
            base_path: String::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.listen_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("listen_addr {:?} is not a socket address", self.listen_addr))?;

        let sem = &self.semantic_search;
        if !(0.0..=1.0).contains(&sem.default_threshold) {
            bail!(
                "semantic_search.default_threshold must be between 0.0 and 1.0, got {}",
                sem.default_threshold
            );
        }

        if sem.top_k == 0 {
            bail!("semantic_search.top_k must be greater than 0");
        }

        if sem.request_timeout_secs == 0 {
            bail!("semantic_search.request_timeout_secs must be greater than 0");
        }

        if sem.enabled {
            url::Url::parse(&sem.embedding_url).with_context(|| {
                format!("semantic_search.embedding_url {:?} is invalid", sem.embedding_url)
            })?;

            if sem.index_url.trim().is_empty() {
                bail!("semantic_search.index_url is required when semantic search is enabled");
            }
            url::Url::parse(&sem.index_url).with_context(|| {
                format!("semantic_search.index_url {:?} is invalid", sem.index_url)
            })?;

            if sem.embedding_model.trim().is_empty() {
                bail!("semantic_search.embedding_model cannot be empty");
            }
        }

        Ok(())
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            log::info!("Writing default config to {base_path}/{CONFIG_FILE}");
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).context("config file is not valid utf8")?;
        let mut config: Self = serde_yml::from_str(&config_str).context("config is malformed")?;

        config.base_path = base_path.to_string();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let store = storage::BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }
}
