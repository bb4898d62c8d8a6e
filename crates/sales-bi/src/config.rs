use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::router::RouterConfig;

pub const CONFIG_ENV: &str = "SALES_BI_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiConfig {
    /// CSV or Excel file holding the sales rows.
    pub data_path: PathBuf,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub pinecone: PineconeConfig,
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model_dir: PathBuf,
    pub dimension: usize,
    pub cache_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Cosine index built in-process at startup.
    Memory,
    /// Remote Pinecone serverless index.
    Pinecone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Records retrieved per query, for both the generator context and the fallback.
    pub top_k: usize,
    pub backend: IndexBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Read from `OPENAI_API_KEY`; never written back to disk.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PineconeConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub index_name: String,
    pub cloud: String,
    pub region: String,
    pub batch_size: usize,
    /// Rows pushed to the remote index; `None` upserts the whole store.
    pub sample_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Keep a deterministic sample of this many rows; `None` loads everything.
    pub sample_size: Option<usize>,
}

impl BiConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.embedding.cache_size == 0 {
            return Err("embedding.cache_size must be > 0".into());
        }
        if self.search.top_k == 0 {
            return Err("search.top_k must be > 0".into());
        }
        if self.pinecone.batch_size == 0 {
            return Err("pinecone.batch_size must be > 0".into());
        }
        if self.loader.sample_size == Some(0) {
            return Err("loader.sample_size must be > 0 when set".into());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err("llm.temperature must be in [0.0, 2.0]".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the startup configuration: `$SALES_BI_CONFIG`, then
    /// `<config_dir>/sales-bi/config.json`, then defaults; environment
    /// variables override whichever was found.
    pub fn load() -> Result<Self, String> {
        let explicit = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let user_file = dirs::config_dir().map(|d| d.join("sales-bi").join("config.json"));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => match user_file.filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.llm.model = model;
        }
        if let Some(endpoint) = get("OPENAI_BASE_URL") {
            self.llm.endpoint = format!("{}/chat/completions", endpoint.trim_end_matches('/'));
        }
        if let Some(key) = get("PINECONE_API_KEY") {
            self.pinecone.api_key = Some(key);
        }
        if let Some(cloud) = get("PINECONE_CLOUD") {
            self.pinecone.cloud = cloud;
        }
        if let Some(region) = get("PINECONE_REGION") {
            self.pinecone.region = region;
        }
        if let Some(path) = get("SALES_DATA") {
            self.data_path = PathBuf::from(path);
        }
        if let Some(path) = get("MODEL_PATH") {
            self.embedding.model_dir = PathBuf::from(path);
        }
        if let Some(backend) = get("SALES_BI_INDEX") {
            match backend.to_ascii_lowercase().as_str() {
                "memory" => self.search.backend = IndexBackend::Memory,
                "pinecone" => self.search.backend = IndexBackend::Pinecone,
                other => tracing::warn!(
                    backend = other,
                    "Unknown SALES_BI_INDEX value, keeping {:?}",
                    self.search.backend
                ),
            }
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            top_k: self.search.top_k,
        }
    }
}

impl Default for BiConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data").join("sales.csv"),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            llm: LlmConfig::default(),
            pinecone: PineconeConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let model_dir = if Path::new("models").exists() {
            PathBuf::from("models")
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sales-bi")
                .join("models")
        };

        Self {
            model_dir,
            dimension: 384,
            cache_size: 1000,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            backend: IndexBackend::Memory,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            api_key: None,
        }
    }
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            index_name: "sales-index-st".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            batch_size: 100,
            sample_size: Some(10_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = BiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search.top_k, 5);
        assert_eq!(config.search.backend, IndexBackend::Memory);
        assert_eq!(config.llm.temperature, 0.0);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_top_k() {
        let mut config = BiConfig::default();
        config.search.top_k = 0;
        assert!(config.validate().unwrap_err().contains("top_k"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_and_sample() {
        let mut config = BiConfig::default();
        config.pinecone.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = BiConfig::default();
        config.loader.sample_size = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"search": {"top_k": 3}, "data_path": "x.csv"}"#).unwrap();

        let config = BiConfig::from_file(&path).unwrap();
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.search.backend, IndexBackend::Memory);
        assert_eq!(config.data_path, PathBuf::from("x.csv"));
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"search": {"top_k": 0}}"#).unwrap();
        assert!(BiConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
            ("PINECONE_REGION", "us-west1"),
            ("SALES_DATA", "data/other.xlsx"),
            ("SALES_BI_INDEX", "Pinecone"),
            ("OPENAI_MODEL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = BiConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.endpoint, "http://localhost:8080/v1/chat/completions");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.pinecone.region, "us-west1");
        assert_eq!(config.data_path, PathBuf::from("data/other.xlsx"));
        assert_eq!(config.search.backend, IndexBackend::Pinecone);
    }

    #[test]
    fn test_api_keys_are_not_serialized() {
        let mut config = BiConfig::default();
        config.llm.api_key = Some("secret".into());
        config.pinecone.api_key = Some("secret".into());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_router_config_uses_top_k() {
        let mut config = BiConfig::default();
        config.search.top_k = 7;
        assert_eq!(config.router_config().top_k, 7);
    }
}
