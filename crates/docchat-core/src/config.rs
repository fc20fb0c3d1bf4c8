//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_RETRIEVAL__TOP_K=8`). Every
//! setting has a default so an empty environment still yields a usable
//! `Settings`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::types::ChunkStrategy;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment.extract().map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let s = self.settings()?;
        if s.context.token_budget == 0 {
            return Err(crate::Error::InvalidConfig("context.token_budget must be > 0".into()).into());
        }
        if s.retrieval.top_k == 0 {
            return Err(crate::Error::InvalidConfig("retrieval.top_k must be > 0".into()).into());
        }
        if s.retrieval.semantic_threshold <= s.retrieval.relaxed_threshold {
            return Err(crate::Error::InvalidConfig("retrieval.semantic_threshold must be above retrieval.relaxed_threshold".into()).into());
        }
        if s.embedding.dim == 0 {
            return Err(crate::Error::InvalidConfig("embedding.dim must be > 0".into()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub multimodal: MultimodalSettings,
    pub context: ContextSettings,
    pub generation: GenerationSettings,
    pub embedding: EmbeddingSettings,
    pub vector: VectorSettings,
    pub store: StoreSettings,
}

/// Window parameters: `max_size` in characters, `overlap` in words.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub max_size: usize,
    pub overlap: usize,
}

impl WindowConfig {
    pub const fn new(max_size: usize, overlap: usize) -> Self { Self { max_size, overlap } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub default_strategy: ChunkStrategy,
    pub sentence: WindowConfig,
    pub paragraph: WindowConfig,
    pub semantic_max_size: usize,
    pub topic_terms: usize,
    pub hybrid_sentence: WindowConfig,
    pub hybrid_paragraph: WindowConfig,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            default_strategy: ChunkStrategy::Hybrid,
            sentence: WindowConfig::new(1000, 10),
            paragraph: WindowConfig::new(2000, 20),
            semantic_max_size: 1500,
            topic_terms: 3,
            hybrid_sentence: WindowConfig::new(500, 5),
            hybrid_paragraph: WindowConfig::new(1500, 15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub collection: String,
    pub top_k: usize,
    pub semantic_weight: f32,
    pub advanced_weight: f32,
    pub keyword_weight: f32,
    pub min_relevance: f32,
    /// Score floor for the semantic source; must exceed `relaxed_threshold`.
    pub semantic_threshold: f32,
    pub advanced_threshold: f32,
    pub relaxed_threshold: f32,
    pub neutral_score: f32,
    pub raw_window_chars: usize,
    pub rerank: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            collection: "document_chunks".to_string(),
            top_k: 5,
            semantic_weight: 0.6,
            advanced_weight: 0.7,
            keyword_weight: 0.3,
            min_relevance: 0.1,
            semantic_threshold: 0.05,
            advanced_threshold: 0.01,
            relaxed_threshold: 0.0,
            neutral_score: 0.5,
            raw_window_chars: 1000,
            rerank: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultimodalSettings {
    pub text_weight: f32,
    pub image_weight: f32,
    pub audio_weight: f32,
    pub preferred_boost: f32,
    pub temporal_boost: f32,
    pub primary_boost: f32,
    pub dedup_prefix_chars: usize,
}

impl Default for MultimodalSettings {
    fn default() -> Self {
        Self {
            text_weight: 1.0,
            image_weight: 0.9,
            audio_weight: 0.8,
            preferred_boost: 1.2,
            temporal_boost: 1.1,
            primary_boost: 1.15,
            dedup_prefix_chars: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Maximum estimated tokens (chars / 4) of injected context.
    pub token_budget: usize,
}

impl Default for ContextSettings {
    fn default() -> Self { Self { token_budget: 3000 } }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub engine_id: String,
    pub endpoint: String,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub expand_queries: bool,
    pub history_turns: usize,
    pub primary: BackendSettings,
    pub secondary: BackendSettings,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            temperature: Some(0.2),
            max_tokens: Some(1024),
            expand_queries: true,
            history_turns: 6,
            primary: BackendSettings { engine_id: "primary".into(), endpoint: "http://127.0.0.1:8080/v1/generate".into(), ..BackendSettings::default() },
            secondary: BackendSettings { engine_id: "secondary".into(), endpoint: "http://127.0.0.1:8081/v1/generate".into(), ..BackendSettings::default() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `hash` (deterministic, offline) or `http`.
    pub provider: String,
    pub dim: usize,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "hash".into(),
            dim: 384,
            endpoint: "http://127.0.0.1:8090/v1/embeddings".into(),
            model: "text-embedding".into(),
            api_key_env: None,
            batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    /// `lance` or `memory`.
    pub backend: String,
    pub path: String,
}

impl Default for VectorSettings {
    fn default() -> Self { Self { backend: "lance".into(), path: "data/vectors".into() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: String,
}

impl Default for StoreSettings {
    fn default() -> Self { Self { path: "data/store".into() } }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
