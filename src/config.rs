use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use anyhow::Result;

const APP_DIR: &str = "noterag";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub enum LlmProvider {
    LmStudio,
    OpenRouter,
    #[default]
    OpenAi,
}

impl LlmProvider {
    pub fn base_url(&self) -> &'static str {
        match self {
            LlmProvider::LmStudio => "http://localhost:1234/v1",
            LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
            LlmProvider::OpenAi => "https://api.openai.com/v1",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "lmstudio" | "lm-studio" => Some(LlmProvider::LmStudio),
            "openrouter" => Some(LlmProvider::OpenRouter),
            "openai" => Some(LlmProvider::OpenAi),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Overrides the provider's default endpoint.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub embedding_model: String,
    /// Separate endpoint for embeddings; falls back to the chat endpoint.
    pub embedding_base_url: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub embedding_timeout_secs: u64,
    /// Language the model is asked to answer in.
    pub answer_language: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_base_url: None,
            temperature: 0.7,
            timeout_secs: 120,
            embedding_timeout_secs: 60,
            answer_language: "Korean".to_string(),
        }
    }
}

impl LlmConfig {
    pub fn chat_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.base_url().to_string())
    }

    pub fn embeddings_base_url(&self) -> String {
        self.embedding_base_url
            .clone()
            .unwrap_or_else(|| self.chat_base_url())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ExtractionConfig {
    pub download_timeout_secs: u64,
    pub ocr_enabled: bool,
    /// Pages whose native text is shorter than this are sent to OCR.
    pub ocr_threshold: usize,
    pub ocr_languages: Vec<String>,
    pub ocr_dpi: u32,
    /// Bound on one pdftoppm pass over the flagged pages.
    pub rasterize_timeout_secs: u64,
    pub ocr_timeout_secs: u64,
    pub ocr_concurrency: usize,
    /// Minimum aggregate characters before a document counts as readable.
    pub min_text_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            download_timeout_secs: 30,
            ocr_enabled: true,
            ocr_threshold: 50,
            ocr_languages: vec!["kor".to_string(), "eng".to_string()],
            ocr_dpi: 200,
            rasterize_timeout_secs: 120,
            ocr_timeout_secs: 60,
            ocr_concurrency: 4,
            min_text_chars: 10,
        }
    }
}

impl ExtractionConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn rasterize_timeout(&self) -> Duration {
        Duration::from_secs(self.rasterize_timeout_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_secs(self.ocr_timeout_secs)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5, snippet_chars: 1500 }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SummaryConfig {
    /// Texts up to this many characters are summarized in a single call.
    pub direct_threshold: usize,
    pub chunk_chars: usize,
    pub chunk_concurrency: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            direct_threshold: 60_000,
            chunk_chars: 20_000,
            chunk_concurrency: 4,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 256, ttl_secs: Some(3600) }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8000".to_string() }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub extraction: ExtractionConfig,
    pub retrieval: RetrievalConfig,
    pub summary: SummaryConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub database_url: Option<String>,
}

impl Config {
    /// Get the application data directory
    pub fn get_app_data_dir() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);

        if !path.exists() {
            let _ = std::fs::create_dir_all(&path);
        }
        path
    }

    fn config_path() -> PathBuf {
        Self::get_app_data_dir().join("config.json")
    }

    /// Config file (if any) with environment overrides applied on top.
    pub fn load() -> Config {
        let path = Self::config_path();
        let mut config = if path.exists() {
            match std::fs::read_to_string(&path).map(|c| serde_json::from_str::<Config>(&c)) {
                Ok(Ok(config)) => config,
                Ok(Err(e)) => {
                    tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                    Config::default()
                }
                Err(e) => {
                    tracing::warn!("Failed to read config {:?}: {}", path, e);
                    Config::default()
                }
            }
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::config_path(), contents)?;
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let placeholder = "your_openai_api_key_here";
        if let Some(key) = var("OPENAI_API_KEY").filter(|k| !k.is_empty() && k != placeholder) {
            self.llm.api_key = Some(key);
        }
        if let Some(provider) = var("LLM_PROVIDER").and_then(|p| LlmProvider::parse(&p)) {
            self.llm.provider = provider;
        }
        if let Some(url) = var("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }
        if let Some(url) = var("EMBEDDING_BASE_URL") {
            self.llm.embedding_base_url = Some(url);
        }
        if let Some(url) = var("DATABASE_URL") {
            // asyncpg-style query strings are not understood by every driver
            self.database_url = Some(url.split('?').next().unwrap_or_default().to_string());
        }
        if let Some(bind) = var("BIND_ADDR") {
            self.server.bind = bind;
        }
        if let Some(enabled) = var("OCR_ENABLED") {
            self.extraction.ocr_enabled =
                matches!(enabled.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(langs) = var("OCR_LANGUAGES") {
            let langs: Vec<String> = langs
                .split(['+', ','])
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            if !langs.is_empty() {
                self.extraction.ocr_languages = langs;
            }
        }
    }
}
