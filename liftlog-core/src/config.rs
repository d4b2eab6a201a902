use anyhow::{Result, anyhow};
use std::time::Duration;

use crate::auth::Role;

pub const DEFAULT_DATABASE_URL: &str = "liftlog.db";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2:3b";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost";
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_SEED_EXERCISES: &str = "Bench Press,Deadlift,Squat";
/// Match bound used with the local embedder unless one is configured.
pub const DEFAULT_LOCAL_MATCH_DISTANCE: f64 = 0.6;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    OpenAi { api_key: String },
    Ollama { host: String, port: u16 },
}

impl LlmProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi { .. } => DEFAULT_OPENAI_MODEL,
            LlmProvider::Ollama { .. } => DEFAULT_OLLAMA_MODEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingProvider {
    OpenAi { api_key: String, model: String },
    /// Hashed character trigrams; needs no network access.
    Local,
}

impl EmbeddingProvider {
    /// The bound to use when none is configured. Remote embeddings are
    /// left unbounded.
    pub fn default_match_distance(&self) -> Option<f64> {
        match self {
            EmbeddingProvider::OpenAi { .. } => None,
            EmbeddingProvider::Local => Some(DEFAULT_LOCAL_MATCH_DISTANCE),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: String,
    pub llm: LlmProvider,
    pub model: String,
    pub embeddings: EmbeddingProvider,
    /// Best matches further away than this are treated as "not found".
    pub match_max_distance: Option<f64>,
    pub request_timeout: Duration,
    pub default_role: Role,
    /// Exercises given to every newly created profile.
    pub seed_exercises: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            llm: LlmProvider::Ollama {
                host: DEFAULT_OLLAMA_HOST.to_string(),
                port: DEFAULT_OLLAMA_PORT,
            },
            model: DEFAULT_OLLAMA_MODEL.to_string(),
            embeddings: EmbeddingProvider::Local,
            match_max_distance: Some(DEFAULT_LOCAL_MATCH_DISTANCE),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_role: Role::User,
            seed_exercises: split_list(DEFAULT_SEED_EXERCISES),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from a key lookup, so it can be driven by
    /// something other than the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").or_else(|| get("OPENAI_KEY"));

        let ollama = || -> Result<LlmProvider> {
            let host = get("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
            if !(host.starts_with("http://") || host.starts_with("https://")) {
                return Err(anyhow!("OLLAMA_HOST must start with http:// or https://: {}", host));
            }
            let port = match get("OLLAMA_PORT") {
                Some(v) => v
                    .trim()
                    .parse::<u16>()
                    .map_err(|e| anyhow!("Invalid OLLAMA_PORT {:?}: {}", v, e))?,
                None => DEFAULT_OLLAMA_PORT,
            };
            Ok(LlmProvider::Ollama { host, port })
        };

        let llm = match get("LIFTLOG_LLM_BACKEND").as_deref().map(str::to_lowercase) {
            Some(b) if b == "ollama" => ollama()?,
            Some(b) if b == "openai" => LlmProvider::OpenAi {
                api_key: api_key
                    .clone()
                    .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set for the openai backend"))?,
            },
            Some(other) => return Err(anyhow!("Unknown LIFTLOG_LLM_BACKEND: {}", other)),
            None => match &api_key {
                Some(key) => LlmProvider::OpenAi {
                    api_key: key.clone(),
                },
                None => ollama()?,
            },
        };

        let embedding_model =
            get("LIFTLOG_EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
        let embeddings = match get("LIFTLOG_EMBEDDING_BACKEND").as_deref().map(str::to_lowercase) {
            Some(b) if b == "local" => EmbeddingProvider::Local,
            Some(b) if b == "openai" => EmbeddingProvider::OpenAi {
                api_key: api_key.clone().ok_or_else(|| {
                    anyhow!("OPENAI_API_KEY must be set for openai embeddings")
                })?,
                model: embedding_model,
            },
            Some(other) => return Err(anyhow!("Unknown LIFTLOG_EMBEDDING_BACKEND: {}", other)),
            None => match &api_key {
                Some(key) => EmbeddingProvider::OpenAi {
                    api_key: key.clone(),
                    model: embedding_model,
                },
                None => EmbeddingProvider::Local,
            },
        };

        let match_max_distance = get("LIFTLOG_MATCH_MAX_DISTANCE")
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| anyhow!("Invalid LIFTLOG_MATCH_MAX_DISTANCE {:?}: {}", v, e))
            })
            .transpose()?
            .or_else(|| embeddings.default_match_distance());

        let request_timeout = match get("LIFTLOG_REQUEST_TIMEOUT_SECS") {
            Some(v) => {
                let secs = v.trim().parse::<u64>().map_err(|e| {
                    anyhow!("Invalid LIFTLOG_REQUEST_TIMEOUT_SECS {:?}: {}", v, e)
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let default_role = match get("LIFTLOG_DEFAULT_ROLE") {
            Some(v) => v
                .parse::<Role>()
                .map_err(|_| anyhow!("Invalid LIFTLOG_DEFAULT_ROLE: {}", v))?,
            None => Role::User,
        };

        let model = get("LIFTLOG_MODEL").unwrap_or_else(|| llm.default_model().to_string());

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            llm,
            model,
            embeddings,
            match_max_distance,
            request_timeout,
            default_role,
            seed_exercises: split_list(
                &lookup("LIFTLOG_SEED_EXERCISES").unwrap_or_else(|| DEFAULT_SEED_EXERCISES.to_string()),
            ),
        })
    }
}
