use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

/// Log line format; JSON by default in production only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn resolve(raw: Option<&str>, env: &Environment) -> Self {
        match raw.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("json") => Self::Json,
            Some("pretty") | Some("text") => Self::Pretty,
            _ if matches!(env, Environment::Prod) => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub log_format: LogFormat,
    pub server_addr: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Hosted model
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    pub ai_timeout_seconds: u64,

    // Document storage
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,

    // Analysis / chat
    pub analysis_delay_ms: u64,
    pub chat_context_max_deals: usize,
    pub chat_context_max_chars: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let log_format = LogFormat::resolve(env::var("LOG_FORMAT").ok().as_deref(), &env);
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database: an explicit DSN wins, otherwise compose one from the DB_* parts
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
            let password = env::var("DB_PASSWORD").unwrap_or_default();
            let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
            let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
            let name = env::var("DB_NAME").unwrap_or_else(|_| "underwriter_dev".to_string());
            compose_database_url(&user, &password, &host, &port, &name)
        });
        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Hosted model
        let anthropic_api_key =
            env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY must be set")?;
        let anthropic_base_url = env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com".to_string());
        let anthropic_model = env::var("ANTHROPIC_MODEL")
            .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string());
        let ai_timeout_seconds = parse_or("AI_TIMEOUT_SECONDS", 120); // LLM calls are slow

        // Document storage
        let upload_dir = PathBuf::from(env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()));
        let max_upload_bytes = parse_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024);

        // Analysis / chat
        let analysis_delay_ms = parse_or("ANALYSIS_DELAY_MS", 0);
        let chat_context_max_deals = parse_or("CHAT_CONTEXT_MAX_DEALS", 10);
        let chat_context_max_chars = parse_or("CHAT_CONTEXT_MAX_CHARS", 60_000);

        Ok(Settings {
            env,
            log_format,
            server_addr,
            database_url,
            database_max_connections,
            cors_allow_origins,
            anthropic_api_key,
            anthropic_base_url,
            anthropic_model,
            ai_timeout_seconds,
            upload_dir,
            max_upload_bytes,
            analysis_delay_ms,
            chat_context_max_deals,
            chat_context_max_chars,
        })
    }

    /// Settings suitable for in-process tests; nothing here is dialled.
    #[cfg(test)]
    pub fn for_tests(anthropic_base_url: &str, upload_dir: PathBuf) -> Self {
        Self {
            env: Environment::Dev,
            log_format: LogFormat::Pretty,
            server_addr: "127.0.0.1:0".to_string(),
            database_url: "postgres://localhost/underwriter_test".to_string(),
            database_max_connections: 1,
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            anthropic_api_key: "test-key".to_string(),
            anthropic_base_url: anthropic_base_url.to_string(),
            anthropic_model: "claude-test".to_string(),
            ai_timeout_seconds: 5,
            upload_dir,
            max_upload_bytes: 1024 * 1024,
            analysis_delay_ms: 0,
            chat_context_max_deals: 10,
            chat_context_max_chars: 60_000,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn compose_database_url(user: &str, password: &str, host: &str, port: &str, name: &str) -> String {
    if password.is_empty() {
        format!("postgres://{}@{}:{}/{}", user, host, port, name)
    } else {
        format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, name)
    }
}
