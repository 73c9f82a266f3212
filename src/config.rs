//! Process-wide service configuration.
//!
//! Read once at startup from the environment (after `dotenvy` has loaded any
//! `.env` file). Secrets are optional here: a missing key only fails the
//! requests that need it, with a `configuration_error`.
//!
//! | Variable | Purpose | Default |
//! |----------|---------|---------|
//! | `DATABASE_URL` | Application store (sessions, journal, secrets) | required for `serve` |
//! | `CONNECTION_ENCRYPTION_KEY` | 64-hex-char AES-256-GCM key for stored connection strings | - |
//! | `SUPABASE_JWT_SECRET` | HS256 secret for access tokens (unset = dev mode, unverified) | - |
//! | `ANTHROPIC_API_KEY` / `OPENAI_API_KEY` | Model backend keys | - |
//! | `ANTHROPIC_BASE_URL` / `OPENAI_BASE_URL` | Backend endpoints | vendor defaults |
//! | `MANAGED_DB_API_URL` / `MANAGED_DB_API_KEY` | Managed database provider API | - |
//! | `AGENT_DEFAULT_MODEL` | Model used when a request names none | `claude-sonnet-4-5` |
//! | `FALLBACK_DATABASE_NAME` | Database used when a connection string omits one | `postgres` |
//! | `AGENT_MAX_OUTPUT_TOKENS` | Completion budget per iteration | `8192` |

use std::fmt;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_FALLBACK_DATABASE: &str = "postgres";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Clone, Default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub encryption_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub managed_db_api_url: Option<String>,
    pub managed_db_api_key: Option<String>,
    pub default_model: String,
    pub fallback_database: String,
    pub max_output_tokens: u32,
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            database_url: non_empty("DATABASE_URL"),
            encryption_key: non_empty("CONNECTION_ENCRYPTION_KEY"),
            jwt_secret: non_empty("SUPABASE_JWT_SECRET"),
            anthropic_api_key: non_empty("ANTHROPIC_API_KEY"),
            anthropic_base_url: non_empty("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            managed_db_api_url: non_empty("MANAGED_DB_API_URL"),
            managed_db_api_key: non_empty("MANAGED_DB_API_KEY"),
            default_model: non_empty("AGENT_DEFAULT_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            fallback_database: non_empty("FALLBACK_DATABASE_NAME")
                .unwrap_or_else(|| DEFAULT_FALLBACK_DATABASE.to_string()),
            max_output_tokens: non_empty("AGENT_MAX_OUTPUT_TOKENS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8192),
        }
    }

    /// Defaults with no secrets; used by tests and offline subcommands.
    pub fn offline() -> Self {
        AppConfig {
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            fallback_database: DEFAULT_FALLBACK_DATABASE.to_string(),
            max_output_tokens: 8192,
            ..Default::default()
        }
    }
}

fn flag(v: &Option<String>) -> &'static str {
    if v.is_some() {
        "set"
    } else {
        "unset"
    }
}

// Secrets never reach logs; only whether they are present.
impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &flag(&self.database_url))
            .field("encryption_key", &flag(&self.encryption_key))
            .field("jwt_secret", &flag(&self.jwt_secret))
            .field("anthropic_api_key", &flag(&self.anthropic_api_key))
            .field("anthropic_base_url", &self.anthropic_base_url)
            .field("openai_api_key", &flag(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("managed_db_api_url", &self.managed_db_api_url)
            .field("managed_db_api_key", &flag(&self.managed_db_api_key))
            .field("default_model", &self.default_model)
            .field("fallback_database", &self.fallback_database)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}
