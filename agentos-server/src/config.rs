use std::str::FromStr;

/// Runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: String,
    /// `NODE_ENV=production` switches 5xx responses to the opaque envelope.
    pub production: bool,
    /// Honor `X-Forwarded-For` for the pre-auth bucket key.
    pub trust_proxy: bool,
    pub enable_metrics: bool,
    pub metrics_token: Option<String>,
    pub admin_bootstrap_token: Option<String>,
    pub write_quota_per_day: i64,
    pub embed_tokens_quota_per_day: i64,
    pub search_quota_per_day: i64,
    pub search_rate_limit_per_minute: u32,
    pub rate_limit_requests_per_minute: u32,
    pub admin_rate_limit_per_minute: u32,
    pub preauth_rate_limit_per_minute: u32,
    pub openai_api_key: Option<String>,
    pub openai_embed_model: String,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    env_string(name).and_then(|value| value.parse().ok()).unwrap_or(default)
}

fn env_flag(name: &str) -> bool {
    env_string(name).is_some_and(|value| value == "true" || value == "1")
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env_string("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?;

        Ok(Self {
            port: env_parse("PORT", 8080),
            database_url,
            production: env_string("NODE_ENV").as_deref() == Some("production"),
            trust_proxy: env_flag("TRUST_PROXY"),
            enable_metrics: env_flag("ENABLE_METRICS"),
            metrics_token: env_string("METRICS_TOKEN"),
            admin_bootstrap_token: env_string("ADMIN_BOOTSTRAP_TOKEN"),
            write_quota_per_day: env_parse("WRITE_QUOTA_PER_DAY", 10_000),
            embed_tokens_quota_per_day: env_parse("EMBED_TOKENS_QUOTA_PER_DAY", 1_000_000),
            search_quota_per_day: env_parse("SEARCH_QUOTA_PER_DAY", 1_000),
            search_rate_limit_per_minute: env_parse("SEARCH_RATE_LIMIT_PER_MINUTE", 60),
            rate_limit_requests_per_minute: env_parse("RATE_LIMIT_REQUESTS_PER_MINUTE", 120),
            admin_rate_limit_per_minute: env_parse("ADMIN_RATE_LIMIT_PER_MINUTE", 10),
            preauth_rate_limit_per_minute: env_parse("PREAUTH_RATE_LIMIT_PER_MINUTE", 240),
            openai_api_key: env_string("OPENAI_API_KEY"),
            openai_embed_model: env_string("OPENAI_EMBED_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
        })
    }

    /// A config for tests: local defaults, no outbound providers.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            port: 0,
            database_url: database_url.into(),
            production: false,
            trust_proxy: true,
            enable_metrics: false,
            metrics_token: None,
            admin_bootstrap_token: None,
            write_quota_per_day: 10_000,
            embed_tokens_quota_per_day: 1_000_000,
            search_quota_per_day: 1_000,
            search_rate_limit_per_minute: 60,
            rate_limit_requests_per_minute: 120,
            admin_rate_limit_per_minute: 10,
            preauth_rate_limit_per_minute: 240,
            openai_api_key: None,
            openai_embed_model: "text-embedding-3-small".to_string(),
        }
    }
}
