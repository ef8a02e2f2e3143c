use config::{builder::DefaultState, Config as ConfigLoader, ConfigBuilder, ConfigError, File};
use kaogong_llm::{ProviderConfig, ProviderType};
use kaogong_types::UsageLimits;
use serde::Deserialize;
use std::path::Path;

/// Sections that may be overridden from the environment, e.g.
/// `LLM_MODEL` sets `llm.model` and `USAGE_FREE_CHAT_DAILY` sets
/// `usage.free_chat_daily`.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("SERVER_", "server"),
    ("MONGODB_", "mongodb"),
    ("LLM_", "llm"),
    ("LOG_", "logging"),
    ("AUTH_", "auth"),
    ("USAGE_", "usage"),
    ("PAYMENT_", "payment"),
];

/// Environment variables that are secrets, never config keys
const SECRET_VARS: &[&str] = &["MONGODB_URI", "LLM_API_KEY", "JWT_SECRET", "PAYMENT_KEY"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub mongodb: MongoDbConfig,
    pub llm: LlmConfig,
    pub auth: AuthConfig,
    pub usage: UsageConfig,
    pub payment: PaymentConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub mongodb_uri: String,
    #[serde(default)]
    pub llm_api_key: String,
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default)]
    pub payment_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoDbConfig {
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderType,
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Prior messages of a session sent along with a new question
    pub history_limit: usize,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub token_ttl_hours: i64,
    pub code_ttl_secs: i64,
    pub code_cooldown_secs: i64,
    pub code_max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsageConfig {
    pub free_chat_daily: u32,
    pub free_quiz_daily: u32,
}

impl From<&UsageConfig> for UsageLimits {
    fn from(config: &UsageConfig) -> Self {
        Self {
            chat_daily: config.free_chat_daily,
            quiz_daily: config.free_quiz_daily,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub gateway_url: String,
    pub pid: String,
    pub notify_url: String,
    pub return_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. Environment variables (with SERVER_, MONGODB_, LLM_, etc. prefixes)
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            // 1. Load default config
            .add_source(File::with_name("config/default").required(false))
            // 2. Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false));
        // 3. Environment variables override everything
        let builder = apply_env_overrides(builder, std::env::vars())?;

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        // Load secrets from ENV (not in TOML)
        cfg.mongodb_uri = required_env("MONGODB_URI")?;
        cfg.llm_api_key = required_env("LLM_API_KEY")?;
        cfg.jwt_secret = required_env("JWT_SECRET")?;
        cfg.payment_key = required_env("PAYMENT_KEY")?;

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let builder = ConfigLoader::builder().add_source(File::from(path.as_ref()));

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn usage_limits(&self) -> UsageLimits {
        (&self.usage).into()
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.llm.provider,
            api_key: self.llm_api_key.clone(),
            base_url: self.llm.base_url.clone(),
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .map_err(|_| ConfigError::Message(format!("{} environment variable is required", name)))
}

/// Map `SECTION_KEY_NAME=value` to the `section.key_name` override
fn apply_env_overrides(
    mut builder: ConfigBuilder<DefaultState>,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    for (name, value) in vars {
        if SECRET_VARS.contains(&name.as_str()) {
            continue;
        }
        let Some((prefix, section)) = ENV_SECTIONS.iter().find(|(p, _)| name.starts_with(p)) else {
            continue;
        };
        let key = name[prefix.len()..].to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        builder = builder.set_override(format!("{}.{}", section, key), value)?;
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 3000

        [cors]
        enabled = true
        origins = ["http://localhost:3000"]

        [mongodb]
        database = "test"

        [llm]
        provider = "gemini"
        model = "gemini-1.5-flash"
        temperature = 0.5
        max_output_tokens = 1024
        history_limit = 10
        system_prompt = "你是辅导老师"

        [auth]
        token_ttl_hours = 24
        code_ttl_secs = 300
        code_cooldown_secs = 60
        code_max_attempts = 5

        [usage]
        free_chat_daily = 20
        free_quiz_daily = 5

        [payment]
        gateway_url = "https://pay.example.com/submit.php"
        pid = "1001"
        notify_url = "http://localhost/payment/notify"
        return_url = "http://localhost/"

        [logging]
        level = "debug"
        format = "json"
    "#;

    #[test]
    fn test_config_structure() {
        let config: Config = toml::from_str(TOML).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.mongodb.database, "test");
        assert_eq!(config.llm.provider, ProviderType::Gemini);
        assert!(config.llm.base_url.is_none());
        assert_eq!(config.usage_limits().quiz_daily, 5);
    }

    #[test]
    fn test_env_overrides_nest_under_section() {
        let builder = ConfigLoader::builder()
            .add_source(File::from_str(TOML, config::FileFormat::Toml));
        let vars = vec![
            ("LLM_MODEL".to_string(), "gpt-4o".to_string()),
            ("USAGE_FREE_CHAT_DAILY".to_string(), "3".to_string()),
            ("SERVER_PORT".to_string(), "9000".to_string()),
            ("LLM_API_KEY".to_string(), "secret".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let config: Config = apply_env_overrides(builder, vars)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.usage.free_chat_daily, 3);
        assert_eq!(config.server.port, 9000);
        assert!(config.llm_api_key.is_empty());
    }
}
