use std::env;
use std::time::Duration;

/// Environment-bound configuration (spec.md §6 "Settings", SPEC_FULL.md §4.14).
#[derive(Debug, Clone)]
pub struct Settings {
    pub write_database_url: String,
    pub write_database_token: Option<String>,
    pub read_database_url: String,
    pub read_database_token: Option<String>,
    pub event_database_url: String,
    pub event_database_token: Option<String>,

    pub certificate_granularity_hours: f64,
    pub capacity_margin: f64,
    pub certificate_expiry_years: i32,

    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub api_key_expire_days: i64,
    pub api_key_max_expire_days: i64,

    pub cors_allowed_origins: Vec<String>,
    pub log_level: String,

    pub port: u16,
    pub meter_base_url: String,
    pub meter_api_key: String,
}

fn env_var(key: &str) -> Result<String, anyhow::Error> {
    env::var(key).map_err(|_| anyhow::anyhow!("missing required environment variable {key}"))
}

fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Ok(Self {
            write_database_url: env_var("DATABASE_URL_WRITE")?,
            write_database_token: env::var("DATABASE_TOKEN_WRITE").ok(),
            read_database_url: env_var("DATABASE_URL_READ")?,
            read_database_token: env::var("DATABASE_TOKEN_READ").ok(),
            event_database_url: env_var("DATABASE_URL_EVENTS")?,
            event_database_token: env::var("DATABASE_TOKEN_EVENTS").ok(),

            certificate_granularity_hours: env_parse_or("CERTIFICATE_GRANULARITY_HOURS", 1.0),
            capacity_margin: env_parse_or("CAPACITY_MARGIN", 1.1),
            certificate_expiry_years: env_parse_or("CERTIFICATE_EXPIRY_YEARS", 2),

            jwt_secret: env_var_or("JWT_SECRET", "dev-secret-change-me"),
            access_token_expire_minutes: env_parse_or("ACCESS_TOKEN_EXPIRE_MINUTES", 30),
            api_key_expire_days: env_parse_or("API_KEY_EXPIRE_DAYS", 365),
            api_key_max_expire_days: env_parse_or("API_KEY_MAX_EXPIRE_DAYS", 730),

            cors_allowed_origins: env_var_or("CORS_ALLOWED_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            log_level: env_var_or("LOG_LEVEL", "info"),

            port: env_parse_or("PORT", 8080),
            meter_base_url: env_var_or("METER_BASE_URL", "http://localhost:9100"),
            meter_api_key: env_var_or("METER_API_KEY", ""),
        })
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs((self.access_token_expire_minutes.max(0) as u64) * 60)
    }
}
