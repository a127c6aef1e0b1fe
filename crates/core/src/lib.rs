pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod query;
pub mod storage;

pub use error::{Error, Result};

pub mod config {
    use crate::error::{Error, Result};
    use std::time::Duration;

    /// Fixed bound for every store unit of work.
    pub const STORE_TIMEOUT: Duration = Duration::from_secs(5);

    const DEFAULT_FEED_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_OPENAI_TIMEOUT_SECS: u64 = 60;
    const DEFAULT_HOST: &str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 3000;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub run_migrations: bool,
        pub stocks_url: Option<String>,
        pub api_token: Option<String>,
        pub feed_timeout: Duration,
        pub openai: OpenAiSettings,
        pub host: String,
        pub port: u16,
        pub sentry_dsn: Option<String>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct OpenAiSettings {
        pub base_url: Option<String>,
        pub engine: Option<String>,
        pub api_version: Option<String>,
        pub api_key: Option<String>,
        pub model: Option<String>,
        pub timeout: Duration,
    }

    impl Settings {
        pub fn from_env() -> Result<Self> {
            Self::from_lookup(|key| std::env::var(key).ok())
        }

        /// Builds settings from an arbitrary key lookup. Empty values count as unset.
        pub fn from_lookup<F>(lookup: F) -> Result<Self>
        where
            F: Fn(&str) -> Option<String>,
        {
            let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

            let database_url = get("DATABASE_URL").or_else(|| compose_database_url(&get));

            let feed_timeout = parse_secs(get("FEED_TIMEOUT_SECS"), "FEED_TIMEOUT_SECS")?
                .unwrap_or(Duration::from_secs(DEFAULT_FEED_TIMEOUT_SECS));
            let openai_timeout = parse_secs(get("OPENAI_TIMEOUT_SECS"), "OPENAI_TIMEOUT_SECS")?
                .unwrap_or(Duration::from_secs(DEFAULT_OPENAI_TIMEOUT_SECS));

            let port = match get("PORT") {
                Some(v) => v.trim().parse::<u16>().map_err(|_| Error::Config {
                    message: format!("PORT must be a port number (got {v:?})"),
                })?,
                None => DEFAULT_PORT,
            };

            Ok(Self {
                database_url,
                run_migrations: get("DB_RUN_MIGRATIONS").is_some_and(|v| is_truthy(&v)),
                stocks_url: get("STOCKS_URL"),
                api_token: get("API_TOKEN"),
                feed_timeout,
                openai: OpenAiSettings {
                    base_url: get("OPENAI_API_BASE"),
                    engine: get("OPENAI_API_ENGINE"),
                    api_version: get("OPENAI_API_VERSION"),
                    api_key: get("OPENAI_API_KEY"),
                    model: get("OPENAI_API_MODEL"),
                    timeout: openai_timeout,
                },
                host: get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port,
                sentry_dsn: get("SENTRY_DSN"),
            })
        }

        pub fn require_database_url(&self) -> Result<&str> {
            require(self.database_url.as_deref(), "DATABASE_URL (or DB_* variables)")
        }

        pub fn require_stocks_url(&self) -> Result<&str> {
            require(self.stocks_url.as_deref(), "STOCKS_URL")
        }

        pub fn require_api_token(&self) -> Result<&str> {
            require(self.api_token.as_deref(), "API_TOKEN")
        }
    }

    impl OpenAiSettings {
        pub fn require_base_url(&self) -> Result<&str> {
            require(self.base_url.as_deref(), "OPENAI_API_BASE")
        }

        pub fn require_engine(&self) -> Result<&str> {
            require(self.engine.as_deref(), "OPENAI_API_ENGINE")
        }

        pub fn require_api_version(&self) -> Result<&str> {
            require(self.api_version.as_deref(), "OPENAI_API_VERSION")
        }

        pub fn require_api_key(&self) -> Result<&str> {
            require(self.api_key.as_deref(), "OPENAI_API_KEY")
        }
    }

    fn require<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
        value.ok_or_else(|| Error::Config {
            message: format!("{key} is required"),
        })
    }

    fn compose_database_url(get: &dyn Fn(&str) -> Option<String>) -> Option<String> {
        let user = get("DB_USER")?;
        let password = get("DB_PASSWORD").unwrap_or_default();
        let host = get("DB_HOST")?;
        let port = get("DB_PORT").unwrap_or_else(|| "5432".to_string());
        let database = get("DB_DATABASE")?;
        Some(format!(
            "postgresql://{user}:{password}@{host}:{port}/{database}?sslmode=require"
        ))
    }

    fn parse_secs(value: Option<String>, key: &str) -> Result<Option<Duration>> {
        value
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| Error::Config {
                        message: format!("{key} must be a whole number of seconds (got {v:?})"),
                    })
            })
            .transpose()
    }

    fn is_truthy(value: &str) -> bool {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    }

}
