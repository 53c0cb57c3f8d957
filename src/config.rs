use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub shared_secret: String,
    pub port: u16,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub redis_db: u8,

    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub cache_directory: String,

    pub crawl_output_dir: String,

    pub crawler_concurrency: usize,
    pub crawler_max_jobs: usize,
    pub crawler_lock_duration_secs: u64,
    pub crawler_lock_renew_time_secs: u64,
    pub crawler_retry_attempts: u32,
    pub crawler_retry_delay_ms: u64,
    pub crawler_enable_dynamic_scaling: bool,
    pub crawler_max_concurrency: usize,
    pub crawler_min_concurrency: usize,

    pub max_concurrent_lighthouse: usize,
    pub max_concurrent_renderers: usize,
    pub renderer_script_path: String,

    pub llm_extractor_endpoint: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let shared_secret =
            env::var("SHARED_SECRET").map_err(|_| ConfigError::Missing("SHARED_SECRET"))?;

        let port = parse_or_default("PORT", 8080)?;

        let redis_host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let redis_port = parse_or_default("REDIS_PORT", 6379)?;
        let redis_password = env::var("REDIS_PASSWORD").ok();
        let redis_db: u8 = parse_or_default("REDIS_DB", 0)?;

        let cache_enabled = parse_bool_or_default("CACHE_ENABLED", true);
        let cache_ttl_secs = parse_or_default("CACHE_TTL", 3600)?;
        let cache_directory = env::var("CACHE_DIRECTORY").unwrap_or_else(|_| "/tmp/crawler-cache".to_string());

        let crawl_output_dir = env::var("CRAWL_OUTPUT_DIR").unwrap_or_else(|_| "./output".to_string());

        let crawler_concurrency = parse_or_default("CRAWLER_CONCURRENCY", 5)?;
        let crawler_max_jobs = parse_or_default("CRAWLER_MAX_JOBS", 1000)?;
        let crawler_lock_duration_secs = parse_or_default("CRAWLER_LOCK_DURATION", 60)?;
        let crawler_lock_renew_time_secs = parse_or_default("CRAWLER_LOCK_RENEW_TIME", 48)?;
        let crawler_retry_attempts = parse_or_default("CRAWLER_RETRY_ATTEMPTS", 3)?;
        let crawler_retry_delay_ms = parse_or_default("CRAWLER_RETRY_DELAY", 1000)?;
        let crawler_enable_dynamic_scaling = parse_bool_or_default("CRAWLER_ENABLE_DYNAMIC_SCALING", false);
        let crawler_max_concurrency = parse_or_default("CRAWLER_MAX_CONCURRENCY", 20)?;
        let crawler_min_concurrency = parse_or_default("CRAWLER_MIN_CONCURRENCY", 1)?;

        let max_concurrent_lighthouse = parse_or_default("MAX_CONCURRENT_LIGHTHOUSE", 2)?;
        let max_concurrent_renderers = parse_or_default("MAX_CONCURRENT_RENDERERS", 3)?;
        let renderer_script_path =
            env::var("RENDERER_SCRIPT_PATH").unwrap_or_else(|_| "/app/scripts/render-links.mjs".to_string());

        let llm_extractor_endpoint = env::var("LLM_EXTRACTOR_ENDPOINT").ok();
        let webhook_secret = env::var("WEBHOOK_SECRET").ok();

        Ok(Config {
            shared_secret,
            port,
            redis_host,
            redis_port,
            redis_password,
            redis_db,
            cache_enabled,
            cache_ttl_secs,
            cache_directory,
            crawl_output_dir,
            crawler_concurrency,
            crawler_max_jobs,
            crawler_lock_duration_secs,
            crawler_lock_renew_time_secs,
            crawler_retry_attempts,
            crawler_retry_delay_ms,
            crawler_enable_dynamic_scaling,
            crawler_max_concurrency,
            crawler_min_concurrency,
            max_concurrent_lighthouse,
            max_concurrent_renderers,
            renderer_script_path,
            llm_extractor_endpoint,
            webhook_secret,
        })
    }

    /// `redis://[:password@]host:port/db`
    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.redis_host, self.redis_port, self.redis_db
            ),
            None => format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db),
        }
    }
}

fn parse_or_default<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, "failed to parse")),
        Err(_) => Ok(default),
    }
}

fn parse_bool_or_default(key: &'static str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, &'static str),
}
