use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub workers: WorkerSettings,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    pub key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Job queue configuration: backend selection, retry defaults and retention.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Queue backend: "memory" or "redis"
    #[serde(default = "default_queue_backend")]
    pub backend: String,
    /// Key prefix for Redis-backed job storage
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,
    /// Default number of delivery attempts per job
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    /// Base delay in milliseconds for the backoff policy
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Ceiling for computed backoff delays in milliseconds
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Jitter factor applied to retry delays (0.0 to 1.0)
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    /// Number of completed jobs to keep queryable per channel
    #[serde(default = "default_keep_completed")]
    pub keep_completed: u64,
    /// Number of failed jobs to keep queryable per channel
    #[serde(default = "default_keep_failed")]
    pub keep_failed: u64,
    /// Interval for the retention cleanup task in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

/// Worker pool configuration, per channel.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// Concurrent workers for the email queue
    #[serde(default = "default_concurrency")]
    pub email_concurrency: usize,
    /// Concurrent workers for the WhatsApp queue
    #[serde(default = "default_concurrency")]
    pub whatsapp_concurrency: usize,
    /// Idle poll interval in milliseconds when no job is claimable
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound for a single delivery attempt in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: u64,
}

/// External mail-sending service.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_mail_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_from_name: Option<String>,
    pub default_from_email: Option<String>,
}

/// WhatsApp provider selection and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct WhatsAppConfig {
    /// Provider backend: "meta" or "twilio"
    #[serde(default = "default_whatsapp_provider")]
    pub provider: String,
    #[serde(default)]
    pub meta: MetaConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default = "default_graph_version")]
    pub graph_version: String,
    #[serde(default = "default_graph_base_url")]
    pub graph_base_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwilioConfig {
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// Sender address, e.g. "whatsapp:+14155238886"
    #[serde(default)]
    pub from: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4010
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_queue_backend() -> String {
    "memory".to_string()
}

fn default_redis_prefix() -> String {
    "herald:jobs".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    15_000
}

fn default_backoff_max_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_backoff_jitter() -> f64 {
    0.1 // 10% jitter
}

fn default_keep_completed() -> u64 {
    500
}

fn default_keep_failed() -> u64 {
    1000
}

fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

fn default_concurrency() -> usize {
    5
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_attempt_timeout() -> u64 {
    15
}

fn default_mail_base_url() -> String {
    "http://localhost:3010/api/mail/send".to_string()
}

fn default_whatsapp_provider() -> String {
    "meta".to_string()
}

fn default_graph_version() -> String {
    "v21.0".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4010)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("queue.backend", "memory")?
            .set_default("workers.email_concurrency", 5)?
            .set_default("workers.whatsapp_concurrency", 5)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER_HOST, SERVER_PORT, REDIS_URL, QUEUE_BACKEND, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
            redis_prefix: default_redis_prefix(),
            default_max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
            keep_completed: default_keep_completed(),
            keep_failed: default_keep_failed(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            email_concurrency: default_concurrency(),
            whatsapp_concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            attempt_timeout_seconds: default_attempt_timeout(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            base_url: default_mail_base_url(),
            api_key: None,
            default_from_name: None,
            default_from_email: None,
        }
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            provider: default_whatsapp_provider(),
            meta: MetaConfig::default(),
            twilio: TwilioConfig::default(),
        }
    }
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            graph_version: default_graph_version(),
            graph_base_url: default_graph_base_url(),
        }
    }
}
