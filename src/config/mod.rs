mod settings;

pub use settings::{
    ApiConfig, MailConfig, MetaConfig, QueueSettings, RedisConfig, ServerConfig, Settings,
    TwilioConfig, WhatsAppConfig, WorkerSettings,
};
