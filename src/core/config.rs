use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use sqlx::postgres::PgConnectOptions;
use sqlx::ConnectOptions;

use crate::sync::SyncSettings;

#[derive(Deserialize, Clone)]
pub struct AppConfig {
    pub recruitment_list_server_config: RecruitmentListServer,
    pub postgres: PostgresConfig,
    pub smtp: Option<SmtpConfig>,
    pub study_service: StudyServiceConfig,
    pub jwt_auth_config: JwtAuthConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn new() -> Result<Self, config::ConfigError> {
        let base_path = std::env::current_dir().map_err(|e| {
            config::ConfigError::Message(format!("Failed to find the current dir: {}", e))
        })?;
        let config_dir = base_path.join("src/core/configurations");

        let app_environment: Environment = std::env::var("RECRUITMENT_LIST_APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .try_into()
            .map_err(config::ConfigError::Message)?;

        let configurations = config::Config::builder()
            .add_source(
                config::File::from(config_dir.join(app_environment.as_str())).required(true),
            )
            // RECRUITMENT_LIST__POSTGRES__PASSWORD=... overrides postgres.password
            .add_source(
                config::Environment::with_prefix("RECRUITMENT_LIST")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        configurations.try_deserialize()
    }
}

#[derive(Deserialize, Clone)]
pub struct RecruitmentListServer {
    pub port: u16,
    pub host: String,
}

#[derive(Deserialize, Clone)]
pub struct PostgresConfig {
    pub username: String,
    pub password: Secret<String>,
    pub host: String,
    pub port: u16,
    pub database_name: String,
}

impl PostgresConfig {
    pub fn connect(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
            .database(&self.database_name);

        options.log_statements(tracing::log::LevelFilter::Trace)
    }
}

#[derive(Deserialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Deserialize, Clone)]
pub struct StudyServiceConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    pub instance_id: String,
    pub global_secret: Secret<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Clone)]
pub struct JwtAuthConfig {
    pub secret: Secret<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct SyncConfig {
    /// Interval of the periodic sync job, `0` disables it.
    #[serde(default = "default_job_interval_secs")]
    pub job_interval_secs: u64,
    #[serde(default = "default_participant_sync_guard_secs")]
    pub participant_sync_guard_secs: i64,
    #[serde(default = "default_true")]
    pub data_sync_overlap_guard: bool,
    #[serde(default = "default_data_sync_stale_after_secs")]
    pub data_sync_stale_after_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            job_interval_secs: default_job_interval_secs(),
            participant_sync_guard_secs: default_participant_sync_guard_secs(),
            data_sync_overlap_guard: true,
            data_sync_stale_after_secs: default_data_sync_stale_after_secs(),
        }
    }
}

impl SyncConfig {
    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            participant_sync_guard: chrono::Duration::seconds(self.participant_sync_guard_secs),
            data_sync_guard: self
                .data_sync_overlap_guard
                .then(|| chrono::Duration::seconds(self.data_sync_stale_after_secs)),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_job_interval_secs() -> u64 {
    6 * 3600
}

fn default_participant_sync_guard_secs() -> i64 {
    300
}

fn default_data_sync_stale_after_secs() -> i64 {
    3 * 3600
}

fn default_true() -> bool {
    true
}

pub enum Environment {
    Local,
    Sandbox,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "sandbox" => Ok(Self::Sandbox),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not supported environment. Use either `local`, `sandbox` or `production` ",
                other
            )),
        }
    }
}
