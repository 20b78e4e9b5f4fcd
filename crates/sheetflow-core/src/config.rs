//! Configuration module
//!
//! Environment-sourced settings for the HTTP surface, the broker/result store,
//! upload storage, outbound email, the worker pool, and logging.
//! `.env` files are honoured through `dotenvy`.

use std::env;
use std::fmt;
use std::str::FromStr;

const APP_NAME: &str = "SheetFlow";
const SERVER_PORT: u16 = 8000;
const API_PREFIX: &str = "/api/v1";
const ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:8000";
const HTTP_CONCURRENCY_LIMIT: usize = 10_000;
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const UPLOAD_DIR: &str = "uploads";
const MAX_UPLOAD_SIZE_MB: usize = 25;
const BREVO_API_URL: &str = "https://api.brevo.com/v3/smtp/email";
const SMTP_PORT: u16 = 587;
const EMAIL_TIMEOUT_SECS: u64 = 20;
const TASK_QUEUE_MAX_WORKERS: usize = 4;
const TASK_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const TASK_MAX_RETRIES: i32 = 3;
const TASK_RETRY_DELAY_SECS: u64 = 60;
const TASK_TIMEOUT_SECONDS: i32 = 600;
const STALE_TASK_REAP_INTERVAL_SECS: u64 = 60;
const STALE_TASK_GRACE_PERIOD_SECS: i64 = 300;
const TASK_RETENTION_DAYS: i32 = 30;

/// Where task records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// PostgreSQL `tasks` table, shared by every API and worker process.
    Postgres,
    /// Process-local store. Tasks do not survive a restart.
    Memory,
}

impl FromStr for QueueBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(QueueBackend::Postgres),
            "memory" | "in-memory" => Ok(QueueBackend::Memory),
            other => Err(anyhow::anyhow!(
                "Invalid QUEUE_BACKEND '{}': expected 'postgres' or 'memory'",
                other
            )),
        }
    }
}

impl fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueBackend::Postgres => write!(f, "postgres"),
            QueueBackend::Memory => write!(f, "memory"),
        }
    }
}

/// Outbound email transport for confirmation messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTransport {
    Brevo,
    Smtp,
}

impl FromStr for EmailTransport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "brevo" => Ok(EmailTransport::Brevo),
            "smtp" => Ok(EmailTransport::Smtp),
            other => Err(anyhow::anyhow!(
                "Invalid EMAIL_TRANSPORT '{}': expected 'brevo' or 'smtp'",
                other
            )),
        }
    }
}

impl fmt::Display for EmailTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailTransport::Brevo => write!(f, "brevo"),
            EmailTransport::Smtp => write!(f, "smtp"),
        }
    }
}

/// Which roles this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// HTTP server plus an in-process worker pool.
    Embedded,
    /// HTTP server only; tasks are consumed by a separate worker process.
    Disabled,
    /// Worker pool only, no HTTP listener.
    Only,
}

impl FromStr for WorkerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "embedded" => Ok(WorkerMode::Embedded),
            "false" | "0" | "no" => Ok(WorkerMode::Disabled),
            "only" => Ok(WorkerMode::Only),
            other => Err(anyhow::anyhow!(
                "Invalid RUN_WORKER '{}': expected 'true', 'false' or 'only'",
                other
            )),
        }
    }
}

impl WorkerMode {
    pub fn runs_worker(&self) -> bool {
        matches!(self, WorkerMode::Embedded | WorkerMode::Only)
    }

    pub fn serves_http(&self) -> bool {
        matches!(self, WorkerMode::Embedded | WorkerMode::Disabled)
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub app_name: String,
    pub debug: bool,
    pub environment: String,
    pub server_port: u16,
    pub api_prefix: String,
    pub cors_origins: Vec<String>,
    /// Maximum in-flight HTTP requests.
    pub http_concurrency_limit: usize,
    // Broker / result store
    pub queue_backend: QueueBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    // Upload storage
    pub upload_dir: String,
    pub max_upload_size_bytes: usize,
    pub delete_after_processing: bool,
    // Outbound email
    pub email_transport: EmailTransport,
    pub sender_email: String,
    pub brevo_api_key: Option<String>,
    pub brevo_api_url: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_tls: bool,
    pub email_timeout_secs: u64,
    // Worker pool
    pub worker_mode: WorkerMode,
    pub task_queue_max_workers: usize,
    pub task_queue_poll_interval_ms: u64,
    pub task_max_retries: i32,
    pub task_retry_delay_secs: u64,
    pub task_timeout_seconds: i32,
    /// Interval in seconds between runs of the stale task reaper. 0 = disabled.
    pub stale_task_reap_interval_secs: u64,
    /// Grace period in seconds added to the task timeout before a started task counts as stale.
    pub stale_task_grace_period_secs: i64,
    /// Retention in days for finished tasks (success/failure). 0 = keep forever.
    pub task_retention_days: i32,
    // Logging
    pub log_format: String,
    pub log_file: Option<String>,
    pub log_ansi: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            debug: true,
            environment: "development".to_string(),
            server_port: SERVER_PORT,
            api_prefix: API_PREFIX.to_string(),
            cors_origins: split_list(ALLOWED_ORIGINS),
            http_concurrency_limit: HTTP_CONCURRENCY_LIMIT,
            queue_backend: QueueBackend::Postgres,
            database_url: None,
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            upload_dir: UPLOAD_DIR.to_string(),
            max_upload_size_bytes: MAX_UPLOAD_SIZE_MB * 1024 * 1024,
            delete_after_processing: false,
            email_transport: EmailTransport::Brevo,
            sender_email: String::new(),
            brevo_api_key: None,
            brevo_api_url: BREVO_API_URL.to_string(),
            smtp_host: None,
            smtp_port: SMTP_PORT,
            smtp_user: None,
            smtp_password: None,
            smtp_tls: true,
            email_timeout_secs: EMAIL_TIMEOUT_SECS,
            worker_mode: WorkerMode::Embedded,
            task_queue_max_workers: TASK_QUEUE_MAX_WORKERS,
            task_queue_poll_interval_ms: TASK_QUEUE_POLL_INTERVAL_MS,
            task_max_retries: TASK_MAX_RETRIES,
            task_retry_delay_secs: TASK_RETRY_DELAY_SECS,
            task_timeout_seconds: TASK_TIMEOUT_SECONDS,
            stale_task_reap_interval_secs: STALE_TASK_REAP_INTERVAL_SECS,
            stale_task_grace_period_secs: STALE_TASK_GRACE_PERIOD_SECS,
            task_retention_days: TASK_RETENTION_DAYS,
            log_format: "text".to_string(),
            log_file: None,
            log_ansi: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env`, when present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup. Unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or(defaults.environment);

        let cors_origins = var("ALLOWED_ORIGINS")
            .map(|s| split_list(&s))
            .unwrap_or(defaults.cors_origins);

        let max_upload_size_mb: usize = parse_var(&var, "MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB)?;

        Ok(Config {
            app_name: var("APP_NAME").unwrap_or(defaults.app_name),
            debug: parse_flag(&var, "DEBUG", defaults.debug)?,
            environment,
            server_port: parse_var(&var, "PORT", defaults.server_port)?,
            api_prefix: var("API_PREFIX")
                .map(|p| normalize_prefix(&p))
                .unwrap_or(defaults.api_prefix),
            cors_origins,
            http_concurrency_limit: parse_var(
                &var,
                "HTTP_CONCURRENCY_LIMIT",
                HTTP_CONCURRENCY_LIMIT,
            )?
                .max(1),
            queue_backend: match var("QUEUE_BACKEND") {
                Some(backend) => backend.parse()?,
                None => defaults.queue_backend,
            },
            database_url: var("DATABASE_URL"),
            db_max_connections: parse_var(&var, "DB_MAX_CONNECTIONS", MAX_CONNECTIONS)?,
            db_timeout_seconds: parse_var(&var, "DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS)?,
            upload_dir: var("UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
            delete_after_processing: parse_flag(
                &var,
                "DELETE_AFTER_PROCESSING",
                defaults.delete_after_processing,
            )?,
            email_transport: match var("EMAIL_TRANSPORT") {
                Some(transport) => transport.parse()?,
                None => defaults.email_transport,
            },
            sender_email: var("SENDER_EMAIL")
                .or_else(|| var("SMTP_FROM"))
                .unwrap_or(defaults.sender_email),
            brevo_api_key: var("BREVO_API_KEY"),
            brevo_api_url: var("BREVO_API_URL").unwrap_or(defaults.brevo_api_url),
            smtp_host: var("SMTP_HOST"),
            smtp_port: parse_var(&var, "SMTP_PORT", SMTP_PORT)?,
            smtp_user: var("SMTP_USER"),
            smtp_password: var("SMTP_PASSWORD"),
            smtp_tls: parse_flag(&var, "SMTP_TLS", defaults.smtp_tls)?,
            email_timeout_secs: parse_var(&var, "EMAIL_TIMEOUT_SECS", EMAIL_TIMEOUT_SECS)?,
            worker_mode: match var("RUN_WORKER") {
                Some(mode) => mode.parse()?,
                None => defaults.worker_mode,
            },
            task_queue_max_workers: parse_var(
                &var,
                "TASK_QUEUE_MAX_WORKERS",
                TASK_QUEUE_MAX_WORKERS,
            )?,
            task_queue_poll_interval_ms: parse_var(
                &var,
                "TASK_QUEUE_POLL_INTERVAL_MS",
                TASK_QUEUE_POLL_INTERVAL_MS,
            )?,
            task_max_retries: parse_var(&var, "TASK_MAX_RETRIES", TASK_MAX_RETRIES)?,
            task_retry_delay_secs: parse_var(&var, "TASK_RETRY_DELAY_SECS", TASK_RETRY_DELAY_SECS)?,
            task_timeout_seconds: parse_var(&var, "TASK_TIMEOUT_SECONDS", TASK_TIMEOUT_SECONDS)?,
            stale_task_reap_interval_secs: parse_var(
                &var,
                "STALE_TASK_REAP_INTERVAL_SECS",
                STALE_TASK_REAP_INTERVAL_SECS,
            )?,
            stale_task_grace_period_secs: parse_var(
                &var,
                "STALE_TASK_GRACE_PERIOD_SECS",
                STALE_TASK_GRACE_PERIOD_SECS,
            )?,
            task_retention_days: parse_var(&var, "TASK_RETENTION_DAYS", TASK_RETENTION_DAYS)?,
            log_format: var("LOG_FORMAT")
                .map(|f| f.to_lowercase())
                .unwrap_or(defaults.log_format),
            log_file: var("LOG_FILE"),
            log_ansi: var("LOG_ANSI").map(|v| v == "true" || v == "1"),
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() && self.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "ALLOWED_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        if self.queue_backend == QueueBackend::Postgres {
            match self.database_url.as_deref() {
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when QUEUE_BACKEND=postgres"
                    ))
                }
                Some(url) if !url.starts_with("postgres://") && !url.starts_with("postgresql://") => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                Some(_) => {}
            }
        }

        if self.queue_backend == QueueBackend::Memory && self.worker_mode != WorkerMode::Embedded {
            return Err(anyhow::anyhow!(
                "QUEUE_BACKEND=memory requires RUN_WORKER=true: tasks cannot be shared between processes"
            ));
        }

        if self.worker_mode.serves_http() {
            if self.sender_email.is_empty() {
                return Err(anyhow::anyhow!(
                    "SENDER_EMAIL must be set to send confirmation emails"
                ));
            }
            match self.email_transport {
                EmailTransport::Brevo if self.brevo_api_key.is_none() => {
                    return Err(anyhow::anyhow!(
                        "BREVO_API_KEY must be set when EMAIL_TRANSPORT=brevo"
                    ));
                }
                EmailTransport::Smtp if self.smtp_host.is_none() => {
                    return Err(anyhow::anyhow!(
                        "SMTP_HOST must be set when EMAIL_TRANSPORT=smtp"
                    ));
                }
                _ => {}
            }
        }

        if self.task_max_retries < 0 {
            return Err(anyhow::anyhow!("TASK_MAX_RETRIES cannot be negative"));
        }

        if self.task_queue_max_workers == 0 {
            return Err(anyhow::anyhow!("TASK_QUEUE_MAX_WORKERS cannot be 0"));
        }

        if self.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB cannot be 0"));
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Parse a numeric setting. Unset falls back to `default`; garbage is an error.
fn parse_var<T, F>(var: &F, key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", key, v)),
        None => Ok(default),
    }
}

fn parse_flag<F>(var: &F, key: &str, default: bool) -> Result<bool, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key).map(|v| v.trim().to_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => Ok(false),
        Some(v) => Err(anyhow::anyhow!("{} must be true or false, got '{}'", key, v)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.server_port, 8000);
        assert_eq!(config.api_prefix, "/api/v1");
        assert_eq!(config.task_max_retries, 3);
        assert_eq!(config.task_retry_delay_secs, 60);
        assert_eq!(config.email_timeout_secs, 20);
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:3000", "http://localhost:8000"]
        );
        assert!(config.debug);
        assert!(!config.delete_after_processing);
    }

    #[test]
    fn allowed_origins_accepts_json_style_list() {
        let config = Config::from_lookup(lookup_from(&[(
            "ALLOWED_ORIGINS",
            r#"["https://a.example","https://b.example"]"#,
        )]))
        .unwrap();
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert!(Config::from_lookup(lookup_from(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn unparseable_numbers_are_errors() {
        for key in [
            "TASK_MAX_RETRIES",
            "TASK_RETRY_DELAY_SECS",
            "MAX_UPLOAD_SIZE_MB",
            "SMTP_PORT",
            "HTTP_CONCURRENCY_LIMIT",
        ] {
            let err = Config::from_lookup(lookup_from(&[(key, "abc")])).unwrap_err();
            assert!(err.to_string().contains(key), "{}", err);
        }
    }

    #[test]
    fn numeric_settings_are_read() {
        let config = Config::from_lookup(lookup_from(&[
            ("TASK_MAX_RETRIES", "5"),
            ("TASK_RETRY_DELAY_SECS", " 10 "),
        ]))
        .unwrap();
        assert_eq!(config.task_max_retries, 5);
        assert_eq!(config.task_retry_delay_secs, 10);
    }

    #[test]
    fn unparseable_flag_is_an_error() {
        assert!(Config::from_lookup(lookup_from(&[("DELETE_AFTER_PROCESSING", "maybe")])).is_err());
        let config =
            Config::from_lookup(lookup_from(&[("DELETE_AFTER_PROCESSING", "yes")])).unwrap();
        assert!(config.delete_after_processing);
    }

    #[test]
    fn api_prefix_is_normalized() {
        let config = Config::from_lookup(lookup_from(&[("API_PREFIX", "api/v2/")])).unwrap();
        assert_eq!(config.api_prefix, "/api/v2");
    }

    #[test]
    fn worker_mode_parsing() {
        assert_eq!("true".parse::<WorkerMode>().unwrap(), WorkerMode::Embedded);
        assert_eq!("false".parse::<WorkerMode>().unwrap(), WorkerMode::Disabled);
        assert_eq!("only".parse::<WorkerMode>().unwrap(), WorkerMode::Only);
        assert!("sometimes".parse::<WorkerMode>().is_err());
        assert!(!WorkerMode::Only.serves_http());
        assert!(!WorkerMode::Disabled.runs_worker());
    }

    #[test]
    fn validate_requires_database_url_for_postgres() {
        let config = Config {
            sender_email: "noreply@example.com".to_string(),
            brevo_api_key: Some("key".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            database_url: Some("postgresql://localhost/sheetflow".to_string()),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_wildcard_cors_in_production() {
        let config = Config {
            environment: "production".to_string(),
            cors_origins: vec!["*".to_string()],
            queue_backend: QueueBackend::Memory,
            sender_email: "noreply@example.com".to_string(),
            brevo_api_key: Some("key".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_transport_credentials() {
        let config = Config {
            queue_backend: QueueBackend::Memory,
            sender_email: "noreply@example.com".to_string(),
            email_transport: EmailTransport::Smtp,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            smtp_host: Some("smtp.example.com".to_string()),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn memory_backend_cannot_run_split_worker() {
        let config = Config {
            queue_backend: QueueBackend::Memory,
            worker_mode: WorkerMode::Only,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
