use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::db::Settings;
use crate::payments::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set outside dev mode")]
    MissingSecret(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub dev_mode: bool,
    pub xendit_api_base: String,
    pub xendit_secret_key: String,
    pub xendit_callback_token: String,
    pub ticket_code_secret: String,
    pub admin_api_key: String,
    pub order_ttl_secs: i64,
    pub agent_registration_fee: i64,
    pub currency: String,
    pub gateway_timeout: Duration,
    pub gateway_max_attempts: u32,
    /// Zero disables the background sweep
    pub sweep_interval: Duration,
    /// 0 keeps payment events forever
    pub payment_event_retention_days: i64,
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// Secrets are required in production. Dev mode substitutes a fixed
/// placeholder so the server can start from an empty environment.
fn secret_var(name: &'static str, dev_mode: bool) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ if dev_mode => {
            tracing::warn!("{} not set, using dev placeholder", name);
            Ok(format!("dev-{}", name.to_ascii_lowercase()))
        }
        _ => Err(ConfigError::MissingSecret(name)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("BOXOFFICE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = parse_var("PORT", 3000)?;

        let order_ttl_minutes: i64 = parse_var("ORDER_TTL_MINUTES", 60)?;
        if order_ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                name: "ORDER_TTL_MINUTES",
                value: order_ttl_minutes.to_string(),
            });
        }
        let gateway_max_attempts: u32 = parse_var("GATEWAY_MAX_ATTEMPTS", 3)?;
        if gateway_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "GATEWAY_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "boxoffice.db".to_string()),
            dev_mode,
            xendit_api_base: env::var("XENDIT_API_BASE")
                .unwrap_or_else(|_| "https://api.xendit.co".to_string()),
            xendit_secret_key: secret_var("XENDIT_SECRET_KEY", dev_mode)?,
            xendit_callback_token: secret_var("XENDIT_CALLBACK_TOKEN", dev_mode)?,
            ticket_code_secret: secret_var("TICKET_CODE_SECRET", dev_mode)?,
            admin_api_key: secret_var("ADMIN_API_KEY", dev_mode)?,
            order_ttl_secs: order_ttl_minutes * 60,
            agent_registration_fee: parse_var("AGENT_REGISTRATION_FEE", 150_000)?,
            currency: env::var("CURRENCY").unwrap_or_else(|_| "IDR".to_string()),
            gateway_timeout: Duration::from_secs(parse_var("GATEWAY_TIMEOUT_SECS", 15)?),
            gateway_max_attempts,
            sweep_interval: Duration::from_secs(parse_var("SWEEP_INTERVAL_SECS", 60)?),
            payment_event_retention_days: parse_var("PAYMENT_EVENT_RETENTION_DAYS", 30)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Request-time settings carried in `AppState`.
    pub fn settings(&self) -> Settings {
        Settings {
            order_ttl_secs: self.order_ttl_secs,
            agent_registration_fee: self.agent_registration_fee,
            currency: self.currency.clone(),
            callback_token: self.xendit_callback_token.clone(),
            admin_api_key: self.admin_api_key.clone(),
            retry: RetryPolicy {
                max_attempts: self.gateway_max_attempts,
                ..RetryPolicy::default()
            },
        }
    }
}
