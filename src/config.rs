//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use bigdecimal::BigDecimal;
use std::env;
use std::str::FromStr;

use crate::click::signature::SignatureScheme;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub click: ClickConfig,
    pub notifier: NotifierConfig,
    pub admin: AdminConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Click merchant credentials and signing setup.
///
/// The secret key is loaded once at startup and must never appear in logs.
#[derive(Debug, Clone)]
pub struct ClickConfig {
    pub service_id: String,
    pub merchant_id: String,
    pub secret_key: String,
    pub return_url: String,
    pub sign_scheme: SignatureScheme,
    /// Fixed one-time access price, in so'm.
    pub payment_amount: BigDecimal,
}

/// Downstream bot notification endpoint.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub url: String,
    pub timeout_secs: u64,
}

/// Admin API guard.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub api_key: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            click: ClickConfig::from_env()?,
            notifier: NotifierConfig::from_env()?,
            admin: AdminConfig::from_env(),
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.click.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl ClickConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let payment_amount = env::var("PAYMENT_AMOUNT").unwrap_or_else(|_| "1111".to_string());
        let payment_amount = BigDecimal::from_str(payment_amount.trim())
            .map_err(|_| ConfigError::InvalidValue("PAYMENT_AMOUNT".to_string()))?;

        let sign_scheme = env::var("CLICK_SIGN_SCHEME").unwrap_or_else(|_| "md5".to_string());
        let sign_scheme = sign_scheme
            .parse::<SignatureScheme>()
            .map_err(|_| ConfigError::InvalidValue("CLICK_SIGN_SCHEME".to_string()))?;

        Ok(ClickConfig {
            service_id: env::var("CLICK_SERVICE_ID")
                .map_err(|_| ConfigError::MissingVariable("CLICK_SERVICE_ID".to_string()))?,
            merchant_id: env::var("CLICK_MERCHANT_ID")
                .map_err(|_| ConfigError::MissingVariable("CLICK_MERCHANT_ID".to_string()))?,
            secret_key: env::var("CLICK_SECRET_KEY")
                .map_err(|_| ConfigError::MissingVariable("CLICK_SECRET_KEY".to_string()))?,
            return_url: env::var("CLICK_RETURN_URL")
                .unwrap_or_else(|_| "https://t.me/sherlar_bot".to_string()),
            sign_scheme,
            payment_amount,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue("CLICK_SERVICE_ID".to_string()));
        }
        if self.merchant_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue("CLICK_MERCHANT_ID".to_string()));
        }
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue("CLICK_SECRET_KEY".to_string()));
        }
        if self.payment_amount <= BigDecimal::from(0) {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_AMOUNT must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl NotifierConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(NotifierConfig {
            url: env::var("BOT_NOTIFY_URL").unwrap_or_else(|_| {
                "http://127.0.0.1:9988/internal/send-payment-notification".to_string()
            }),
            timeout_secs: env::var("NOTIFY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("NOTIFY_TIMEOUT_SECS".to_string()))?,
        })
    }
}

impl AdminConfig {
    pub fn from_env() -> Self {
        AdminConfig {
            api_key: env::var("ADMIN_API_KEY").ok().filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Invalid port
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_click_config_validation() {
        let config = ClickConfig {
            service_id: "12345".to_string(),
            merchant_id: "678".to_string(),
            secret_key: "secret".to_string(),
            return_url: "https://t.me/sherlar_bot".to_string(),
            sign_scheme: SignatureScheme::Md5,
            payment_amount: BigDecimal::from(1111),
        };
        assert!(config.validate().is_ok());

        let zero_amount = ClickConfig {
            payment_amount: BigDecimal::from(0),
            ..config.clone()
        };
        assert!(zero_amount.validate().is_err());

        let empty_secret = ClickConfig {
            secret_key: "".to_string(),
            ..config
        };
        assert!(empty_secret.validate().is_err());
    }
}
