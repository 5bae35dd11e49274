// Application configuration
// Loaded once at startup from the process environment (after dotenv)

use secrecy::SecretString;
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

use crate::discounts::ItemKey;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime configuration for the service
#[derive(Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt_secret: SecretString,
    pub stripe: StripeConfig,
    /// Item keys operators are allowed to create rules for
    pub enabled_item_keys: HashSet<ItemKey>,
}

/// Payment provider settings
#[derive(Debug)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub api_base: String,
    pub webhook_tolerance_secs: i64,
}

impl AppConfig {
    /// Build configuration from environment variables
    ///
    /// Required: `DATABASE_URL`, `JWT_SECRET`, `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let port = match lookup("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                message: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let db_max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                message: e.to_string(),
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        let webhook_tolerance_secs = match lookup("STRIPE_WEBHOOK_TOLERANCE_SECS") {
            Some(raw) => raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
                key: "STRIPE_WEBHOOK_TOLERANCE_SECS",
                message: e.to_string(),
            })?,
            None => DEFAULT_WEBHOOK_TOLERANCE_SECS,
        };

        let enabled_item_keys = parse_item_keys(
            &lookup("DISCOUNT_ENABLED_ITEM_KEYS").unwrap_or_else(|| ItemKey::PercentOffOnce.to_string()),
        )?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            db_max_connections,
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            jwt_secret: SecretString::new(required("JWT_SECRET")?),
            stripe: StripeConfig {
                secret_key: SecretString::new(required("STRIPE_SECRET_KEY")?),
                webhook_secret: SecretString::new(required("STRIPE_WEBHOOK_SECRET")?),
                api_base: lookup("STRIPE_API_BASE")
                    .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.to_string()),
                webhook_tolerance_secs,
            },
            enabled_item_keys,
        })
    }

    /// Socket address string the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a comma separated list of item keys
fn parse_item_keys(raw: &str) -> Result<HashSet<ItemKey>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            ItemKey::from_str(s).map_err(|message| ConfigError::Invalid {
                key: "DISCOUNT_ENABLED_ITEM_KEYS",
                message,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/promotions".to_string()),
            ("JWT_SECRET", "jwt-secret".to_string()),
            ("STRIPE_SECRET_KEY", "sk_test_123".to_string()),
            ("STRIPE_WEBHOOK_SECRET", "whsec_123".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_env()).unwrap();

        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.stripe.api_base, "https://api.stripe.com");
        assert_eq!(config.stripe.webhook_tolerance_secs, 300);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.stripe.webhook_secret.expose_secret(), "whsec_123");
        assert_eq!(
            config.enabled_item_keys,
            HashSet::from([ItemKey::PercentOffOnce])
        );
    }

    #[test]
    fn test_missing_required_key() {
        let mut env = base_env();
        env.remove("STRIPE_WEBHOOK_SECRET");

        let err = load(&env).unwrap_err();
        assert_eq!(err.to_string(), "STRIPE_WEBHOOK_SECRET must be set in environment");
    }

    #[test]
    fn test_enabled_item_keys_parsed() {
        let mut env = base_env();
        env.insert("DISCOUNT_ENABLED_ITEM_KEYS", "PERCENT_OFF_ONCE, TRIAL_DAYS".to_string());

        let config = load(&env).unwrap();
        assert!(config.enabled_item_keys.contains(&ItemKey::TrialDays));
        assert!(!config.enabled_item_keys.contains(&ItemKey::AmountOffOnce));
    }

    #[test]
    fn test_invalid_item_key_rejected() {
        let mut env = base_env();
        env.insert("DISCOUNT_ENABLED_ITEM_KEYS", "FREE_LUNCH".to_string());

        assert!(matches!(load(&env), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut env = base_env();
        env.insert("PORT", "eighty".to_string());

        assert!(matches!(load(&env), Err(ConfigError::Invalid { key: "PORT", .. })));
    }
}
