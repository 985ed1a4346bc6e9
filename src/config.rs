use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub queue_page_size: usize,
    pub inactivity_timeout_secs: u64,

    // Registro de uso
    pub data_dir: PathBuf,
    pub enable_usage_log: bool,
    pub reset_usage_log: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Reproducción
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()?,
            max_queue_size: std::env::var("MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,
            queue_page_size: std::env::var("QUEUE_PAGE_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            inactivity_timeout_secs: std::env::var("INACTIVITY_TIMEOUT")
                .unwrap_or_else(|_| "600".to_string())
                .parse()?,

            // Registro de uso
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            enable_usage_log: std::env::var("ENABLE_USAGE_LOG")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,
            reset_usage_log: std::env::var("RESET_USAGE_LOG")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// Catches the common mistakes that would otherwise surface as confusing
    /// runtime behavior (a zero-size queue, a volume Discord clamps anyway).
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }
        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }
        if self.inactivity_timeout_secs == 0 {
            anyhow::bail!("Inactivity timeout must be greater than 0");
        }
        Ok(())
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Valores por defecto, usados cuando las variables de entorno no están.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin defaults: deben proveerse)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 500,
            queue_page_size: 10,
            inactivity_timeout_secs: 600,

            data_dir: "data".into(),
            enable_usage_log: true,
            reset_usage_log: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad_volume = Config {
            default_volume: 3.0,
            ..Config::default()
        };
        assert!(bad_volume.validate().is_err());

        let empty_queue = Config {
            max_queue_size: 0,
            ..Config::default()
        };
        assert!(empty_queue.validate().is_err());

        let zero_timeout = Config {
            inactivity_timeout_secs: 0,
            ..Config::default()
        };
        assert!(zero_timeout.validate().is_err());
    }
}
