use std::{env, path::PathBuf, time::Duration};

use crate::errors::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://casa_manager.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_STATIC_DIR: &str = "dist";

/// Process settings, read once from the environment (and `.env`) at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub port: u16,
    pub static_dir: PathBuf,
    /// `None` issues tokens without an `exp` claim.
    pub token_ttl: Option<Duration>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::ConfigError("JWT_SECRET must be set".to_owned()))?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| AppError::ConfigError(format!("PORT {raw:?}: {e}")))?,
            None => DEFAULT_PORT,
        };

        let token_ttl = match lookup("TOKEN_TTL_HOURS") {
            Some(raw) => {
                let hours = raw
                    .parse::<u64>()
                    .map_err(|e| AppError::ConfigError(format!("TOKEN_TTL_HOURS {raw:?}: {e}")))?;
                if hours == 0 {
                    return Err(AppError::ConfigError(
                        "TOKEN_TTL_HOURS must be positive".to_owned(),
                    ));
                }
                Some(Duration::from_secs(hours * 3600))
            }
            None => None,
        };

        Ok(Config {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_owned()),
            jwt_secret,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned()),
            port,
            static_dir: lookup("STATIC_DIR")
                .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_owned())
                .into(),
            token_ttl,
        })
    }
}
