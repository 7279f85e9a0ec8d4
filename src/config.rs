//! Конфигурация HTTP-сервиса из переменных окружения
//!
//! | Переменная      | По умолчанию                 |
//! |-----------------|------------------------------|
//! | `PORT`          | `5000`                       |
//! | `MODEL_PATH`    | `models/stress_model.json`   |
//! | `APP_ENV`       | `development`                |
//! | `CORS_ORIGINS`  | `*`                          |
//! | `LOG_LEVEL`     | `info`                       |
//! | `FALLBACK_SEED` | `42`                         |

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, StressError};
use crate::models::artifact::DEFAULT_MODEL_PATH;
use crate::models::predictor::DEFAULT_FALLBACK_SEED;

/// Максимальный размер тела запроса
pub const MAX_CONTENT_LENGTH: usize = 1024 * 1024;

/// Максимальный размер пакета для `/api/batch-predict`
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        })
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub port: u16,
    pub model_path: PathBuf,
    pub environment: Environment,
    /// Пустой список или `*` - любой источник
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub fallback_seed: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            environment: Environment::Development,
            cors_origins: vec!["*".to_string()],
            log_level: "info".to_string(),
            fallback_seed: DEFAULT_FALLBACK_SEED,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Читает настройки через произвольный источник (удобно в тестах)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .map_err(|_| StressError::InvalidParameter(format!("PORT must be a port number, got '{}'", v)))?,
            None => defaults.port,
        };

        let environment = match lookup("APP_ENV") {
            Some(v) => v.parse::<Environment>().map_err(StressError::InvalidParameter)?,
            None => defaults.environment,
        };

        let fallback_seed = match lookup("FALLBACK_SEED") {
            Some(v) => v.trim().parse::<u64>().map_err(|_| {
                StressError::InvalidParameter(format!("FALLBACK_SEED must be an integer, got '{}'", v))
            })?,
            None => defaults.fallback_seed,
        };

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        Ok(Self {
            port,
            model_path: lookup("MODEL_PATH").map(PathBuf::from).unwrap_or(defaults.model_path),
            environment,
            cors_origins,
            log_level: lookup("LOG_LEVEL")
                .map(|v| v.trim().to_ascii_lowercase())
                .unwrap_or(defaults.log_level),
            fallback_seed,
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}
