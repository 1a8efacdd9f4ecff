use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;
use crate::level::Level;
use crate::logger::LEVEL_OFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(LogError::config(format!("unknown log format {:?}", other))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Engine level name or `OFF`.
    pub level: String,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
    pub format: LogFormat,
    pub report_caller: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Text,
            report_caller: true,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Result<Self, LogError> {
        let level = env::var("CLIENT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        if level.trim().is_empty() {
            return Err(LogError::config("CLIENT_LOG_LEVEL cannot be empty"));
        }

        let file = match env::var("CLIENT_LOG_FILE") {
            Ok(path) if !path.trim().is_empty() => Some(PathBuf::from(path)),
            _ => None,
        };

        let format = env::var("CLIENT_LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .parse::<LogFormat>()?;

        let report_caller = match env::var("CLIENT_LOG_REPORT_CALLER") {
            Ok(v) => parse_bool(&v)
                .ok_or_else(|| LogError::config("CLIENT_LOG_REPORT_CALLER must be true or false"))?,
            Err(_) => true,
        };

        let config = LogConfig {
            level,
            file,
            format,
            report_caller,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LogError> {
        if self.level.eq_ignore_ascii_case(LEVEL_OFF) {
            return Ok(());
        }
        self.level.parse::<Level>().map(|_| ())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
