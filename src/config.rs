use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}, expected compact or json")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub steps: u32,
    pub tick_ms: u64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.steps == 0 {
            return Err(AppError::Internal(
                "invalid SIMULATION_STEPS: must be > 0".to_string(),
            ));
        }
        if self.tick_ms == 0 {
            return Err(AppError::Internal(
                "invalid SIMULATION_TICK_MS: must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    /// Prefix for generated tracking links, without trailing slash.
    pub public_base_url: String,
    pub simulation: SimulationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 1024,
            public_base_url: "http://localhost:3000".to_string(),
            simulation: SimulationConfig {
                enabled: false,
                steps: 100,
                tick_ms: 1000,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let simulation = SimulationConfig {
            enabled: parse_or_default("SIMULATE_DRIVER", defaults.simulation.enabled)?,
            steps: parse_or_default("SIMULATION_STEPS", defaults.simulation.steps)?,
            tick_ms: parse_or_default("SIMULATION_TICK_MS", defaults.simulation.tick_ms)?,
        };
        simulation.validate()?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_or_default("LOG_FORMAT", defaults.log_format)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            simulation,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
