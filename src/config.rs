use std::env;
use std::time::Duration;

use crate::services::analyzer::DEFAULT_TIMEOUT;
use crate::services::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;

/// Everything read from the environment, gathered once at startup and passed down.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        // A missing key is only reported by the remote call itself.
        let api_key = lookup("GOOGLE_API_KEY").unwrap_or_else(|| {
            log::warn!("⚠️ GOOGLE_API_KEY not set, requests to Gemini will be rejected");
            String::new()
        });

        let timeout = parse_or(&lookup, "ANALYSIS_TIMEOUT_SECS", DEFAULT_TIMEOUT.as_secs());
        let max_upload_mb = parse_or(&lookup, "MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB);

        Self {
            api_key,
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: lookup("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_secs(timeout),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("⚠️ Invalid {}='{}', using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}
