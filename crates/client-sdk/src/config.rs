use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.sagecontinuum.org";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeekeeperConfig {
    /// Root of the manifest/monitoring services; no trailing slash.
    pub base_url: String,
    /// Restrict joined state to nodes listed by the monitoring service.
    pub filter_nodes: bool,
    pub request_timeout: Duration,
}

impl Default for BeekeeperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            filter_nodes: true,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl BeekeeperConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_filter_nodes(self, filter_nodes: bool) -> Self {
        Self {
            filter_nodes,
            ..self
        }
    }

    /// Reads `BEEKEEPER_URL`, `BEEKEEPER_FILTER_NODES` and `BEEKEEPER_TIMEOUT_SECS`,
    /// falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("BEEKEEPER_URL") {
            Some(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        };

        if let Some(raw) = lookup("BEEKEEPER_FILTER_NODES") {
            config.filter_nodes = parse_flag(&raw).ok_or_else(|| {
                Error::Config(format!("BEEKEEPER_FILTER_NODES must be a boolean, got '{raw}'"))
            })?;
        }

        if let Some(raw) = lookup("BEEKEEPER_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("BEEKEEPER_TIMEOUT_SECS must be whole seconds, got '{raw}'"))
            })?;
            config.request_timeout = Duration::from_secs(secs.max(1));
        }

        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
