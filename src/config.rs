use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::stream::WireFormat;
use crate::server::store::MAX_PAGE_LIMIT;
use crate::util::is_http_url;

pub const DEFAULT_STREAM_URL: &str = "http://localhost:3000/stream-events";
pub const DEFAULT_HISTORY_URL: &str = "http://localhost:3000/events";
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub stream_url: String,
    pub history_url: String,
    pub wire_format: WireFormat,
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_STREAM_URL.to_string(),
            history_url: DEFAULT_HISTORY_URL.to_string(),
            wire_format: WireFormat::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let v = v.trim();
        if v.is_empty() {
            None
        } else {
            Some(v.to_string())
        }
    })
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let stream_url = non_empty_var("AGENT_STREAM_URL").unwrap_or(defaults.stream_url);
        let history_url = non_empty_var("AGENT_HISTORY_URL").unwrap_or(defaults.history_url);

        let wire_format = match non_empty_var("AGENT_WIRE_FORMAT") {
            Some(raw) => raw
                .parse::<WireFormat>()
                .map_err(|e| anyhow!("Invalid AGENT_WIRE_FORMAT '{raw}': {e}"))?,
            None => defaults.wire_format,
        };

        let page_size = match non_empty_var("AGENT_HISTORY_PAGE_SIZE") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("Invalid AGENT_HISTORY_PAGE_SIZE '{raw}'"))?,
            None => defaults.page_size,
        };

        Ok(Self {
            stream_url,
            history_url,
            wire_format,
            page_size,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.stream_url) {
            bail!(
                "Invalid AGENT_STREAM_URL '{}': expected http:// or https:// URL",
                self.stream_url
            );
        }
        if !is_http_url(&self.history_url) {
            bail!(
                "Invalid AGENT_HISTORY_URL '{}': expected http:// or https:// URL",
                self.history_url
            );
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_LIMIT {
            bail!(
                "Invalid AGENT_HISTORY_PAGE_SIZE {}: expected 1..={}",
                self.page_size,
                MAX_PAGE_LIMIT
            );
        }
        Ok(())
    }
}
