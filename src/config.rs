//! Runtime configuration, resolved once at startup and passed explicitly into
//! session construction.

use std::time::Duration;

use crate::proxy::ProxyConfig;

/// Everything a crawl session needs to know. No process-wide mutable state;
/// the one instance lives in the shared app state and is read-only after
/// startup.
#[derive(Clone)]
pub struct CrawlerConfig {
    /// Optional outbound proxy for all browser traffic.
    pub proxy: Option<ProxyConfig>,
    /// Run Chrome with `--headless=new`.
    pub headless: bool,
    /// Maximum number of result pages one crawl will visit.
    pub max_pages: u32,
    /// Per-page wait for the result list to render.
    pub page_timeout: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            headless: true,
            max_pages: 10,
            page_timeout: Duration::from_secs(20),
        }
    }
}

impl CrawlerConfig {
    /// Read configuration from the environment. Unset or malformed values fall
    /// back to the defaults.
    ///
    /// Recognized variables: `PROXY_SERVER` (`host:port`, `user:pass@host:port`
    /// or `scheme://...`), `HEADLESS`, `MAX_PAGES`, `PAGE_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let proxy = std::env::var("PROXY_SERVER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| match ProxyConfig::parse(&s) {
                Ok(proxy) => Some(proxy),
                Err(e) => {
                    tracing::warn!("Ignoring PROXY_SERVER: {}", e);
                    None
                }
            });

        let headless = std::env::var("HEADLESS")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(defaults.headless);

        let max_pages = std::env::var("MAX_PAGES")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_pages);

        let page_timeout = std::env::var("PAGE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&n| n > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.page_timeout);

        Self {
            proxy,
            headless,
            max_pages,
            page_timeout,
        }
    }
}
