//! Page client boundary
//!
//! The crawler never touches markup directly. Everything it needs from a
//! rendered page goes through the capability interface defined here:
//! - `PageClient` opens a URL and hands back a loaded `PageSession`
//! - `PageSession` answers link, text and control queries and clicks controls
//! - `wait_until_hidden` polls a session until a loading indicator clears
//!
//! A browser-backed implementation lives in `chromium` (feature `chromium`).

#[cfg(feature = "chromium")]
pub mod chromium;

use crate::config::Config;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a page client or session
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Query '{selector}' failed: {message}")]
    Query { selector: String, message: String },

    #[error("Control '{0}' not found")]
    ControlNotFound(String),

    #[error("Page session closed")]
    Closed,
}

/// Result type for page operations
pub type PageResult<T> = Result<T, PageError>;

/// State of a clickable control such as the "next page" button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// No element matches the selector
    Missing,

    /// Present but carrying the inactive class
    Inactive,

    /// Present and clickable
    Active,
}

/// Result of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
}

/// A loaded page the crawler can query
#[async_trait]
pub trait PageSession: Send {
    /// Returns the document title
    async fn title(&mut self) -> PageResult<String>;

    /// Returns the absolute `href` of every element matching `selector`
    async fn query_links(&mut self, selector: &str) -> PageResult<Vec<String>>;

    /// Inspects the first element matching `selector`
    async fn control_state(
        &mut self,
        selector: &str,
        inactive_class: &str,
    ) -> PageResult<ControlState>;

    /// Returns true if the control is absent or marked inactive
    async fn is_control_inactive(
        &mut self,
        selector: &str,
        inactive_class: &str,
    ) -> PageResult<bool> {
        Ok(self.control_state(selector, inactive_class).await? != ControlState::Active)
    }

    /// Clicks the first element matching `selector`
    async fn click_control(&mut self, selector: &str) -> PageResult<()>;

    /// Returns true if any element matching `selector` is rendered visibly
    async fn is_visible(&mut self, selector: &str) -> PageResult<bool>;

    /// Returns the concatenated text of all elements matching `selector`
    async fn query_text(&mut self, selector: &str) -> PageResult<String>;

    /// Returns the text of each element matching `selector`
    async fn query_all_text(&mut self, selector: &str) -> PageResult<Vec<String>>;

    /// Reads a page-level global variable, `Null` when undefined
    async fn read_global(&mut self, name: &str) -> PageResult<serde_json::Value>;

    /// Releases the page
    async fn close(self: Box<Self>) -> PageResult<()>;
}

/// Opens pages
#[async_trait]
pub trait PageClient: Send + Sync {
    /// Navigates to `url` and returns the loaded page
    async fn open(&self, url: &str) -> PageResult<Box<dyn PageSession>>;
}

/// Options handed to a page client when it starts
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable: Option<String>,

    /// Opaque proxy configuration, passed through untouched
    pub proxy: Option<serde_json::Value>,
}

impl LaunchOptions {
    /// Builds launch options from the `[browser]` section and the input's
    /// proxy configuration
    pub fn from_config(config: &Config) -> Self {
        let proxy = config
            .input
            .proxy_configuration
            .as_ref()
            .and_then(|table| serde_json::to_value(table).ok());

        Self {
            headless: config.browser.headless,
            executable: config.browser.executable.clone(),
            proxy,
        }
    }

    /// Returns the proxy server URL if the proxy configuration names one
    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy
            .as_ref()
            .and_then(|proxy| proxy.get("proxy-url").or_else(|| proxy.get("proxyUrl")))
            .and_then(|value| value.as_str())
    }
}

/// Polls until no element matching `selector` is visible
///
/// Returns `WaitOutcome::TimedOut` once `timeout` elapses; the caller
/// decides whether that matters.
pub async fn wait_until_hidden(
    session: &mut dyn PageSession,
    selector: &str,
    timeout: Duration,
    poll: Duration,
) -> PageResult<WaitOutcome> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if !session.is_visible(selector).await? {
            return Ok(WaitOutcome::Satisfied);
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(WaitOutcome::TimedOut);
        }

        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Session whose loading indicator disappears after a number of polls
    struct Loading {
        visible_polls: usize,
        polls: usize,
    }

    #[async_trait]
    impl PageSession for Loading {
        async fn title(&mut self) -> PageResult<String> {
            Ok(String::new())
        }
        async fn query_links(&mut self, _selector: &str) -> PageResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn control_state(&mut self, _s: &str, _c: &str) -> PageResult<ControlState> {
            Ok(ControlState::Missing)
        }
        async fn click_control(&mut self, selector: &str) -> PageResult<()> {
            Err(PageError::ControlNotFound(selector.to_string()))
        }
        async fn is_visible(&mut self, _selector: &str) -> PageResult<bool> {
            self.polls += 1;
            Ok(self.polls <= self.visible_polls)
        }
        async fn query_text(&mut self, _selector: &str) -> PageResult<String> {
            Ok(String::new())
        }
        async fn query_all_text(&mut self, _selector: &str) -> PageResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn read_global(&mut self, _name: &str) -> PageResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn close(self: Box<Self>) -> PageResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_satisfied_when_indicator_clears() {
        let mut session = Loading { visible_polls: 3, polls: 0 };
        let outcome = wait_until_hidden(
            &mut session,
            ".loading",
            Duration::from_secs(10),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Satisfied);
        assert_eq!(session.polls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let mut session = Loading { visible_polls: usize::MAX, polls: 0 };
        let outcome = wait_until_hidden(
            &mut session,
            ".loading",
            Duration::from_millis(1000),
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_missing_control_counts_as_inactive() {
        let mut session = Loading { visible_polls: 0, polls: 0 };
        assert!(session.is_control_inactive(".p_next", "inactive").await.unwrap());
    }

    #[test]
    fn test_proxy_url_lookup() {
        let options = LaunchOptions {
            proxy: Some(serde_json::json!({ "proxy-url": "http://proxy:8000" })),
            ..LaunchOptions::default()
        };
        assert_eq!(options.proxy_url(), Some("http://proxy:8000"));

        let options = LaunchOptions {
            proxy: Some(serde_json::json!({ "useApifyProxy": true })),
            ..LaunchOptions::default()
        };
        assert_eq!(options.proxy_url(), None);
    }
}
