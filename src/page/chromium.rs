//! Headless Chromium page client
//!
//! Launches one browser per crawl and opens a tab per request. Capability
//! queries are small DOM scripts evaluated in the page.

use crate::page::{ControlState, LaunchOptions, PageClient, PageError, PageResult, PageSession};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

/// Page client backed by a Chromium instance
pub struct ChromiumClient {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumClient {
    /// Launches the browser
    ///
    /// # Arguments
    ///
    /// * `options` - Headless mode, executable and proxy settings
    ///
    /// # Returns
    ///
    /// * `Ok(ChromiumClient)` - Browser is running and its event handler is polled
    /// * `Err(PageError)` - Browser could not be configured or started
    pub async fn launch(options: &LaunchOptions) -> PageResult<Self> {
        let mut builder = BrowserConfig::builder();

        if !options.headless {
            builder = builder.with_head();
        }

        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }

        if let Some(proxy) = options.proxy_url() {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        let config = builder
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .build()
            .map_err(PageError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PageError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler error: {}", e);
                }
            }
            tracing::debug!("Browser handler task completed");
        });

        tracing::info!("Browser launched (headless: {})", options.headless);

        Ok(Self { browser, handler })
    }
}

impl Drop for ChromiumClient {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait]
impl PageClient for ChromiumClient {
    async fn open(&self, url: &str) -> PageResult<Box<dyn PageSession>> {
        let navigation = |e: chromiumoxide::error::CdpError| PageError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        };

        let page = self.browser.new_page(url).await.map_err(navigation)?;
        if let Err(e) = page.wait_for_navigation().await {
            if let Err(close) = page.close().await {
                tracing::debug!("Failed to close tab for {}: {}", url, close);
            }
            return Err(navigation(e));
        }

        Ok(Box::new(ChromiumSession { page }))
    }
}

/// One open tab
struct ChromiumSession {
    page: Page,
}

impl ChromiumSession {
    /// Evaluates a script that returns `JSON.stringify(...)` and decodes it
    ///
    /// Going through a string keeps `null` and `undefined` results intact.
    async fn eval_json<T: DeserializeOwned>(&self, selector: &str, script: String) -> PageResult<T> {
        let query = |message: String| PageError::Query {
            selector: selector.to_string(),
            message,
        };

        let encoded: String = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| query(e.to_string()))?
            .into_value()
            .map_err(|e| query(e.to_string()))?;

        serde_json::from_str(&encoded).map_err(|e| query(e.to_string()))
    }
}

/// Quotes a value as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn title(&mut self) -> PageResult<String> {
        let title = self.page.get_title().await.map_err(|e| PageError::Query {
            selector: "title".to_string(),
            message: e.to_string(),
        })?;
        Ok(title.unwrap_or_default())
    }

    async fn query_links(&mut self, selector: &str) -> PageResult<Vec<String>> {
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(a => a.href).filter(h => !!h))",
            js_string(selector)
        );
        self.eval_json(selector, script).await
    }

    async fn control_state(
        &mut self,
        selector: &str,
        inactive_class: &str,
    ) -> PageResult<ControlState> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return JSON.stringify('missing'); \
             return JSON.stringify(el.classList.contains({}) ? 'inactive' : 'active'); }})()",
            js_string(selector),
            js_string(inactive_class)
        );

        let state: String = self.eval_json(selector, script).await?;
        Ok(match state.as_str() {
            "inactive" => ControlState::Inactive,
            "active" => ControlState::Active,
            _ => ControlState::Missing,
        })
    }

    async fn click_control(&mut self, selector: &str) -> PageResult<()> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return JSON.stringify(false); el.click(); return JSON.stringify(true); }})()",
            js_string(selector)
        );

        let clicked: bool = self.eval_json(selector, script).await?;
        if clicked {
            Ok(())
        } else {
            Err(PageError::ControlNotFound(selector.to_string()))
        }
    }

    async fn is_visible(&mut self, selector: &str) -> PageResult<bool> {
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).some(e => \
             !!(e.offsetWidth || e.offsetHeight || e.getClientRects().length)))",
            js_string(selector)
        );
        self.eval_json(selector, script).await
    }

    async fn query_text(&mut self, selector: &str) -> PageResult<String> {
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(e => e.textContent).join(''))",
            js_string(selector)
        );
        self.eval_json(selector, script).await
    }

    async fn query_all_text(&mut self, selector: &str) -> PageResult<Vec<String>> {
        let script = format!(
            "JSON.stringify(Array.from(document.querySelectorAll({})).map(e => e.textContent))",
            js_string(selector)
        );
        self.eval_json(selector, script).await
    }

    async fn read_global(&mut self, name: &str) -> PageResult<serde_json::Value> {
        let script = format!(
            "(() => {{ const v = window[{}]; return JSON.stringify(v === undefined ? null : v); }})()",
            js_string(name)
        );
        self.eval_json(name, script).await
    }

    async fn close(self: Box<Self>) -> PageResult<()> {
        self.page.close().await.map_err(|_| PageError::Closed)
    }
}
