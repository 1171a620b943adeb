//! Chromiumoxide-backed implementation of the engine's `RenderSession`.
//!
//! One [`HeadlessBrowser`] hosts all worker pages. Launch failure is the
//! single fatal setup error of a scan run; per-page failures after launch
//! stay inside the evaluation retry loop.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use config_manager::ChromeConfig;
use futures::StreamExt;
use rand::Rng;
use scan_core::{MarkerSpec, MarkerWait, RenderSession, SessionError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often the marker wait re-reads the page.
const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    Launch(String),
    #[error("Page creation failed: {0}")]
    Page(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

/// A launched Chrome instance plus its CDP handler task.
pub struct HeadlessBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
    config: ChromeConfig,
}

impl HeadlessBrowser {
    /// Launch Chrome with the stealth argument set. Each launch gets a fresh
    /// random profile directory so parallel runs never fight over the lock.
    pub async fn launch(config: ChromeConfig) -> Result<Self> {
        info!("Launching Chrome (headless: {})", config.headless_mode);

        let mut builder = BrowserConfig::builder();
        if let Some(ref chrome_path) = config.chrome_executable_path {
            builder = builder.chrome_executable(chrome_path);
        }
        if !config.headless_mode {
            builder = builder.with_head();
        }

        let profile_dir = {
            let mut rng = rand::thread_rng();
            format!("/tmp/chrome-profile-{}", rng.gen::<u32>())
        };
        builder = builder.user_data_dir(&profile_dir);

        if config.anti_detection_enabled {
            builder = builder.args(stealth_chrome_args());
        } else {
            builder = builder.args(baseline_chrome_args());
        }

        let browser_config = builder
            .build()
            .map_err(|e| BrowserError::Launch(format!("browser config error: {e}")))?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("Chrome ready (profile {})", profile_dir);
        Ok(Self {
            browser,
            handler_task,
            config,
        })
    }

    /// Open a fresh page for one pool worker.
    pub async fn new_session(&self) -> Result<ChromePageSession> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;

        if self.config.anti_detection_enabled {
            apply_stealth(&page).await?;
        }
        Ok(ChromePageSession { page })
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close failed: {e}");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

/// One Chrome tab implementing the engine's rendering contract.
pub struct ChromePageSession {
    page: Page,
}

#[async_trait]
impl RenderSession for ChromePageSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> std::result::Result<(), SessionError> {
        debug!("Navigating to {}", url);
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Navigation(e.to_string())),
            Err(_) => Err(SessionError::Navigation(format!(
                "timed out after {timeout:?}: {url}"
            ))),
        }
    }

    async fn wait_for_marker(
        &mut self,
        marker: &MarkerSpec,
        timeout: Duration,
    ) -> std::result::Result<MarkerWait, SessionError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = match marker {
                MarkerSpec::Css(selector) => self.page.find_element(selector.as_str()).await.is_ok(),
                MarkerSpec::TextContainsAny(_) => {
                    let text = self.read_content().await?;
                    marker.matches_text(&text)
                }
            };
            if found {
                return Ok(MarkerWait::Found);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(MarkerWait::TimedOut);
            }
            tokio::time::sleep(MARKER_POLL_INTERVAL).await;
        }
    }

    async fn full_text(&mut self) -> std::result::Result<String, SessionError> {
        self.read_content().await
    }
}

impl ChromePageSession {
    async fn read_content(&self) -> std::result::Result<String, SessionError> {
        self.page
            .content()
            .await
            .map_err(|e| SessionError::Read(e.to_string()))
    }
}

/// Flags every launch needs to run unattended in a container.
fn baseline_chrome_args() -> Vec<String> {
    [
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--no-first-run",
        "--window-size=1920,1080",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// The full anti-detection flag set. user-data-dir is set separately via
/// `BrowserConfig` to avoid a duplicate-flag conflict.
fn stealth_chrome_args() -> Vec<String> {
    let mut args = baseline_chrome_args();
    args.extend(
        [
            "--disable-blink-features=AutomationControlled",
            "--exclude-switches=enable-automation",
            "--disable-infobars",
            "--disable-features=IsolateOrigins,site-per-process",
            "--disable-site-isolation-trials",
            "--start-maximized",
            "--force-device-scale-factor=1",
            "--disable-accelerated-2d-canvas",
            "--no-zygote",
            "--disable-background-timer-throttling",
            "--disable-backgrounding-occluded-windows",
            "--disable-renderer-backgrounding",
            "--disable-ipc-flooding-protection",
            "--no-default-browser-check",
            "--disable-hang-monitor",
            "--disable-prompt-on-repost",
            "--disable-sync",
            "--disable-domain-reliability",
            "--disable-client-side-phishing-detection",
            "--disable-component-update",
            "--disable-default-apps",
            "--disable-extensions",
            "--disable-popup-blocking",
            "--disable-notifications",
            "--memory-pressure-off",
            "--enable-features=NetworkService,NetworkServiceInProcess",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args
}

/// Hide the usual headless tells before the first navigation.
async fn apply_stealth(page: &Page) -> Result<()> {
    let stealth_js = r#"
        Object.defineProperty(navigator, 'webdriver', {
            get: () => undefined
        });

        Object.defineProperty(navigator, 'plugins', {
            get: () => [1, 2, 3, 4, 5]
        });

        Object.defineProperty(navigator, 'languages', {
            get: () => ['en-US', 'en']
        });

        Object.defineProperty(navigator, 'hardwareConcurrency', {
            get: () => 4
        });

        window.chrome = { runtime: {} };

        delete navigator.__proto__.webdriver;
    "#;
    page.evaluate(stealth_js)
        .await
        .map_err(|e| BrowserError::Page(format!("stealth script failed: {e}")))?;

    let user_agents = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ];
    let user_agent = {
        let mut rng = rand::thread_rng();
        user_agents[rng.gen_range(0..user_agents.len())]
    };
    page.set_user_agent(user_agent)
        .await
        .map_err(|e| BrowserError::Page(format!("user agent override failed: {e}")))?;
    debug!("Stealth applied, user agent: {}", user_agent);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stealth_args_include_the_baseline() {
        let args = stealth_chrome_args();
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
    }

    #[test]
    fn no_duplicate_chrome_flags() {
        let args = stealth_chrome_args();
        let mut keys: Vec<&str> = args
            .iter()
            .map(|a| a.split('=').next().unwrap_or(a))
            .collect();
        keys.sort_unstable();
        let before = keys.len();
        keys.dedup();
        // --disable-features and --enable-features may repeat; everything
        // else must be unique.
        assert!(before - keys.len() <= 2, "duplicate flags: {args:?}");
    }
}
