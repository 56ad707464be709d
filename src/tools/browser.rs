//! Shared browser session
//!
//! One Chrome instance and one page, owned by a dedicated task. Everything
//! else talks to it through a cloneable [`BrowserHandle`].
//! Uses `chromiumoxide` for Chrome `DevTools` Protocol integration.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Configuration for the browser session
#[derive(Debug, Clone)]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable
    pub chrome_path: Option<PathBuf>,
    /// Run in headless mode
    pub headless: bool,
    /// Per-command timeout
    pub timeout: Duration,
    /// Window width
    pub width: u32,
    /// Window height
    pub height: u32,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            timeout: Duration::from_secs(30),
            width: 1280,
            height: 720,
        }
    }
}

enum Command {
    Navigate {
        url: String,
        reply: oneshot::Sender<Result<String>>,
    },
    PageHtml {
        reply: oneshot::Sender<Result<String>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable access to the shared browser session
#[derive(Debug, Clone)]
pub struct BrowserHandle {
    tx: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Navigate { url, .. } => f.debug_struct("Navigate").field("url", url).finish(),
            Self::PageHtml { .. } => f.write_str("PageHtml"),
            Self::Close { .. } => f.write_str("Close"),
        }
    }
}

impl BrowserHandle {
    /// Navigate the shared page; returns the page title
    ///
    /// # Errors
    ///
    /// Returns error if the session is gone or navigation fails
    pub async fn navigate(&self, url: &str) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Navigate {
            url: url.to_string(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| Error::Browser("browser session ended".to_string()))?
    }

    /// HTML of the current page
    ///
    /// # Errors
    ///
    /// Returns error if the session is gone or the page can't be read
    pub async fn page_html(&self) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PageHtml { reply }).await?;
        rx.await
            .map_err(|_| Error::Browser("browser session ended".to_string()))?
    }

    /// Close the browser and wait for the session to end
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Close { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::Browser("browser is not running".to_string()))
    }
}

/// Launch Chrome and start the session task
///
/// # Errors
///
/// Returns error if the browser fails to launch
pub async fn launch(config: BrowserSessionConfig) -> Result<(BrowserHandle, JoinHandle<()>)> {
    let mut builder = BrowserConfig::builder();

    if !config.headless {
        builder = builder.with_head();
    }

    builder = builder
        .window_size(config.width, config.height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage");

    if let Some(ref chrome_path) = config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    let browser_config = builder
        .build()
        .map_err(|e| Error::Browser(format!("config error: {e}")))?;

    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| Error::Browser(format!("launch failed: {e}")))?;

    let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| Error::Browser(format!("new page failed: {e}")))?;

    tracing::info!(headless = config.headless, "browser launched");

    let (tx, rx) = mpsc::channel(16);
    let session = tokio::spawn(run_session(browser, page, handler_task, rx, config.timeout));

    Ok((BrowserHandle { tx }, session))
}

async fn run_session(
    mut browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    mut rx: mpsc::Receiver<Command>,
    timeout: Duration,
) {
    let mut close_reply = None;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Navigate { url, reply } => {
                let result = with_timeout(timeout, navigate(&page, &url)).await;
                let _ = reply.send(result);
            }
            Command::PageHtml { reply } => {
                let result = with_timeout(timeout, async {
                    page.content()
                        .await
                        .map_err(|e| Error::Browser(format!("get content failed: {e}")))
                })
                .await;
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                close_reply = Some(reply);
                break;
            }
        }
    }

    if let Err(e) = browser.close().await {
        tracing::debug!(error = %e, "browser close failed");
    }
    let _ = browser.wait().await;
    handler_task.abort();
    tracing::info!("browser closed");

    if let Some(reply) = close_reply {
        let _ = reply.send(());
    }
}

async fn navigate(page: &Page, url: &str) -> Result<String> {
    page.goto(url)
        .await
        .map_err(|e| Error::Browser(format!("navigation to {url} failed: {e}")))?;

    let title = page.get_title().await.ok().flatten().unwrap_or_default();
    tracing::debug!(url, title, "navigated");
    Ok(title)
}

async fn with_timeout<F>(timeout: Duration, fut: F) -> Result<String>
where
    F: std::future::Future<Output = Result<String>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Browser(format!("timed out after {}s", timeout.as_secs())))?
}
