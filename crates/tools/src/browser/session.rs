//! Chrome/Edge session driven over CDP.
//!
//! The browser process is launched with a remote-debugging port; windows are
//! CDP page targets discovered through the `/json/*` HTTP endpoints, and the
//! session keeps one WebSocket attached to the active target.

use super::cdp::CdpClient;
use super::{Browser, ElementRef, TabHandle};
use async_trait::async_trait;
use flightbot_core::config::Config;
use flightbot_core::{Error, Paths, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const NAVIGATION_GRACE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserEngine {
    Chrome,
    Edge,
}

impl BrowserEngine {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chrome" | "chromium" => Some(Self::Chrome),
            "edge" | "msedge" => Some(Self::Edge),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Edge => "edge",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub engine: BrowserEngine,
    pub headless: bool,
    pub user_data_dir: PathBuf,
    pub implicit_wait: Duration,
    pub page_load_timeout: Duration,
}

impl LaunchOptions {
    pub fn from_config(config: &Config, paths: &Paths) -> Self {
        let user_data_dir = config
            .browser
            .profile_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.sessions_dir().join("explore"));
        Self {
            engine: BrowserEngine::parse(&config.browser.engine).unwrap_or(BrowserEngine::Chrome),
            headless: config.headless,
            user_data_dir,
            implicit_wait: config.browser.implicit_wait(),
            page_load_timeout: config.browser.page_load_timeout(),
        }
    }
}

pub struct ChromeSession {
    debug_port: u16,
    process: Child,
    http: reqwest::Client,
    /// `None` between `close_window` and the next `switch_to`.
    cdp: Option<CdpClient>,
    current: Option<TabHandle>,
    implicit_wait: Duration,
    page_load_timeout: Duration,
}

impl ChromeSession {
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let browser_path = find_browser_binary(options.engine).ok_or_else(|| {
            Error::Browser(format!("{} not found. Please install it.", options.engine.name()))
        })?;

        std::fs::create_dir_all(&options.user_data_dir)?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, &options.user_data_dir, options.headless);

        info!(
            port = debug_port,
            headless = options.headless,
            browser = options.engine.name(),
            "Launching browser"
        );

        let process = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", options.engine.name(), e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Browser(format!("HTTP client: {}", e)))?;

        wait_for_cdp_ready(&http, debug_port, Duration::from_secs(15)).await?;
        let first_page = first_page_target(&http, debug_port).await?;

        let mut session = Self {
            debug_port,
            process,
            http,
            cdp: None,
            current: None,
            implicit_wait: options.implicit_wait,
            page_load_timeout: options.page_load_timeout,
        };
        session.attach(&first_page).await?;

        info!(target_id = %first_page, "CDP connection established");
        Ok(session)
    }

    /// Close the browser and wait for the process to exit.
    pub async fn quit(mut self) {
        self.cdp = None;
        if let Err(e) = self.process.kill().await {
            debug!("browser process kill failed (may already be gone): {}", e);
        }
    }

    async fn attach(&mut self, handle: &TabHandle) -> Result<()> {
        let ws_url = target_ws_url(&self.http, self.debug_port, handle.as_str()).await?;
        let cdp = CdpClient::connect(&ws_url).await.map_err(cdp_err)?;
        cdp.enable_domain("Page").await.map_err(cdp_err)?;
        cdp.enable_domain("Runtime").await.map_err(cdp_err)?;
        // Bring it to front so focus-dependent widgets behave.
        if let Err(e) = cdp.activate_target(handle.as_str()).await {
            debug!(target_id = %handle, "activateTarget failed: {}", e);
        }
        self.cdp = Some(cdp);
        self.current = Some(handle.clone());
        Ok(())
    }

    fn cdp(&self) -> Result<&CdpClient> {
        self.cdp
            .as_ref()
            .ok_or_else(|| Error::Browser("no active window; switch to a window first".into()))
    }

    async fn count(&self, locator: &str) -> Result<usize> {
        let js = format!("{}.snapshotLength", snapshot_js(locator));
        let value = self.cdp()?.evaluate(&js).await.map_err(cdp_err)?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    /// Poll until at least one match or `timeout`; returns the last count.
    async fn poll_count(&self, locator: &str, timeout: Duration) -> Result<usize> {
        let start = Instant::now();
        loop {
            let n = self.count(locator).await?;
            if n > 0 || start.elapsed() >= timeout {
                return Ok(n);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Run `body` against the `index`-th match; `body` sees the node as `el`
    /// and returns the value to hand back.
    async fn on_node(&self, locator: &str, index: usize, body: &str) -> Result<Value> {
        let js = format!(
            "(function() {{ var el = {}.snapshotItem({}); if (!el) return {{found: false}}; \
             return {{found: true, value: (function(el) {{ {} }})(el)}}; }})()",
            snapshot_js(locator),
            index,
            body
        );
        let result = self.cdp()?.evaluate(&js).await.map_err(cdp_err)?;
        if result.get("found").and_then(|v| v.as_bool()) != Some(true) {
            return Err(Error::ElementNotFound(format!("{} [{}]", locator, index)));
        }
        Ok(result.get("value").cloned().unwrap_or(Value::Null))
    }

    /// First match after the implicit wait.
    async fn on_first(&self, locator: &str, body: &str) -> Result<Value> {
        if self.poll_count(locator, self.implicit_wait).await? == 0 {
            return Err(Error::ElementNotFound(locator.to_string()));
        }
        self.on_node(locator, 0, body).await
    }

    async fn wait_for_load(&self) -> Result<()> {
        tokio::time::sleep(NAVIGATION_GRACE).await;
        let start = Instant::now();
        loop {
            // Evaluation can fail while the old document is being torn down.
            if let Ok(state) = self.cdp()?.evaluate("document.readyState").await {
                if state.as_str() == Some("complete") {
                    return Ok(());
                }
            }
            if start.elapsed() >= self.page_load_timeout {
                return Err(Error::Timeout(format!(
                    "page did not finish loading within {}s",
                    self.page_load_timeout.as_secs()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn key_press(&self, key: &str, code: &str, modifiers: i32) -> Result<()> {
        let cdp = self.cdp()?;
        cdp.dispatch_key_event("keyDown", key, code, modifiers)
            .await
            .map_err(cdp_err)?;
        cdp.dispatch_key_event("keyUp", key, code, modifiers)
            .await
            .map_err(cdp_err)?;
        Ok(())
    }
}

#[async_trait]
impl Browser for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!(url, "navigate");
        self.cdp()?.navigate(url).await.map_err(cdp_err)?;
        self.wait_for_load().await
    }

    async fn find_all(&mut self, locator: &str) -> Result<Vec<ElementRef>> {
        let n = self.poll_count(locator, self.implicit_wait).await?;
        Ok((0..n).map(|i| ElementRef::new(locator, i)).collect())
    }

    async fn wait_for(&mut self, locator: &str, timeout: Duration) -> Result<()> {
        if self.poll_count(locator, timeout).await? == 0 {
            return Err(Error::Timeout(format!(
                "{} not present after {}s",
                locator,
                timeout.as_secs()
            )));
        }
        Ok(())
    }

    async fn click(&mut self, locator: &str) -> Result<()> {
        self.on_first(
            locator,
            "el.scrollIntoView({block: 'center'}); el.click(); return true;",
        )
        .await?;
        Ok(())
    }

    async fn is_selected(&mut self, locator: &str) -> Result<bool> {
        let value = self
            .on_first(
                locator,
                "return !!(el.checked || el.selected || \
                 el.getAttribute('aria-checked') === 'true' || \
                 el.getAttribute('aria-pressed') === 'true');",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn read_text(&mut self, element: &ElementRef) -> Result<String> {
        let value = self
            .on_node(
                element.locator(),
                element.index(),
                "return el.innerText !== undefined ? el.innerText : el.textContent;",
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn read_attribute(
        &mut self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>> {
        let body = format!(
            "var v = el[{name}]; if (typeof v !== 'string') v = el.getAttribute({name}); return v;",
            name = js_string(name)
        );
        let value = self
            .on_node(element.locator(), element.index(), &body)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn input_value(&mut self, locator: &str) -> Result<String> {
        let value = self.on_first(locator, "return el.value || '';").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn clear_input(&mut self, locator: &str) -> Result<()> {
        self.on_first(locator, "el.focus(); if (el.select) el.select(); return true;")
            .await?;
        // Ctrl+A, Delete: some autocomplete widgets ignore programmatic value changes.
        self.key_press("a", "KeyA", 2).await?;
        self.key_press("Delete", "Delete", 0).await?;
        self.on_first(
            locator,
            "if (el.value) { el.value = ''; \
             el.dispatchEvent(new Event('input', {bubbles: true})); \
             el.dispatchEvent(new Event('change', {bubbles: true})); } return true;",
        )
        .await?;
        Ok(())
    }

    async fn type_text(&mut self, locator: &str, text: &str) -> Result<()> {
        self.on_first(locator, "el.focus(); return true;").await?;
        self.cdp()?.insert_text(text).await.map_err(cdp_err)
    }

    async fn window_handles(&mut self) -> Result<Vec<TabHandle>> {
        let targets = list_targets(&self.http, self.debug_port).await?;
        Ok(page_handles(&targets))
    }

    async fn current_window(&mut self) -> Result<TabHandle> {
        self.current
            .clone()
            .ok_or_else(|| Error::Browser("no active window".into()))
    }

    async fn switch_to(&mut self, handle: &TabHandle) -> Result<()> {
        if self.current.as_ref() == Some(handle) && self.cdp.is_some() {
            return Ok(());
        }
        debug!(target_id = %handle, "switching window");
        self.cdp = None;
        self.attach(handle).await
    }

    async fn close_window(&mut self) -> Result<()> {
        let handle = self
            .current
            .take()
            .ok_or_else(|| Error::Browser("no active window to close".into()))?;
        self.cdp = None;
        let url = format!("http://127.0.0.1:{}/json/close/{}", self.debug_port, handle);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Browser(format!("close {}: {}", handle, e)))?;
        debug!(target_id = %handle, "window closed");
        Ok(())
    }

    async fn back(&mut self) -> Result<()> {
        self.cdp()?.evaluate("history.back()").await.map_err(cdp_err)?;
        self.wait_for_load().await
    }

    async fn refresh(&mut self) -> Result<()> {
        self.cdp()?.reload().await.map_err(cdp_err)?;
        self.wait_for_load().await
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

fn cdp_err(e: String) -> Error {
    Error::Browser(format!("CDP: {}", e))
}

/// Quote `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn snapshot_js(locator: &str) -> String {
    format!(
        "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null)",
        js_string(locator)
    )
}

fn build_browser_args(debug_port: u16, user_data_dir: &Path, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--disable-popup-blocking".to_string(),
        "--password-store=basic".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push("--window-size=1440,900".to_string());
    args.push("about:blank".to_string());
    args
}

pub fn find_browser_binary(engine: BrowserEngine) -> Option<String> {
    let candidates = match engine {
        BrowserEngine::Chrome => {
            if cfg!(target_os = "macos") {
                vec![
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                    "/Applications/Chromium.app/Contents/MacOS/Chromium",
                ]
            } else if cfg!(target_os = "linux") {
                vec![
                    "google-chrome",
                    "google-chrome-stable",
                    "chromium",
                    "chromium-browser",
                ]
            } else {
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ]
            }
        }
        BrowserEngine::Edge => {
            if cfg!(target_os = "macos") {
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"]
            } else if cfg!(target_os = "linux") {
                vec!["microsoft-edge", "microsoft-edge-stable"]
            } else {
                vec![
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                ]
            }
        }
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        let bare = !candidate.contains('/') && !candidate.contains('\\');
        if bare {
            if let Ok(path) = which::which(candidate) {
                return Some(path.display().to_string());
            }
        }
    }
    None
}

pub fn list_available_browsers() -> Vec<(BrowserEngine, String)> {
    [BrowserEngine::Chrome, BrowserEngine::Edge]
        .into_iter()
        .filter_map(|engine| find_browser_binary(engine).map(|path| (engine, path)))
        .collect()
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Poll `/json/version` until the DevTools endpoint answers.
async fn wait_for_cdp_ready(http: &reqwest::Client, port: u16, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);
    loop {
        if let Ok(resp) = http.get(&url).send().await {
            if let Ok(body) = resp.json::<Value>().await {
                if body.get("webSocketDebuggerUrl").is_some() {
                    return Ok(());
                }
            }
        }
        if start.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "browser DevTools endpoint not ready after {}s on port {}",
                timeout.as_secs(),
                port
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn list_targets(http: &reqwest::Client, port: u16) -> Result<Vec<Value>> {
    let url = format!("http://127.0.0.1:{}/json/list", port);
    let resp = http
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Browser(format!("target list: {}", e)))?;
    resp.json::<Vec<Value>>()
        .await
        .map_err(|e| Error::Browser(format!("target list: {}", e)))
}

/// `/json/list` reports the newest target first; handles come back oldest first.
fn page_handles(targets: &[Value]) -> Vec<TabHandle> {
    let mut handles: Vec<TabHandle> = targets
        .iter()
        .filter(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
        .filter_map(|t| t.get("id").and_then(|v| v.as_str()))
        .map(TabHandle::new)
        .collect();
    handles.reverse();
    handles
}

async fn first_page_target(http: &reqwest::Client, port: u16) -> Result<TabHandle> {
    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(targets) = list_targets(http, port).await else {
            continue;
        };
        let page = targets
            .iter()
            .find(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
            .and_then(|t| t.get("id").and_then(|v| v.as_str()));
        if let Some(id) = page {
            return Ok(TabHandle::new(id));
        }
    }
    Err(Error::Browser("No page target found after retries".into()))
}

async fn target_ws_url(http: &reqwest::Client, port: u16, target_id: &str) -> Result<String> {
    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(targets) = list_targets(http, port).await else {
            continue;
        };
        let ws_url = targets
            .iter()
            .find(|t| t.get("id").and_then(|v| v.as_str()) == Some(target_id))
            .and_then(|t| t.get("webSocketDebuggerUrl").and_then(|v| v.as_str()));
        if let Some(ws_url) = ws_url {
            return Ok(ws_url.to_string());
        }
    }
    Err(Error::Browser(format!(
        "No WebSocket URL found for target '{}' after retries",
        target_id
    )))
}
