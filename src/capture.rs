//! Poster rasterization.
//!
//! [`PosterRenderer`] is the seam between the request pipeline and the
//! browser. [`ChromeCapture`] drives headless Chrome over the DevTools
//! Protocol; tests substitute their own renderer.

use crate::{Error, ImageFormat, Result};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

#[cfg(feature = "cdp")]
pub use chrome::{resolve_executable, ChromeCapture};

/// Which capture strategy produced the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategy {
    /// Exact bounds of the poster container
    Element,
    /// Fixed viewport-sized clip from the origin
    Clip,
    /// The whole scrollable document, after the other strategies failed
    FullPage,
}

/// Raw image bytes produced for one request
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub strategy: CaptureStrategy,
}

impl CaptureResult {
    /// First bytes of the image as hex, for diagnostics.
    pub fn magic(&self) -> String {
        self.bytes
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

/// Turns a fully substituted HTML document into an image.
///
/// Implementations are blocking; use [`capture_async`] from async code.
pub trait PosterRenderer: Send + Sync {
    fn capture(&self, html: &str) -> Result<CaptureResult>;
}

/// Run `renderer` on a dedicated worker thread and await its answer.
///
/// Gives up with [`Error::Timeout`] after `limit`; the worker still runs to
/// completion and releases its browser on its own.
pub async fn capture_async(
    renderer: Arc<dyn PosterRenderer>,
    html: String,
    limit: Duration,
) -> Result<CaptureResult> {
    let (tx, rx) = oneshot::channel::<Result<CaptureResult>>();

    thread::Builder::new()
        .name("poster-capture".to_string())
        .spawn(move || {
            let res = renderer.capture(&html);
            let _ = tx.send(res);
        })?;

    match tokio::time::timeout(limit, rx).await {
        Ok(res) => res.map_err(|e| Error::Render(format!("Capture worker vanished: {}", e)))?,
        Err(_) => Err(Error::Timeout(limit.as_millis() as u64)),
    }
}

#[cfg(feature = "cdp")]
mod chrome {
    use super::{CaptureResult, CaptureStrategy, PosterRenderer};
    use crate::{Error, ImageFormat, PosterConfig, Result};
    use base64::Engine as Base64Engine;
    use headless_chrome::browser::tab::Tab;
    use headless_chrome::protocol::cdp::Page;
    use headless_chrome::{Browser, LaunchOptions};
    use log::{debug, info, warn};
    use serde::Deserialize;
    use std::ffi::OsStr;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Well-known install locations tried after managed discovery fails.
    const SYSTEM_EXECUTABLES: &[&str] = &[
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
    ];

    /// Pick the browser binary: explicit path, then managed discovery, then
    /// well-known system paths. `None` leaves the choice to the launcher.
    pub fn resolve_executable(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Some(path.to_path_buf());
            }
            warn!("Configured browser {} does not exist", path.display());
        }
        match headless_chrome::browser::default_executable() {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("Managed browser discovery failed: {}", e);
                SYSTEM_EXECUTABLES
                    .iter()
                    .map(PathBuf::from)
                    .find(|p| p.exists())
            }
        }
    }

    #[derive(Debug, Deserialize)]
    struct Bounds {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    }

    #[derive(Debug, Deserialize)]
    struct Lookup {
        error: String,
    }

    #[derive(Debug, Deserialize)]
    struct ContentSize {
        width: f64,
        height: f64,
    }

    /// Headless Chrome renderer. Each capture launches its own browser
    /// process and tears it down before returning.
    #[derive(Debug, Clone)]
    pub struct ChromeCapture {
        config: PosterConfig,
        executable: Option<PathBuf>,
    }

    impl ChromeCapture {
        pub fn new(config: PosterConfig) -> Self {
            let executable = resolve_executable(config.chrome_path.as_deref());
            info!(
                "Using browser executable at: {}",
                executable
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "default resolution".to_string())
            );
            Self { config, executable }
        }

        fn launch(&self) -> Result<Browser> {
            let viewport = self.config.viewport;
            let args: Vec<&OsStr> = vec![
                OsStr::new("--disable-setuid-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--hide-scrollbars"),
                OsStr::new("--force-device-scale-factor=1"),
            ];
            let launch_options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .window_size(Some((viewport.width, viewport.height)))
                .path(self.executable.clone())
                .args(args)
                .idle_browser_timeout(self.config.render_timeout * 2)
                .build()
                .map_err(|e| Error::Launch(format!("Failed to build launch options: {}", e)))?;

            Browser::new(launch_options)
                .map_err(|e| Error::Launch(format!("Failed to launch browser: {}", e)))
        }

        fn open_tab(&self, browser: &Browser) -> Result<Arc<Tab>> {
            let tab = browser
                .new_tab()
                .map_err(|e| Error::Launch(format!("Failed to create tab: {}", e)))?;
            tab.set_default_timeout(self.config.render_timeout);
            Ok(tab)
        }

        fn load_document(&self, tab: &Tab, html: &str) -> Result<()> {
            tab.navigate_to("about:blank")
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| Error::Render(format!("Navigation failed: {}", e)))?;

            let literal = serde_json::to_string(html)
                .map_err(|e| Error::Render(format!("Failed to encode document: {}", e)))?;
            let script = format!(
                "(function(){{document.open();document.write({});document.close();return true;}})()",
                literal
            );
            tab.evaluate(&script, false)
                .map_err(|e| Error::Render(format!("Failed to set page content: {}", e)))?;
            Ok(())
        }

        /// Wait for the load event, every `<img>` and `document.fonts.ready`,
        /// bounded by the render timeout. Never fails the capture.
        fn wait_until_settled(&self, tab: &Tab) {
            let limit_ms = self.config.render_timeout.as_millis();
            let script = format!(
                r#"(async function(){{
                    const limit = new Promise(function(r){{ setTimeout(r, {limit_ms}); }});
                    const ready = (async function(){{
                        if (document.readyState !== 'complete') {{
                            await new Promise(function(r){{ window.addEventListener('load', r, {{ once: true }}); }});
                        }}
                        await Promise.all(Array.from(document.images).filter(function(i){{ return !i.complete; }}).map(function(i){{
                            return new Promise(function(r){{
                                i.addEventListener('load', r, {{ once: true }});
                                i.addEventListener('error', r, {{ once: true }});
                            }});
                        }}));
                        if (document.fonts) {{ await document.fonts.ready; }}
                    }})();
                    await Promise.race([ready, limit]);
                    return true;
                }})()"#
            );
            if let Err(e) = tab.evaluate(&script, true) {
                warn!("Waiting for page resources failed: {}", e);
            }
        }

        /// Bounds of the poster container in page coordinates, if present.
        fn poster_bounds(&self, tab: &Tab) -> Result<Option<Bounds>> {
            let selector = serde_json::to_string(&self.config.poster_selector)
                .map_err(|e| Error::Render(format!("Invalid selector: {}", e)))?;
            let script = format!(
                r#"(function(){{
                    let el;
                    try {{ el = document.querySelector({selector}); }}
                    catch (e) {{ return JSON.stringify({{ error: String(e) }}); }}
                    if (!el) return null;
                    const r = el.getBoundingClientRect();
                    return JSON.stringify({{ x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height }});
                }})()"#
            );
            let result = tab
                .evaluate(&script, false)
                .map_err(|e| Error::Render(format!("Poster lookup failed: {}", e)))?;

            match result.value.as_ref().and_then(|v| v.as_str()) {
                Some(raw) => {
                    if let Ok(Lookup { error }) = serde_json::from_str::<Lookup>(raw) {
                        return Err(Error::Render(format!("Poster lookup failed: {}", error)));
                    }
                    let bounds: Bounds = serde_json::from_str(raw)
                        .map_err(|e| Error::Render(format!("Bad poster bounds: {}", e)))?;
                    if bounds.width <= 0.0 || bounds.height <= 0.0 {
                        return Err(Error::Render("Poster container has no size".into()));
                    }
                    Ok(Some(bounds))
                }
                None => Ok(None),
            }
        }

        fn screenshot_format(&self) -> (Page::CaptureScreenshotFormatOption, Option<u32>) {
            match self.config.format {
                ImageFormat::Png => (Page::CaptureScreenshotFormatOption::Png, None),
                ImageFormat::Jpeg { quality } => {
                    (Page::CaptureScreenshotFormatOption::Jpeg, Some(quality))
                }
            }
        }

        fn screenshot(&self, tab: &Tab, clip: Page::Viewport) -> Result<Vec<u8>> {
            let (format, quality) = self.screenshot_format();
            tab.capture_screenshot(format, quality, Some(clip), true)
                .map_err(|e| Error::Render(format!("Screenshot failed: {}", e)))
        }

        /// Scrollable size of the document, never smaller than the viewport.
        fn content_size(&self, tab: &Tab) -> Result<ContentSize> {
            let script = r#"(function(){
                const d = document.documentElement;
                const b = document.body || d;
                return JSON.stringify({
                    width: Math.max(d.scrollWidth, b.scrollWidth, window.innerWidth),
                    height: Math.max(d.scrollHeight, b.scrollHeight, window.innerHeight)
                });
            })()"#;
            let result = tab
                .evaluate(script, false)
                .map_err(|e| Error::Render(format!("Measuring page failed: {}", e)))?;
            let raw = result
                .value
                .as_ref()
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::Render("Measuring page returned nothing".into()))?;
            serde_json::from_str(raw).map_err(|e| Error::Render(format!("Bad page size: {}", e)))
        }

        /// The whole document, including whatever lies below the viewport.
        fn full_page_screenshot(&self, tab: &Tab) -> Result<Vec<u8>> {
            let size = self.content_size(tab)?;
            let (format, quality) = self.screenshot_format();
            debug!("Full page capture of {}x{}", size.width, size.height);
            let data = tab
                .call_method(Page::CaptureScreenshot {
                    format: Some(format),
                    quality,
                    clip: Some(Page::Viewport {
                        x: 0.0,
                        y: 0.0,
                        width: size.width,
                        height: size.height,
                        scale: 1.0,
                    }),
                    from_surface: Some(true),
                    capture_beyond_viewport: Some(true),
                    optimize_for_speed: None,
                })
                .map_err(|e| Error::Render(format!("Full page screenshot failed: {}", e)))?
                .data;
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| Error::Render(format!("Screenshot was not base64: {}", e)))
        }

        /// Element bounds if the poster container exists, otherwise the
        /// fixed viewport clip.
        fn capture_preferred(&self, tab: &Tab) -> Result<(Vec<u8>, CaptureStrategy)> {
            match self.poster_bounds(tab)? {
                Some(b) => {
                    let clip = Page::Viewport {
                        x: b.x,
                        y: b.y,
                        width: b.width,
                        height: b.height,
                        scale: 1.0,
                    };
                    Ok((self.screenshot(tab, clip)?, CaptureStrategy::Element))
                }
                None => {
                    let viewport = self.config.viewport;
                    let clip = Page::Viewport {
                        x: 0.0,
                        y: 0.0,
                        width: viewport.width as f64,
                        height: viewport.height as f64,
                        scale: 1.0,
                    };
                    Ok((self.screenshot(tab, clip)?, CaptureStrategy::Clip))
                }
            }
        }

        fn capture_in(&self, browser: &Browser, html: &str) -> Result<CaptureResult> {
            let tab = self.open_tab(browser)?;
            self.load_document(&tab, html)?;
            self.wait_until_settled(&tab);

            let (bytes, strategy) = match self.capture_preferred(&tab) {
                Ok(captured) => captured,
                Err(e) => {
                    warn!("Poster capture failed, falling back to full page: {}", e);
                    (self.full_page_screenshot(&tab)?, CaptureStrategy::FullPage)
                }
            };

            let _ = tab.close(true);
            Ok(CaptureResult {
                bytes,
                format: self.config.format,
                strategy,
            })
        }
    }

    impl PosterRenderer for ChromeCapture {
        fn capture(&self, html: &str) -> Result<CaptureResult> {
            let browser = self.launch()?;
            let outcome = self.capture_in(&browser, html);
            // Dropping the browser kills the child process on every path.
            drop(browser);

            if let Ok(ref captured) = outcome {
                info!(
                    "Screenshot size: {} bytes, magic: {}, strategy: {:?}",
                    captured.bytes.len(),
                    captured.magic(),
                    captured.strategy
                );
            }
            outcome
        }
    }
}
