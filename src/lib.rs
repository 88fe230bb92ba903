//! Avis poster service
//!
//! Fills an HTML announcement template with form data and rasterizes it with
//! a headless browser.
//!
//! # Pipeline
//!
//! 1. [`embed::AssetEmbedder`] inlines local files referenced by the template
//! 2. [`resolver::ImageResolver`] turns the photo reference into a data URI
//! 3. [`template::render`] substitutes the `{{field}}` placeholders
//! 4. a [`capture::PosterRenderer`] captures the poster as PNG or JPEG
//!
//! [`server`] wires the stages behind `POST /generateAvis`.
//!
//! # Example
//!
//! ```no_run
//! use avis_poster::{template, PosterFields, Substitution};
//!
//! let fields = PosterFields::new().with("prenom", "Jean").with("nom", "Dupont");
//! let html = template::render("<h1>{{prenom}} {{ nom }}</h1>", &fields, Substitution::Raw);
//! assert_eq!(html, "<h1>Jean Dupont</h1>");
//! ```

use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod capture;
pub mod config;
pub mod debug_sink;
pub mod embed;
pub mod fields;
pub mod resolver;
pub mod server;
pub mod template;

pub use capture::{CaptureResult, PosterRenderer};
pub use fields::PosterFields;
pub use resolver::{EmbeddedImage, ImageResolver};
pub use template::Substitution;

#[cfg(feature = "cdp")]
pub use capture::ChromeCapture;

/// Rendering and fetching settings shared by the pipeline stages.
///
/// The defaults reproduce the production poster: a 1200x1800 PNG cropped to
/// the `#poster` element.
///
/// # Examples
///
/// ```
/// let cfg = avis_poster::PosterConfig::default();
/// assert_eq!(cfg.viewport.width, 1200);
/// assert_eq!(cfg.viewport.height, 1800);
/// ```
#[derive(Debug, Clone)]
pub struct PosterConfig {
    /// Viewport the poster is laid out in
    pub viewport: Viewport,
    /// Image format of the capture
    pub format: ImageFormat,
    /// CSS selector of the poster container
    pub poster_selector: String,
    /// Explicit browser executable, tried before any discovery
    pub chrome_path: Option<std::path::PathBuf>,
    /// Upper bound for each browser operation
    pub render_timeout: Duration,
    /// User agent sent when fetching photos
    pub user_agent: String,
    /// Timeout for each photo fetch
    pub fetch_timeout: Duration,
    /// Largest remote body the image resolver accepts
    pub max_image_bytes: usize,
    /// How field values are written into the template
    pub substitution: Substitution,
}

impl Default for PosterConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            format: ImageFormat::Png,
            poster_selector: "#poster".to_string(),
            chrome_path: None,
            render_timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36".to_string(),
            fetch_timeout: Duration::from_secs(8),
            max_image_bytes: 10 * 1024 * 1024,
            substitution: Substitution::Raw,
        }
    }
}

/// Viewport dimensions, always rendered at a device scale factor of 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 1800,
        }
    }
}

/// Raster format produced by the capture stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg { quality: u32 },
}

impl ImageFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg { .. } => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg { .. } => "jpg",
        }
    }
}
