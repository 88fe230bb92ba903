//! Command-line and environment configuration for the service.

use crate::{Error, ImageFormat, PosterConfig, Result, Substitution, Viewport};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Every flag can also be given through the named environment variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "avis-poster", version, about = "Render announcement posters from form data")]
pub struct Config {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory holding the template and its local assets
    #[arg(long, env = "ASSET_ROOT", default_value = ".")]
    pub asset_root: PathBuf,

    /// Template file, relative to the asset root
    #[arg(long, env = "TEMPLATE_FILE", default_value = "template.html")]
    pub template: PathBuf,

    /// Where the latest poster is copied; empty disables the copy.
    /// Defaults to `/tmp/avis_debug.<ext>` for the configured format.
    #[arg(long, env = "DEBUG_OUTPUT")]
    pub debug_output: Option<String>,

    /// Browser executable to prefer over discovery
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// CSS selector of the poster container
    #[arg(long, env = "POSTER_SELECTOR", default_value = "#poster")]
    pub poster_selector: String,

    /// Output format: png or jpeg
    #[arg(long, env = "POSTER_FORMAT", default_value = "png")]
    pub format: String,

    #[arg(long, env = "JPEG_QUALITY", default_value_t = 90)]
    pub jpeg_quality: u32,

    /// Timeout for each photo fetch, in milliseconds
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value_t = 8000)]
    pub fetch_timeout_ms: u64,

    /// Largest remote photo or page accepted, in bytes
    #[arg(long, env = "MAX_IMAGE_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_image_bytes: usize,

    /// Upper bound for each browser operation, in milliseconds
    #[arg(long, env = "RENDER_TIMEOUT_MS", default_value_t = 30000)]
    pub render_timeout_ms: u64,

    /// HTML-escape field values before substitution
    #[arg(long, env = "ESCAPE_FIELDS", default_value_t = false)]
    pub escape_fields: bool,
}

impl Config {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address {}:{}: {}", self.host, self.port, e)))
    }

    pub fn template_path(&self) -> PathBuf {
        self.asset_root.join(&self.template)
    }

    pub fn debug_output_path(&self) -> Option<PathBuf> {
        match self.debug_output.as_deref().map(str::trim) {
            Some("") => None,
            Some(path) => Some(PathBuf::from(path)),
            None => {
                let ext = self.image_format().map(|f| f.extension()).unwrap_or("png");
                Some(PathBuf::from(format!("/tmp/avis_debug.{}", ext)))
            }
        }
    }

    pub fn image_format(&self) -> Result<ImageFormat> {
        match self.format.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => {
                if !(1..=100).contains(&self.jpeg_quality) {
                    return Err(Error::Config(format!(
                        "JPEG quality must be within 1..=100, got {}",
                        self.jpeg_quality
                    )));
                }
                Ok(ImageFormat::Jpeg {
                    quality: self.jpeg_quality,
                })
            }
            other => Err(Error::Config(format!("unsupported poster format {:?}", other))),
        }
    }

    pub fn poster_config(&self) -> Result<PosterConfig> {
        if self.poster_selector.trim().is_empty() {
            return Err(Error::Config("poster selector must not be empty".into()));
        }
        Ok(PosterConfig {
            viewport: Viewport::default(),
            format: self.image_format()?,
            poster_selector: self.poster_selector.clone(),
            chrome_path: self.chrome_path.clone(),
            render_timeout: Duration::from_millis(self.render_timeout_ms),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
            max_image_bytes: self.max_image_bytes,
            substitution: if self.escape_fields {
                Substitution::Escaped
            } else {
                Substitution::Raw
            },
            ..PosterConfig::default()
        })
    }
}
