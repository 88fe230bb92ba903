//! Photo resolution: turn a photo reference into an inline data URI.
//!
//! The resolver never fails. Whatever goes wrong (timeout, refused
//! connection, unexpected content type, oversized body, exhausted hop budget)
//! it answers `None` and the caller keeps the raw reference instead.

use crate::{Error, PosterConfig, Result};
use base64::Engine as Base64Engine;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::future::Future;
use std::pin::Pin;

/// Deepest recursion allowed: a page may point at one image, nothing more.
pub const MAX_DEPTH: u32 = 1;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "avif", "bmp"];

/// An image held in memory, ready to be written as `data:<mime>;base64,...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub mime: String,
    pub data: Vec<u8>,
}

impl EmbeddedImage {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    /// Parse an existing `data:image/...;base64,` URI.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let mime = meta.strip_suffix(";base64")?;
        if !mime.to_ascii_lowercase().starts_with("image/") {
            return None;
        }
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?;
        Some(Self::new(mime, data))
    }

    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Option<EmbeddedImage>> + Send + 'a>>;

/// Fetches photos over HTTP(S) with a browser-like user agent.
#[derive(Clone)]
pub struct ImageResolver {
    client: Client,
    max_bytes: usize,
}

impl ImageResolver {
    pub fn new(config: &PosterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_bytes: config.max_image_bytes,
        })
    }

    /// Resolve a photo reference. Empty or missing references resolve to
    /// `None` without touching the network.
    pub async fn resolve(&self, url: Option<&str>) -> Option<EmbeddedImage> {
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;
        self.resolve_at_depth(url, 0).await
    }

    /// Resolve `url` as if reached after `depth` page hops.
    pub fn resolve_at_depth<'a>(&'a self, url: &'a str, depth: u32) -> ResolveFuture<'a> {
        Box::pin(async move {
            if url.is_empty() || depth > MAX_DEPTH {
                return None;
            }
            if url.starts_with("data:") {
                return EmbeddedImage::from_data_uri(url);
            }

            let (content_type, body) = match self.fetch(url).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!("Photo fetch failed for {}: {}", url, e);
                    return None;
                }
            };

            if content_type.starts_with("image/") {
                return Some(EmbeddedImage::new(content_type, body));
            }

            if content_type.starts_with("text/html") {
                let html = String::from_utf8_lossy(&body);
                let candidate = extract_image_candidate(&html)?;
                let next = join_url(url, &candidate)?;
                debug!("Following page image {} found on {}", next, url);
                return self.resolve_at_depth(&next, depth + 1).await;
            }

            debug!("Ignoring {} with content type {:?}", url, content_type);
            None
        })
    }

    /// GET `url`, returning the media type (lowercased, parameters stripped)
    /// and the body.
    async fn fetch(&self, url: &str) -> std::result::Result<(String, Vec<u8>), String> {
        let mut resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("status {}", resp.status()));
        }
        if let Some(len) = resp.content_length() {
            if len > self.max_bytes as u64 {
                return Err(format!("body of {} bytes exceeds limit", len));
            }
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(media_type)
            .unwrap_or_default();

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| e.to_string())? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(format!("body exceeds {} bytes", self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        Ok((content_type, body))
    }
}

fn media_type(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Resolve `candidate` against `base`, turning relative paths absolute.
pub fn join_url(base: &str, candidate: &str) -> Option<String> {
    match url::Url::parse(base) {
        Ok(base) => base.join(candidate).ok().map(|u| u.to_string()),
        Err(_) => url::Url::parse(candidate).ok().map(|u| u.to_string()),
    }
}

/// Find the most likely poster photo referenced by an HTML page.
///
/// Rules, first match wins: `og:image` meta, `twitter:image` meta,
/// `<link rel="image_src">`, the first `<img>` whose src has an image
/// extension, then the first `<img>` at all.
pub fn extract_image_candidate(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let metas = select_all(&document, "meta");
    let meta_content = |key: &str| {
        metas.iter().find_map(|m| {
            let named = ["property", "name"].iter().any(|attr| {
                m.value()
                    .attr(attr)
                    .map(|v| v.trim().eq_ignore_ascii_case(key))
                    .unwrap_or(false)
            });
            if named {
                non_empty_attr(m, "content")
            } else {
                None
            }
        })
    };

    if let Some(found) = meta_content("og:image") {
        return Some(found);
    }
    if let Some(found) = meta_content("twitter:image") {
        return Some(found);
    }

    let image_src = select_all(&document, "link").into_iter().find_map(|l| {
        let rel = l.value().attr("rel")?;
        if rel
            .split_whitespace()
            .any(|r| r.eq_ignore_ascii_case("image_src"))
        {
            non_empty_attr(&l, "href")
        } else {
            None
        }
    });
    if image_src.is_some() {
        return image_src;
    }

    let sources: Vec<String> = select_all(&document, "img")
        .iter()
        .filter_map(|img| non_empty_attr(img, "src"))
        .collect();
    sources
        .iter()
        .find(|src| has_image_extension(src))
        .or_else(|| sources.first())
        .cloned()
}

fn select_all<'a>(document: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(sel) => document.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

fn non_empty_attr(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn has_image_extension(src: &str) -> bool {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    path.rsplit_once('.')
        .map(|(_, ext)| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
