//! Inline local files referenced by the template.
//!
//! CSS `url(...)` references and `<img src="...">` attributes pointing at
//! files under the asset root are rewritten to base64 data URIs, so the
//! browser never has to resolve relative paths. Anything that cannot be
//! resolved is left byte-for-byte as it was.

use crate::template::contains_placeholder;
use base64::Engine as Base64Engine;
use log::debug;
use regex::Regex;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Directories searched, in order, for a relative reference.
const SEARCH_PREFIXES: &[&str] = &["", "./", "images/", "assets/"];

fn css_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#).expect("css url pattern is valid")
    })
}

fn img_src_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)<img\b[^>]*?\ssrc\s*=\s*["']([^"']+)["']"#)
            .expect("img src pattern is valid")
    })
}

/// Rewrites local references in a template to data URIs.
#[derive(Debug, Clone)]
pub struct AssetEmbedder {
    root: PathBuf,
}

impl AssetEmbedder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Return `html` with every resolvable local reference inlined.
    pub async fn embed_local_assets(&self, html: &str) -> String {
        let mut refs: Vec<Range<usize>> = css_url_pattern()
            .captures_iter(html)
            .chain(img_src_pattern().captures_iter(html))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.range())
            .collect();
        refs.sort_by_key(|r| r.start);
        refs.dedup_by(|next, prev| next.start < prev.end);

        let mut out = String::with_capacity(html.len());
        let mut cursor = 0;
        for range in refs {
            let reference = &html[range.clone()];
            if let Some(uri) = self.inline_reference(reference).await {
                out.push_str(&html[cursor..range.start]);
                out.push_str(&uri);
                cursor = range.end;
            }
        }
        out.push_str(&html[cursor..]);
        out
    }

    /// Data URI for one reference, or `None` when it should stay as written.
    pub async fn inline_reference(&self, reference: &str) -> Option<String> {
        if is_external(reference) || contains_placeholder(reference) {
            return None;
        }
        let path = self.locate(reference).await?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Inlined {} ({} bytes)", path.display(), bytes.len());
                Some(format!(
                    "data:{};base64,{}",
                    mime_for_path(&path),
                    base64::engine::general_purpose::STANDARD.encode(bytes)
                ))
            }
            Err(e) => {
                debug!("Could not read {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn locate(&self, reference: &str) -> Option<PathBuf> {
        let relative = reference
            .split(['?', '#'])
            .next()
            .unwrap_or(reference)
            .trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }
        for prefix in SEARCH_PREFIXES {
            let candidate = self.root.join(format!("{}{}", prefix, relative));
            if let Ok(meta) = tokio::fs::metadata(&candidate).await {
                if meta.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

fn is_external(reference: &str) -> bool {
    let lower = reference.trim().to_ascii_lowercase();
    lower.starts_with("http:")
        || lower.starts_with("https:")
        || lower.starts_with("data:")
        || lower.starts_with("//")
        || lower.starts_with('#')
}

/// MIME type inferred from a file extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "svg" => "image/svg+xml",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => "application/octet-stream",
    }
}
