//! Error types for the poster pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a poster request.
///
/// Recoverable conditions (an unreachable photo, a missing local asset, a
/// capture strategy that fails before the full-page fallback) never surface
/// here; they degrade inside their stage instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The HTML template could not be read
    #[error("Failed to read template {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to start the browser or open a tab
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Failed to load content or capture any image
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Network client error
    #[error("Network error: {0}")]
    Network(String),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
