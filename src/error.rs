//! Error types for response selection and rendering.

use thiserror::Error;

/// Errors surfaced by the responder core.
#[derive(Debug, Error)]
pub enum Error {
    /// A rule's regex pattern failed to compile
    #[error("Invalid rule regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Selection was attempted over an empty response list
    #[error("No responses to choose from")]
    EmptyResponses,

    /// No route with the given uuid or endpoint
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// Template rendering failed
    #[error("Template error: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
