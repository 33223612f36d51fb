//! Error types for prompt rendering and provider calls

use thiserror::Error;

/// Prompt and provider error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Core domain error: {0}")]
    Core(#[from] crewplan_core::Error),

    #[error("Invalid template syntax: {0}")]
    InvalidTemplate(String),

    #[error("Template rendering error: {0}")]
    TemplateRendering(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unparseable provider response: {0}")]
    UnparseableResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<handlebars::TemplateError> for Error {
    fn from(err: handlebars::TemplateError) -> Self {
        Error::InvalidTemplate(err.to_string())
    }
}

impl From<handlebars::RenderError> for Error {
    fn from(err: handlebars::RenderError) -> Self {
        Error::TemplateRendering(err.to_string())
    }
}

impl Error {
    /// Convert into the core error reported for provider `name`
    pub fn into_core(self, name: &str) -> crewplan_core::Error {
        match self {
            Error::Core(inner) => inner,
            Error::Configuration(message) => crewplan_core::Error::configuration(message),
            Error::Http(err) if err.is_timeout() => {
                crewplan_core::Error::provider(name, format!("request timed out: {}", err))
            }
            other => crewplan_core::Error::provider(name, other.to_string()),
        }
    }
}

/// Convenience result type for prompt operations
pub type Result<T> = std::result::Result<T, Error>;
