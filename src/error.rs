//! Error handling for vcgraph
//!
//! Pipeline operations return [`PipelineError`]. This module wraps it
//! together with configuration and I/O failures into [`VcError`], with a
//! [`Result`] alias and context helpers for the application layer.

use crate::pipeline::PipelineError;
use thiserror::Error;

/// Main error type for vcgraph operations
#[derive(Error, Debug)]
pub enum VcError {
    /// Errors raised while building, running or tearing down a pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed port address such as `camera:sideways:0`
    #[error("Invalid port address '{address}': {reason}")]
    PortAddress { address: String, reason: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<VcError>,
    },
}

impl VcError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        VcError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The pipeline error at the root of this error, if any.
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        match self {
            VcError::Pipeline(e) => Some(e),
            VcError::WithContext { source, .. } => source.pipeline_error(),
            _ => None,
        }
    }
}

/// Result type alias for vcgraph operations
pub type Result<T> = std::result::Result<T, VcError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| VcError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| VcError::from(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Status;

    #[test]
    fn test_error_display() {
        let err = VcError::Config("missing components".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing components");
    }

    #[test]
    fn test_error_with_context() {
        let err: Result<()> = Err(PipelineError::CycleDetected).context("Linking camera");
        let err = err.unwrap_err();
        assert!(err.to_string().starts_with("Linking camera"));
        assert!(matches!(
            err.pipeline_error(),
            Some(PipelineError::CycleDetected)
        ));
    }

    #[test]
    fn test_native_status_survives_context() {
        let err: Result<()> = Status::NoMemory
            .check("create_pool")
            .with_context(|| "Allocating encoder output".to_string());
        let err = err.unwrap_err();
        assert_eq!(
            err.pipeline_error().and_then(|e| e.status()),
            Some(Status::NoMemory)
        );
    }
}
