//! Pipeline-specific error types.

use crate::engine::Status;
use thiserror::Error;

/// Errors that can occur while building, running or tearing down a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Native operation '{operation}' failed: {status}")]
    NativeOperationFailed {
        operation: &'static str,
        status: Status,
    },

    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Failed to enable port {port}: {status}")]
    PortEnableFailed { port: String, status: Status },

    #[error("Invalid graph state: {0}")]
    InvalidGraphState(String),

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Capture handler error: {0}")]
    Handler(String),

    #[error("Channel receive error")]
    ChannelRecv,
}

impl PipelineError {
    /// The native status carried by this error, if any.
    pub fn status(&self) -> Option<Status> {
        match self {
            PipelineError::NativeOperationFailed { status, .. }
            | PipelineError::PortEnableFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
