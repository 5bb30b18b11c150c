//! Frame graph error types.

use thiserror::Error;

use crate::backend::BackendError;
use crate::frame_graph::FramePhase;

/// Errors returned by the frame graph.
///
/// None of these are retried internally; a caller seeing any of them is
/// expected to tear the renderer down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameGraphError {
    /// An invalid or backend-unsupported resource descriptor or setting.
    #[error("invalid configuration of {resource}: {reason}")]
    Configuration { resource: String, reason: String },
    /// A persistent resource name that was never imported or exported.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("GPU device lost")]
    DeviceLost,
    #[error("fence wait failed")]
    FenceWaitFailure,
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("operation requires the {expected:?} phase, graph is in {actual:?}")]
    InvalidPhase {
        expected: FramePhase,
        actual: FramePhase,
    },
}

impl FrameGraphError {
    pub(crate) fn configuration(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Lift device-level failures into their dedicated variants.
    pub(crate) fn from_backend(error: BackendError) -> Self {
        match error {
            BackendError::DeviceLost => Self::DeviceLost,
            BackendError::FenceWaitFailed(_) => Self::FenceWaitFailure,
            other => Self::Backend(other),
        }
    }
}

pub type FrameGraphResult<T> = Result<T, FrameGraphError>;
