use thiserror::Error;

use crate::xr::XrSessionMode;

/// Failures surfaced by the viewer bootstrap and steady-state loop.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("drawing surface `{id}` not found")]
    SurfaceNotFound { id: String },
    #[error("failed to initialize render backend: {0}")]
    Backend(String),
    #[error("failed to create default environment: {0}")]
    Environment(String),
    #[error("XR session mode `{mode}` is not supported by this runtime")]
    XrUnsupported { mode: XrSessionMode },
    #[error("XR session negotiation failed: {0}")]
    XrSession(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("viewer has not been started")]
    NotStarted,
    #[error("viewer was already started")]
    AlreadyStarted,
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Failures reported by a [`RenderBackend`](crate::engine::RenderBackend) while drawing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("GPU is out of memory")]
    OutOfMemory,
    #[error("surface timed out")]
    Timeout,
    #[error("surface lost; reconfigured")]
    SurfaceLost,
    #[error("render backend error: {0}")]
    Backend(String),
}

impl RenderError {
    /// Whether the frame can simply be retried on the next refresh.
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::Timeout | RenderError::SurfaceLost)
    }
}
