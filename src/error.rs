// ============================================================================
// ERRORS — one taxonomy for every fallible editing operation
// ============================================================================

use crate::canvas::LayerId;

/// Error type for buffer access, kernel construction, history navigation and
/// tool/effect dispatch.
#[derive(Debug)]
pub enum EditError {
    /// Coordinate outside a buffer or mask.
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },
    /// A buffer or mask was requested with a zero dimension.
    InvalidDimensions { width: u32, height: u32 },
    /// A buffer or mask does not match the document size.
    DimensionMismatch { expected: (u32, u32), found: (u32, u32) },
    /// A tool or effect was invoked with no selected layer.
    NoActiveLayer,
    /// A layer id that is not (or no longer) part of the workspace.
    UnknownLayer(LayerId),
    NothingToUndo,
    NothingToRedo,
    /// Kernel dimensions must be odd and positive.
    InvalidKernelSize { width: u32, height: u32 },
    InvalidParameter { name: String, reason: String },
    MissingParameter(String),
    UnknownOperation(String),
    Io(std::io::Error),
    Image(String),
}

impl EditError {
    /// History boundary signals are reported, not fatal.
    pub fn is_history_boundary(&self) -> bool {
        matches!(self, EditError::NothingToUndo | EditError::NothingToRedo)
    }

    pub(crate) fn invalid_param(name: &str, reason: impl Into<String>) -> Self {
        EditError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::OutOfBounds { x, y, width, height } => {
                write!(f, "coordinate ({}, {}) outside {}×{}", x, y, width, height)
            }
            EditError::InvalidDimensions { width, height } => {
                write!(f, "invalid dimensions {}×{}", width, height)
            }
            EditError::DimensionMismatch { expected, found } => write!(
                f,
                "expected {}×{}, found {}×{}",
                expected.0, expected.1, found.0, found.1
            ),
            EditError::NoActiveLayer => write!(f, "no active layer"),
            EditError::UnknownLayer(id) => write!(f, "unknown layer {}", id),
            EditError::NothingToUndo => write!(f, "nothing to undo"),
            EditError::NothingToRedo => write!(f, "nothing to redo"),
            EditError::InvalidKernelSize { width, height } => {
                write!(f, "kernel size {}×{} must be odd and positive", width, height)
            }
            EditError::InvalidParameter { name, reason } => {
                write!(f, "invalid parameter '{}': {}", name, reason)
            }
            EditError::MissingParameter(name) => write!(f, "missing parameter '{}'", name),
            EditError::UnknownOperation(name) => write!(f, "unknown operation '{}'", name),
            EditError::Io(e) => write!(f, "I/O error: {}", e),
            EditError::Image(e) => write!(f, "image error: {}", e),
        }
    }
}

impl std::error::Error for EditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EditError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EditError {
    fn from(e: std::io::Error) -> Self {
        EditError::Io(e)
    }
}

impl From<image::ImageError> for EditError {
    fn from(e: image::ImageError) -> Self {
        EditError::Image(e.to_string())
    }
}
