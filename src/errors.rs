//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`InteropError`] is grouped into three families:
//! - Context protocol errors (initialization, ownership, stale handles)
//! - Driver errors reported by the render API or the compute interop layer
//! - Shape/type contract errors raised before any GPU work is issued
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, InteropError>`.
//!
//! ```rust,ignore
//! use myth_interop::errors::{InteropError, Result};
//!
//! fn upload() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The main error type for the interop layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InteropError {
    // ========================================================================
    // Context Errors
    // ========================================================================
    /// The native surface could not be created.
    #[error("Failed to initialize rendering context: {0}")]
    ContextInit(String),

    /// An operation required the context to be current on the calling thread.
    #[error("Context is not current on this thread")]
    NotCurrent,

    /// `detach_current` was called by a thread that does not hold the context.
    #[error("Context detached on a thread that does not hold it")]
    DetachWithoutCurrent,

    /// A handle was used with a context that does not own it.
    #[error("Resource belongs to context {owner}, not context {used_with}")]
    ForeignResource {
        /// Context that created the resource
        owner: u64,
        /// Context the handle was presented to
        used_with: u64,
    },

    /// The resource behind a handle has already been released.
    #[error("Resource has been released")]
    ResourceReleased,

    /// The resource is already borrowed on this thread.
    #[error("Resource is already borrowed")]
    ResourceBusy,

    // ========================================================================
    // Driver Errors
    // ========================================================================
    /// The render API reported a failure.
    #[error("Render API error in {call}: {message}")]
    Render {
        /// Name of the failing driver call
        call: &'static str,
        /// Driver supplied description
        message: String,
    },

    /// The compute interop layer reported a failure.
    #[error("Compute interop error in {call}: {message}")]
    Interop {
        /// Name of the failing driver call
        call: &'static str,
        /// Driver supplied description
        message: String,
    },

    /// The operation needs a compute interop subsystem but none is attached.
    #[error("Compute interop subsystem is not available")]
    InteropUnavailable,

    // ========================================================================
    // Shape & Type Contract Errors
    // ========================================================================
    /// Scalar type outside the supported table.
    #[error("Unsupported scalar type: {0}")]
    UnsupportedType(String),

    /// No texture format exists for this channel count and scalar type.
    #[error("Unsupported texture format: {channels} channel(s) of {dtype}")]
    UnsupportedFormat {
        /// Number of channels requested
        channels: usize,
        /// Scalar type requested
        dtype: String,
    },

    /// Tensor or index shapes do not satisfy the operation.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Operands reside on incompatible devices.
    #[error("Device mismatch: {0}")]
    DeviceMismatch(String),

    /// An index addressed a row outside the resource.
    #[error("Index {index} out of range for dimension of size {size}")]
    IndexOutOfRange {
        /// The offending index
        index: i64,
        /// Size of the indexed dimension
        size: usize,
    },

    /// The resource has no storage yet.
    #[error("Resource has no storage allocated")]
    NotAllocated,

    /// The framebuffer or scene handed to `render` cannot be used.
    #[error("Invalid render target: {0}")]
    InvalidRenderTarget(String),

    /// Write access was requested through a read-only mapping.
    #[error("Mapping was opened read-only")]
    ReadOnlyMapping,
}

impl InteropError {
    /// Shorthand for a render API failure.
    pub fn render(call: &'static str, message: impl Into<String>) -> Self {
        Self::Render {
            call,
            message: message.into(),
        }
    }

    /// Shorthand for a compute interop failure.
    pub fn interop(call: &'static str, message: impl Into<String>) -> Self {
        Self::Interop {
            call,
            message: message.into(),
        }
    }

    /// Whether this error came from a driver rather than from argument validation.
    #[must_use]
    pub fn is_driver_error(&self) -> bool {
        matches!(
            self,
            Self::Render { .. } | Self::Interop { .. } | Self::ContextInit(_)
        )
    }
}

/// Alias for `Result<T, InteropError>`.
pub type Result<T> = std::result::Result<T, InteropError>;
