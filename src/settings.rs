//! Context Settings
//!
//! Configuration consumed when a [`Context`](crate::Context) creates its
//! native surface.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use myth_interop::settings::{ContextSettings, ErrorChecks};
//!
//! let settings = ContextSettings {
//!     width: 1280,
//!     height: 720,
//!     error_checks: ErrorChecks::DebugOnly,
//!     ..Default::default()
//! };
//! ```

// ---------------------------------------------------------------------------
// ErrorChecks
// ---------------------------------------------------------------------------

/// When deferred driver errors are polled after a GPU call sequence.
///
/// Synchronous failures are always reported. This only governs the extra
/// `poll_error` round trip, which stalls real drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorChecks {
    /// Poll after every call sequence.
    #[default]
    Always,
    /// Poll only in builds with `debug_assertions`.
    DebugOnly,
}

impl ErrorChecks {
    #[inline]
    #[must_use]
    pub fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::DebugOnly => cfg!(debug_assertions),
        }
    }
}

// ---------------------------------------------------------------------------
// ContextSettings
// ---------------------------------------------------------------------------

/// Default clear colour used by [`Context::render`](crate::Context::render).
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.32, 0.34, 0.87, 1.0];

/// Configuration for a rendering context and its native surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSettings {
    /// Initial surface width in pixels.
    pub width: u32,
    /// Initial surface height in pixels.
    pub height: u32,
    /// Request a core profile instead of the compatibility profile.
    pub core_profile: bool,
    /// Multisample count of the default framebuffer.
    pub samples: u32,
    /// Colour the frame is cleared to before the scene is drawn.
    pub clear_color: [f32; 4],
    pub error_checks: ErrorChecks,
    /// Debug label of the native surface.
    pub label: String,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            core_profile: false,
            samples: 4,
            clear_color: DEFAULT_CLEAR_COLOR,
            error_checks: ErrorChecks::Always,
            label: "myth-interop".to_string(),
        }
    }
}

impl ContextSettings {
    /// Default settings with the given surface size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }
}
