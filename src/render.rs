//! Collaborator seams used by [`Context::render`](crate::Context::render).
//!
//! The scene graph and framebuffer objects live outside this crate; the
//! context only needs to size, bind and draw them.

use glam::Mat4;

use crate::context::Current;
use crate::errors::Result;

/// Objects that are bound for the duration of a scope.
pub trait Bindable {
    fn bind(&self, cur: &Current<'_>) -> Result<()>;
    fn unbind(&self, cur: &Current<'_>) -> Result<()>;
}

/// The framebuffer a frame is drawn into.
pub trait RenderTarget: Bindable {
    /// (Re)allocates attachments for the given size.
    fn set_size(&mut self, cur: &Current<'_>, width: u32, height: u32) -> Result<()>;
    fn is_complete(&self) -> bool;
}

/// The scene drawn by a frame.
pub trait SceneDraw {
    /// Whether the scene has anything to draw.
    fn is_loaded(&self) -> bool {
        true
    }

    fn draw(&self, cur: &Current<'_>, projection: &Mat4, view: &Mat4) -> Result<()>;
}
