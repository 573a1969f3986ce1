//! GPU Resources
//!
//! [`Buffer`] and [`Texture`] are render-API objects that are additionally
//! registered with the compute interop layer whenever their format allows it,
//! so array data can move between them and [`Tensor`](crate::Tensor)s without
//! a host round trip.
//!
//! Every method that touches the GPU takes a [`Current`] as proof that the
//! owning context is current. Resources are created through
//! [`Current::create_buffer`] / [`Current::create_texture`], which also
//! register them with that context.

pub mod buffer;
pub mod format;
pub mod texture;

pub use buffer::Buffer;
pub use texture::Texture;

use crate::context::Current;
use crate::errors::{InteropError, Result};

/// Capability shared by everything a context can force-release.
pub trait Resource: Send {
    /// Frees the native handles. Idempotent.
    fn release(&mut self, cur: &Current<'_>) -> Result<()>;

    fn is_released(&self) -> bool;
}

/// Lifecycle of a render object with optional interop registration.
///
/// `Unallocated → RenderOnly → Registered`, back to `RenderOnly` whenever the
/// storage is re-created, `Released` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// The render object exists but has no storage.
    Unallocated,
    /// Storage exists; the compute side cannot see it.
    RenderOnly,
    /// Storage exists and is registered with the compute interop layer.
    Registered,
    Released,
}

/// Fails with [`InteropError::ForeignResource`] when `cur` belongs to another context.
pub(crate) fn check_owner(context: u64, cur: &Current<'_>) -> Result<()> {
    if cur.context_id() == context {
        Ok(())
    } else {
        Err(InteropError::ForeignResource {
            owner: context,
            used_with: cur.context_id(),
        })
    }
}
