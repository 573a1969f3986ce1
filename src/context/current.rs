//! Proof that a context is current on the calling thread.

use std::marker::PhantomData;

use parking_lot::{ArcMutexGuard, RawMutex};

use super::Context;
use super::registry::{BufferHandle, Handle, ResourceHandle, TextureHandle, Tracked};
use crate::backend::{BufferTarget, BufferUsage, ComputeInterop, RenderDevice, TextureTarget};
use crate::errors::{InteropError, Result};
use crate::resources::{Buffer, Resource, Texture};
use crate::tensor::Tensor;

/// Exclusive borrow of a registered resource.
pub type ResourceGuard<T> = ArcMutexGuard<RawMutex, T>;

/// Guard returned by [`Context::current`].
///
/// Holding a `Current` means the context lock is held by this thread and its
/// surface is bound here. Dropping it performs one
/// [`Context::detach_current`]. It cannot leave the thread that created it.
pub struct Current<'ctx> {
    ctx: &'ctx Context,
    _not_send: PhantomData<*const ()>,
}

impl<'ctx> Current<'ctx> {
    pub(super) fn new(ctx: &'ctx Context) -> Self {
        Self {
            ctx,
            _not_send: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    #[inline]
    #[must_use]
    pub fn context_id(&self) -> u64 {
        self.ctx.id()
    }

    #[inline]
    pub(crate) fn render(&self) -> &'ctx dyn RenderDevice {
        self.ctx.render_device()
    }

    #[inline]
    pub(crate) fn interop(&self) -> Option<&'ctx dyn ComputeInterop> {
        self.ctx.interop_device()
    }

    pub(crate) fn require_interop(&self) -> Result<&'ctx dyn ComputeInterop> {
        self.interop().ok_or(InteropError::InteropUnavailable)
    }

    /// Polls deferred driver errors if the context's [`ErrorChecks`](crate::settings::ErrorChecks) ask for it.
    pub(crate) fn check_errors(&self, call: &'static str) -> Result<()> {
        if !self.ctx.settings().error_checks.enabled() {
            return Ok(());
        }
        if let Some(message) = self.render().poll_error() {
            return Err(InteropError::render(call, message));
        }
        if let Some(interop) = self.interop()
            && let Some(message) = interop.poll_error()
        {
            return Err(InteropError::interop(call, message));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Resource Creation
    // ------------------------------------------------------------------------

    /// Creates an empty buffer owned by this context.
    pub fn create_buffer(&self, target: BufferTarget, usage: BufferUsage) -> Result<BufferHandle> {
        let buffer = Buffer::new(self, target, usage)?;
        Ok(self.ctx.registry().insert(buffer))
    }

    /// Creates a buffer holding a copy of `tensor`.
    pub fn buffer_from_tensor(&self, tensor: &Tensor, target: BufferTarget, usage: BufferUsage) -> Result<BufferHandle> {
        let mut buffer = Buffer::new(self, target, usage)?;
        if let Err(err) = buffer.copy_from_tensor(self, tensor) {
            buffer.release(self)?;
            return Err(err);
        }
        Ok(self.ctx.registry().insert(buffer))
    }

    /// Creates an unspecified texture owned by this context.
    pub fn create_texture(&self, target: TextureTarget) -> Result<TextureHandle> {
        let texture = Texture::new(self, target)?;
        Ok(self.ctx.registry().insert(texture))
    }

    /// Creates a texture whose image is a copy of `image`.
    pub fn texture_from_tensor(&self, image: &Tensor, target: TextureTarget) -> Result<TextureHandle> {
        let mut texture = Texture::new(self, target)?;
        if let Err(err) = texture.copy_from_tensor(self, image) {
            texture.release(self)?;
            return Err(err);
        }
        Ok(self.ctx.registry().insert(texture))
    }

    /// Hands a caller-defined resource to this context's registry.
    pub fn register<R: Resource + 'static>(&self, resource: R) -> ResourceHandle {
        self.ctx.registry().insert_custom(Box::new(resource))
    }

    // ------------------------------------------------------------------------
    // Resource Access
    // ------------------------------------------------------------------------

    fn borrow<T: Tracked>(&self, handle: &Handle<T>) -> Result<ResourceGuard<T>> {
        let cell = self.ctx.registry().cell(handle)?;
        cell.try_lock_arc().ok_or(InteropError::ResourceBusy)
    }

    pub fn buffer(&self, handle: &BufferHandle) -> Result<ResourceGuard<Buffer>> {
        self.borrow(handle)
    }

    pub fn texture(&self, handle: &TextureHandle) -> Result<ResourceGuard<Texture>> {
        self.borrow(handle)
    }

    /// Runs `f` on any registered resource.
    pub fn with_resource<R>(&self, handle: &ResourceHandle, f: impl FnOnce(&mut dyn Resource) -> R) -> Result<R> {
        self.ctx.registry().entry(handle)?.with(f)
    }

    /// Releases the native handles of a resource and drops it from the registry.
    ///
    /// Other handles to the same resource report [`InteropError::ResourceReleased`]
    /// afterwards.
    pub fn release(&self, handle: &ResourceHandle) -> Result<()> {
        self.ctx.registry().entry(handle)?.release(self)?;
        self.ctx.registry().remove(handle).map(drop)
    }
}

impl Drop for Current<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.ctx.detach_current() {
            log::error!("Failed to detach context {}: {err}", self.ctx.id());
        }
    }
}
