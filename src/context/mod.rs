//! Rendering Context
//!
//! A [`Context`] owns a native surface, an exclusive reentrant lock and the
//! registry of every resource created while it was current.
//!
//! # Protocol
//!
//! - [`Context::make_current`] blocks until the calling thread owns the
//!   context, creating and binding the surface on first use. Calling it again
//!   on the owning thread only deepens the entry count.
//! - [`Context::detach_current`] undoes one entry. The last one unbinds the
//!   surface and lets the next waiting thread in.
//! - [`Context::current`] wraps the pair in a [`Current`] guard, which is
//!   also the argument every GPU-touching resource method takes.
//!
//! ```rust,ignore
//! let (ctx, device) = Context::headless(ContextSettings::default());
//! let cur = ctx.current()?;
//! let points = cur.buffer_from_tensor(&tensor, BufferTarget::Array, BufferUsage::Dynamic)?;
//! drop(cur);
//! ctx.release()?;
//! ```

mod current;
mod lock;
pub mod registry;

pub use current::{Current, ResourceGuard};
pub use registry::{BufferHandle, Handle, ResourceHandle, ResourceKey, ResourceKind, TextureHandle};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Mat4;
use parking_lot::Mutex;

use self::lock::{ContextLock, Entry};
use self::registry::ResourceRegistry;
use crate::backend::headless::HeadlessDevice;
use crate::backend::{ComputeInterop, RenderDevice, SurfaceDescriptor, SurfaceId};
use crate::errors::{InteropError, Result};
use crate::mapping::ScopedBind;
use crate::render::{RenderTarget, SceneDraw};
use crate::resources::Resource;
use crate::settings::ContextSettings;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct SurfaceState {
    surface: Option<SurfaceId>,
    width: u32,
    height: u32,
    clear_color: [f32; 4],
}

/// A rendering context shared between threads.
pub struct Context {
    id: u64,
    settings: ContextSettings,
    render: Arc<dyn RenderDevice>,
    interop: Option<Arc<dyn ComputeInterop>>,
    lock: ContextLock,
    surface: Mutex<SurfaceState>,
    registry: ResourceRegistry,
}

impl Context {
    /// Creates an unbound context. No driver call happens until the first
    /// [`make_current`](Self::make_current).
    pub fn new(
        settings: ContextSettings,
        render: Arc<dyn RenderDevice>,
        interop: Option<Arc<dyn ComputeInterop>>,
    ) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            surface: Mutex::new(SurfaceState {
                surface: None,
                width: settings.width,
                height: settings.height,
                clear_color: settings.clear_color,
            }),
            settings,
            render,
            interop,
            lock: ContextLock::new(),
            registry: ResourceRegistry::new(id),
        }
    }

    /// A context on a fresh [`HeadlessDevice`] serving as both render and
    /// compute-interop driver.
    pub fn headless(settings: ContextSettings) -> (Self, Arc<HeadlessDevice>) {
        let device = Arc::new(HeadlessDevice::new());
        let interop: Arc<dyn ComputeInterop> = device.clone();
        let ctx = Self::new(settings, device.clone(), Some(interop));
        (ctx, device)
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    #[inline]
    pub(crate) fn render_device(&self) -> &dyn RenderDevice {
        &*self.render
    }

    #[inline]
    pub(crate) fn interop_device(&self) -> Option<&dyn ComputeInterop> {
        self.interop.as_deref()
    }

    #[inline]
    pub(crate) fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Whether a compute interop driver is attached.
    #[inline]
    #[must_use]
    pub fn has_interop(&self) -> bool {
        self.interop.is_some()
    }

    // ------------------------------------------------------------------------
    // Lock Protocol
    // ------------------------------------------------------------------------

    /// Acquires the context for the calling thread. Reentrant.
    ///
    /// If the surface cannot be created or bound, the entry is rolled back and
    /// the context stays unbound.
    pub fn make_current(&self) -> Result<()> {
        let entry = self.lock.enter();
        if let Err(err) = self.ensure_bound(entry) {
            if let Ok(true) = self.lock.leave() {
                self.lock.unlock();
            }
            return Err(err);
        }
        log::trace!("Context {} current (depth {})", self.id, self.lock.depth());
        Ok(())
    }

    fn ensure_bound(&self, entry: Entry) -> Result<()> {
        let mut state = self.surface.lock();
        if let Some(surface) = state.surface {
            if entry == Entry::Acquired {
                self.render.bind_surface(surface)?;
            }
            return Ok(());
        }

        let desc = SurfaceDescriptor {
            label: self.settings.label.clone(),
            width: state.width,
            height: state.height,
            core_profile: self.settings.core_profile,
            samples: self.settings.samples,
        };
        let surface = self
            .render
            .create_surface(&desc)
            .map_err(|err| InteropError::ContextInit(err.to_string()))?;
        if let Err(err) = self.render.bind_surface(surface) {
            if let Err(destroy_err) = self.render.destroy_surface(surface) {
                log::warn!("Failed to destroy unusable surface: {destroy_err}");
            }
            return Err(InteropError::ContextInit(err.to_string()));
        }
        state.surface = Some(surface);
        log::info!(
            "Context {} created {}x{} surface on {}",
            self.id,
            desc.width,
            desc.height,
            self.render.name()
        );
        Ok(())
    }

    /// Undoes one [`make_current`](Self::make_current).
    pub fn detach_current(&self) -> Result<()> {
        if !self.lock.leave()? {
            log::trace!("Context {} detached (depth {})", self.id, self.lock.depth());
            return Ok(());
        }
        let surface = self.surface.lock().surface;
        let result = surface.map_or(Ok(()), |surface| self.render.unbind_surface(surface));
        self.lock.unlock();
        log::trace!("Context {} released by thread", self.id);
        result
    }

    /// [`make_current`](Self::make_current) with a guard that detaches on drop.
    pub fn current(&self) -> Result<Current<'_>> {
        self.make_current()?;
        Ok(Current::new(self))
    }

    /// Whether the calling thread holds this context.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.lock.is_held_by_current_thread()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Releases every owned resource and destroys the surface.
    ///
    /// A no-op on an unbound context. The next `make_current` creates a new
    /// surface. Fails with [`InteropError::ResourceBusy`] and changes nothing
    /// while a resource is borrowed. Other resource release failures are
    /// logged; the first one is returned after the surface is gone.
    pub fn release(&self) -> Result<()> {
        if self.surface.lock().surface.is_none() {
            return Ok(());
        }

        let cur = self.current()?;
        let mut first_error = None;
        let resources = self.registry.drain()?;
        let count = resources.len();
        for entry in resources {
            if let Err(err) = entry.release(&cur) {
                log::error!("Failed to release resource of context {}: {err}", self.id);
                first_error.get_or_insert(err);
            }
        }

        let surface = self.surface.lock().surface.take();
        if let Some(surface) = surface {
            if let Err(err) = self.render.unbind_surface(surface) {
                log::warn!("Failed to unbind surface of context {}: {err}", self.id);
            }
            if let Err(err) = self.render.destroy_surface(surface) {
                first_error.get_or_insert(err);
            }
        }
        drop(cur);

        log::info!("Context {} released ({count} resources)", self.id);
        first_error.map_or(Ok(()), Err)
    }

    /// Releases every resource no caller handle refers to any more.
    ///
    /// Returns how many resources were collected.
    pub fn collect_garbage(&self) -> Result<usize> {
        let cur = self.current()?;
        let garbage = self.registry.take_unreferenced();
        let count = garbage.len();
        let mut first_error = None;
        for entry in garbage {
            if let Err(err) = entry.release(&cur) {
                log::error!("Failed to collect resource of context {}: {err}", self.id);
                first_error.get_or_insert(err);
            }
        }
        if count > 0 {
            log::debug!("Context {} collected {count} unreferenced resources", self.id);
        }
        first_error.map_or(Ok(count), Err)
    }

    /// Registers a caller-defined resource with this context.
    ///
    /// Fails with [`InteropError::NotCurrent`] unless the calling thread holds
    /// the context.
    pub fn register<R: Resource + 'static>(&self, resource: R) -> Result<ResourceHandle> {
        if !self.is_current() {
            return Err(InteropError::NotCurrent);
        }
        Ok(self.registry.insert_custom(Box::new(resource)))
    }

    /// Whether `handle` refers to a live resource of this context.
    #[must_use]
    pub fn owns(&self, handle: &ResourceHandle) -> bool {
        self.registry.contains(handle)
    }

    #[must_use]
    pub fn live_resources(&self) -> usize {
        self.registry.len()
    }

    /// Whether a native surface currently exists.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.surface.lock().surface.is_some()
    }

    // ------------------------------------------------------------------------
    // Surface & Frame
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn width(&self) -> u32 {
        self.surface.lock().width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.surface.lock().height
    }

    #[must_use]
    pub fn clear_color(&self) -> [f32; 4] {
        self.surface.lock().clear_color
    }

    pub fn set_clear_color(&self, color: [f32; 4]) {
        self.surface.lock().clear_color = color;
    }

    /// Resizes the surface and records the new default viewport size.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        let cur = self.current()?;
        let surface = self.surface.lock().surface;
        if let Some(surface) = surface {
            self.render.resize_surface(surface, width, height)?;
        }
        {
            let mut state = self.surface.lock();
            state.width = width;
            state.height = height;
        }
        cur.check_errors("resize")
    }

    /// Draws one frame of `scene` into `framebuffer`.
    ///
    /// `size` overrides the context size; sizes below one pixel fall back to
    /// it. The framebuffer is unbound on every exit path.
    pub fn render(
        &self,
        projection: &Mat4,
        view: &Mat4,
        framebuffer: &mut dyn RenderTarget,
        scene: &dyn SceneDraw,
        size: Option<(u32, u32)>,
    ) -> Result<()> {
        let cur = self.current()?;
        let (width, height) = match size {
            Some((width, height)) if width >= 1 && height >= 1 => (width, height),
            _ => (self.width(), self.height()),
        };

        if !scene.is_loaded() {
            return Err(InteropError::InvalidRenderTarget("scene has no drawable content".to_string()));
        }
        framebuffer.set_size(&cur, width, height)?;
        if !framebuffer.is_complete() {
            return Err(InteropError::InvalidRenderTarget("framebuffer is incomplete".to_string()));
        }

        let bound = ScopedBind::new(&cur, &*framebuffer)?;
        self.render.set_viewport(0, 0, width, height)?;
        self.render.clear(self.clear_color())?;
        self.render.set_depth_test(true)?;
        scene.draw(&cur, projection, view)?;

        let surface = self.surface.lock().surface.ok_or(InteropError::NotCurrent)?;
        self.render.present(surface)?;
        cur.check_errors("render")?;
        bound.finish()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::error!("Failed to release context {} on drop: {err}", self.id);
        }
    }
}
