//! Driver Seams
//!
//! The context and resource layers never talk to a graphics API directly.
//! They drive two object-safe traits:
//!
//! - [`RenderDevice`]: the rasterizer API (surfaces, buffers, textures,
//!   frame state)
//! - [`ComputeInterop`]: the compute framework's graphics-interop API
//!   (registration, mapping, device copies, gather/scatter kernels)
//!
//! Both are called only while the owning [`Context`](crate::Context) is
//! current on the calling thread. Synchronous failures are returned as
//! [`InteropError::Render`](crate::InteropError::Render) or
//! [`InteropError::Interop`](crate::InteropError::Interop). Deferred failures
//! are surfaced through `poll_error`.
//!
//! [`headless::HeadlessDevice`] implements both traits in host memory.

pub mod headless;
pub mod types;
#[cfg(feature = "wgpu")]
pub mod wgpu;

pub use types::*;

use crate::dtype::GlType;
use crate::errors::Result;
use crate::tensor::Device;

/// Host-visible view of a mapped render buffer.
///
/// Dropping the mapping does not unmap the buffer; callers pair
/// [`RenderDevice::map_buffer`] with [`RenderDevice::unmap_buffer`].
pub trait HostMapping {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// The rasterizer API.
pub trait RenderDevice: Send + Sync {
    /// Human readable driver name, used in logs.
    fn name(&self) -> &str;

    // ------------------------------------------------------------------------
    // Surfaces
    // ------------------------------------------------------------------------

    fn create_surface(&self, desc: &SurfaceDescriptor) -> Result<SurfaceId>;
    fn resize_surface(&self, surface: SurfaceId, width: u32, height: u32) -> Result<()>;
    /// Makes `surface` current on the calling thread.
    fn bind_surface(&self, surface: SurfaceId) -> Result<()>;
    /// Clears the calling thread's binding of `surface`.
    fn unbind_surface(&self, surface: SurfaceId) -> Result<()>;
    /// Swaps and flushes.
    fn present(&self, surface: SurfaceId) -> Result<()>;
    fn destroy_surface(&self, surface: SurfaceId) -> Result<()>;

    // ------------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------------

    fn create_buffer(&self, target: BufferTarget) -> Result<RenderId>;
    /// (Re)creates the storage of `buffer`. Contents are undefined afterwards.
    fn buffer_data(&self, buffer: RenderId, size: usize, usage: BufferUsage) -> Result<()>;
    fn map_buffer(&self, buffer: RenderId, access: MapAccess) -> Result<Box<dyn HostMapping + '_>>;
    fn unmap_buffer(&self, buffer: RenderId) -> Result<()>;
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<RenderId>) -> Result<()>;
    fn delete_buffer(&self, buffer: RenderId) -> Result<()>;

    // ------------------------------------------------------------------------
    // Textures
    // ------------------------------------------------------------------------

    fn create_texture(&self, target: TextureTarget) -> Result<RenderId>;
    fn bind_texture(&self, target: TextureTarget, texture: Option<RenderId>, unit: u32) -> Result<()>;
    /// Specifies the full image. `None` allocates without uploading.
    fn tex_image(&self, texture: RenderId, spec: &ImageSpec, data: Option<&[u8]>) -> Result<()>;
    /// Replaces the contents of an already specified image of the same layout.
    fn tex_sub_image(&self, texture: RenderId, spec: &ImageSpec, data: &[u8]) -> Result<()>;
    fn set_sampling(&self, texture: RenderId, params: &TextureParameters) -> Result<()>;
    fn generate_mipmap(&self, texture: RenderId) -> Result<()>;
    /// Reads the base level back into `dst` using the given transfer layout.
    fn read_tex_image(&self, texture: RenderId, format: PixelFormat, ty: GlType, dst: &mut [u8]) -> Result<()>;
    fn delete_texture(&self, texture: RenderId) -> Result<()>;

    // ------------------------------------------------------------------------
    // Frame State
    // ------------------------------------------------------------------------

    fn set_viewport(&self, x: i32, y: i32, width: u32, height: u32) -> Result<()>;
    fn set_depth_test(&self, enabled: bool) -> Result<()>;
    /// Clears colour and depth of the bound framebuffer.
    fn clear(&self, color: [f32; 4]) -> Result<()>;

    /// Takes the oldest deferred error, if any.
    fn poll_error(&self) -> Option<String> {
        None
    }
}

/// The compute framework's graphics-interop API.
///
/// Copies and kernels require the registration to be mapped. A registration
/// can be mapped once at a time and not while the render object is mapped
/// through [`RenderDevice::map_buffer`].
pub trait ComputeInterop: Send + Sync {
    fn name(&self) -> &str;

    /// Residency of tensors produced on the compute side.
    fn device(&self) -> Device;

    fn register_buffer(&self, buffer: RenderId) -> Result<InteropId>;
    fn register_image(&self, texture: RenderId, target: TextureTarget) -> Result<InteropId>;
    fn unregister(&self, registration: InteropId) -> Result<()>;

    fn map(&self, registration: InteropId) -> Result<()>;
    fn unmap(&self, registration: InteropId) -> Result<()>;

    /// Byte size of a mapped buffer registration.
    fn mapped_size(&self, registration: InteropId) -> Result<usize>;
    /// Array behind a mapped image registration.
    fn mapped_array(&self, registration: InteropId) -> Result<ArrayDescriptor>;

    fn copy_to_mapped(&self, registration: InteropId, offset: usize, src: &[u8], kind: CopyKind) -> Result<()>;
    fn copy_from_mapped(&self, registration: InteropId, offset: usize, dst: &mut [u8], kind: CopyKind) -> Result<()>;

    /// Writes row `i` of `src` to row `indices[i]` of the mapped buffer.
    fn scatter_rows(&self, registration: InteropId, indices: &[i64], src: &[u8], row_bytes: usize) -> Result<()>;
    /// Reads row `indices[i]` of the mapped buffer into row `i` of `dst`.
    fn gather_rows(&self, registration: InteropId, indices: &[i64], dst: &mut [u8], row_bytes: usize) -> Result<()>;

    /// Copies `rows` rows of `pitch` bytes out of a mapped 2-D array.
    fn copy_from_array_2d(&self, registration: InteropId, dst: &mut [u8], pitch: usize, rows: usize, kind: CopyKind) -> Result<()>;
    /// Copies `rows` rows of `pitch` bytes into a mapped 2-D array.
    fn copy_to_array_2d(&self, registration: InteropId, src: &[u8], pitch: usize, rows: usize, kind: CopyKind) -> Result<()>;

    /// Blocks until queued compute work has finished.
    fn synchronize(&self) -> Result<()>;

    fn poll_error(&self) -> Option<String> {
        None
    }
}
