//! Headless Driver
//!
//! [`HeadlessDevice`] implements [`RenderDevice`] and [`ComputeInterop`] in
//! host memory. It is the driver behind tests and GPU-less hosts, and it is
//! strict about the protocol real drivers only punish with undefined
//! behaviour:
//!
//! - every object call requires a surface bound on the calling thread
//! - a surface is bound to one thread at a time
//! - a resource is mapped by at most one party at a time
//! - registered objects must be unregistered before deletion
//!
//! Call counts are exposed through [`HeadlessStats`]. Failures can be
//! injected with [`HeadlessDevice::fail_next`] (synchronous) and
//! [`HeadlessDevice::push_error`] (deferred).

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use rustc_hash::FxHashMap;

use super::{
    ArrayDescriptor, BufferTarget, BufferUsage, ComputeInterop, CopyKind, HostMapping, ImageSpec,
    InteropId, MapAccess, PixelFormat, RenderDevice, RenderId, SurfaceDescriptor, SurfaceId,
    TextureParameters, TextureTarget,
};
use crate::dtype::GlType;
use crate::errors::{InteropError, Result};
use crate::tensor::Device;

/// Call counters of a [`HeadlessDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub surfaces_created: usize,
    pub surfaces_destroyed: usize,
    pub surface_binds: usize,
    pub buffers_created: usize,
    pub buffers_deleted: usize,
    pub buffer_allocations: usize,
    pub host_maps: usize,
    pub textures_created: usize,
    pub textures_deleted: usize,
    pub texture_uploads: usize,
    pub texture_readbacks: usize,
    pub mipmaps_generated: usize,
    pub registrations: usize,
    pub unregistrations: usize,
    pub interop_maps: usize,
    pub host_to_device: usize,
    pub device_to_host: usize,
    pub device_to_device: usize,
    pub kernel_launches: usize,
    pub synchronizations: usize,
    pub clears: usize,
    pub presents: usize,
}

impl HeadlessStats {
    fn count_copy(&mut self, kind: CopyKind) {
        match kind {
            CopyKind::HostToDevice => self.host_to_device += 1,
            CopyKind::DeviceToHost => self.device_to_host += 1,
            CopyKind::DeviceToDevice => self.device_to_device += 1,
        }
    }
}

struct SurfaceRecord {
    width: u32,
    height: u32,
    bound_to: Option<ThreadId>,
}

struct BufferRecord {
    usage: BufferUsage,
    data: Arc<Mutex<Vec<u8>>>,
    host_mapped: bool,
    registration: Option<InteropId>,
}

struct StoredImage {
    spec: ImageSpec,
    data: Vec<u8>,
}

struct TextureRecord {
    target: TextureTarget,
    image: Option<StoredImage>,
    params: Option<TextureParameters>,
    mipmapped: bool,
    registration: Option<InteropId>,
}

#[derive(Clone, Copy)]
enum Registered {
    Buffer(RenderId),
    Image(RenderId),
}

struct Registration {
    object: Registered,
    mapped: bool,
}

#[derive(Default)]
struct HeadlessState {
    surfaces: FxHashMap<SurfaceId, SurfaceRecord>,
    buffers: FxHashMap<RenderId, BufferRecord>,
    textures: FxHashMap<RenderId, TextureRecord>,
    registrations: FxHashMap<InteropId, Registration>,
    bound_buffers: FxHashMap<BufferTarget, RenderId>,
    failures: FxHashMap<&'static str, String>,
    pending_errors: VecDeque<String>,
    viewport: (i32, i32, u32, u32),
    depth_test: bool,
    last_clear: Option<[f32; 4]>,
    stats: HeadlessStats,
}

impl HeadlessState {
    fn has_current_surface(&self) -> bool {
        let me = thread::current().id();
        self.surfaces.values().any(|s| s.bound_to == Some(me))
    }

    /// Injection and thread affinity for render calls.
    fn render_call(&mut self, call: &'static str) -> Result<()> {
        if let Some(message) = self.failures.remove(call) {
            return Err(InteropError::render(call, message));
        }
        if !self.has_current_surface() {
            return Err(InteropError::render(call, "no surface is current on this thread"));
        }
        Ok(())
    }

    fn interop_call(&mut self, call: &'static str) -> Result<()> {
        if let Some(message) = self.failures.remove(call) {
            return Err(InteropError::interop(call, message));
        }
        if !self.has_current_surface() {
            return Err(InteropError::interop(call, "no surface is current on this thread"));
        }
        Ok(())
    }

    fn buffer(&mut self, call: &'static str, id: RenderId) -> Result<&mut BufferRecord> {
        self.buffers
            .get_mut(&id)
            .ok_or_else(|| InteropError::render(call, format!("unknown buffer {id}")))
    }

    fn texture(&mut self, call: &'static str, id: RenderId) -> Result<&mut TextureRecord> {
        self.textures
            .get_mut(&id)
            .ok_or_else(|| InteropError::render(call, format!("unknown texture {id}")))
    }

    fn registration(&self, call: &'static str, id: InteropId) -> Result<&Registration> {
        self.registrations
            .get(&id)
            .ok_or_else(|| InteropError::interop(call, format!("unknown registration {}", id.get())))
    }

    fn is_mapped(&self, registration: Option<InteropId>) -> bool {
        registration
            .and_then(|id| self.registrations.get(&id))
            .is_some_and(|r| r.mapped)
    }

    /// Storage of a mapped buffer registration.
    fn mapped_buffer(&self, call: &'static str, id: InteropId) -> Result<Arc<Mutex<Vec<u8>>>> {
        let registration = self.registration(call, id)?;
        if !registration.mapped {
            return Err(InteropError::interop(call, "registration is not mapped"));
        }
        match registration.object {
            Registered::Buffer(buffer) => self
                .buffers
                .get(&buffer)
                .map(|b| Arc::clone(&b.data))
                .ok_or_else(|| InteropError::interop(call, "registered buffer no longer exists")),
            Registered::Image(_) => Err(InteropError::interop(call, "registration is an image, not a buffer")),
        }
    }

    /// Stored image of a mapped image registration.
    fn mapped_image(&mut self, call: &'static str, id: InteropId) -> Result<&mut StoredImage> {
        let registration = self.registration(call, id)?;
        if !registration.mapped {
            return Err(InteropError::interop(call, "registration is not mapped"));
        }
        let Registered::Image(texture) = registration.object else {
            return Err(InteropError::interop(call, "registration is a buffer, not an image"));
        };
        self.textures
            .get_mut(&texture)
            .and_then(|t| t.image.as_mut())
            .ok_or_else(|| InteropError::interop(call, "registered image no longer exists"))
    }
}

struct HeadlessMapping {
    data: ArcMutexGuard<RawMutex, Vec<u8>>,
}

impl HostMapping for HeadlessMapping {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// In-memory render and compute-interop driver.
pub struct HeadlessDevice {
    label: String,
    ordinal: u32,
    next_name: AtomicU32,
    next_registration: AtomicU64,
    state: Mutex<HeadlessState>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ordinal(0)
    }

    /// A device whose compute side reports `Device::Cuda(ordinal)`.
    #[must_use]
    pub fn with_ordinal(ordinal: u32) -> Self {
        Self {
            label: format!("headless:{ordinal}"),
            ordinal,
            next_name: AtomicU32::new(1),
            next_registration: AtomicU64::new(1),
            state: Mutex::new(HeadlessState::default()),
        }
    }

    fn next_name(&self) -> u32 {
        self.next_name.fetch_add(1, Ordering::Relaxed)
    }

    // ------------------------------------------------------------------------
    // Test Hooks
    // ------------------------------------------------------------------------

    /// Makes the next invocation of `call` fail synchronously.
    pub fn fail_next(&self, call: &'static str) {
        self.state
            .lock()
            .failures
            .insert(call, format!("injected failure in {call}"));
    }

    /// Queues a deferred error reported by the next `poll_error`.
    pub fn push_error(&self, message: impl Into<String>) {
        self.state.lock().pending_errors.push_back(message.into());
    }

    #[must_use]
    pub fn stats(&self) -> HeadlessStats {
        self.state.lock().stats
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    #[must_use]
    pub fn live_registrations(&self) -> usize {
        self.state.lock().registrations.len()
    }

    #[must_use]
    pub fn live_surfaces(&self) -> usize {
        self.state.lock().surfaces.len()
    }

    /// Contents of a buffer, or `None` if it is unknown or currently mapped.
    #[must_use]
    pub fn buffer_bytes(&self, buffer: RenderId) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let record = state.buffers.get(&buffer)?;
        record.data.try_lock().map(|data| data.clone())
    }

    #[must_use]
    pub fn buffer_usage(&self, buffer: RenderId) -> Option<BufferUsage> {
        self.state.lock().buffers.get(&buffer).map(|b| b.usage)
    }

    #[must_use]
    pub fn bound_buffer(&self, target: BufferTarget) -> Option<RenderId> {
        self.state.lock().bound_buffers.get(&target).copied()
    }

    #[must_use]
    pub fn texture_parameters(&self, texture: RenderId) -> Option<TextureParameters> {
        self.state.lock().textures.get(&texture).and_then(|t| t.params)
    }

    #[must_use]
    pub fn texture_spec(&self, texture: RenderId) -> Option<ImageSpec> {
        let state = self.state.lock();
        state.textures.get(&texture)?.image.as_ref().map(|i| i.spec)
    }

    #[must_use]
    pub fn is_mipmapped(&self, texture: RenderId) -> bool {
        self.state
            .lock()
            .textures
            .get(&texture)
            .is_some_and(|t| t.mipmapped)
    }

    #[must_use]
    pub fn surface_size(&self, surface: SurfaceId) -> Option<(u32, u32)> {
        self.state
            .lock()
            .surfaces
            .get(&surface)
            .map(|s| (s.width, s.height))
    }

    #[must_use]
    pub fn viewport(&self) -> (i32, i32, u32, u32) {
        self.state.lock().viewport
    }

    #[must_use]
    pub fn depth_test(&self) -> bool {
        self.state.lock().depth_test
    }

    #[must_use]
    pub fn last_clear(&self) -> Option<[f32; 4]> {
        self.state.lock().last_clear
    }
}

fn validate_spec(call: &'static str, spec: &ImageSpec) -> Result<()> {
    let extent = spec.extent;
    let fits = match spec.target.rank() {
        1 => extent.height == 1 && extent.depth == 1,
        2 => extent.depth == 1,
        _ => true,
    };
    if !fits {
        return Err(InteropError::render(
            call,
            format!("extent {extent:?} does not fit a {:?} texture", spec.target),
        ));
    }
    if spec.internal_format.channels() != spec.format.channels() {
        return Err(InteropError::render(
            call,
            format!("{:?} data cannot fill {:?} storage", spec.format, spec.internal_format),
        ));
    }
    Ok(())
}

impl RenderDevice for HeadlessDevice {
    fn name(&self) -> &str {
        &self.label
    }

    // ------------------------------------------------------------------------
    // Surfaces
    // ------------------------------------------------------------------------

    fn create_surface(&self, desc: &SurfaceDescriptor) -> Result<SurfaceId> {
        let mut state = self.state.lock();
        if let Some(message) = state.failures.remove("create_surface") {
            return Err(InteropError::render("create_surface", message));
        }
        let id = SurfaceId::new(self.next_name());
        state.surfaces.insert(
            id,
            SurfaceRecord {
                width: desc.width,
                height: desc.height,
                bound_to: None,
            },
        );
        state.stats.surfaces_created += 1;
        Ok(id)
    }

    fn resize_surface(&self, surface: SurfaceId, width: u32, height: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("resize_surface")?;
        let record = state
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| InteropError::render("resize_surface", "unknown surface"))?;
        record.width = width;
        record.height = height;
        Ok(())
    }

    fn bind_surface(&self, surface: SurfaceId) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(message) = state.failures.remove("bind_surface") {
            return Err(InteropError::render("bind_surface", message));
        }
        let me = thread::current().id();
        match state.surfaces.get(&surface) {
            None => return Err(InteropError::render("bind_surface", "unknown surface")),
            Some(record) if record.bound_to.is_some_and(|owner| owner != me) => {
                return Err(InteropError::render("bind_surface", "surface is current on another thread"));
            }
            Some(_) => {}
        }
        // A thread has one current surface.
        for record in state.surfaces.values_mut() {
            if record.bound_to == Some(me) {
                record.bound_to = None;
            }
        }
        if let Some(record) = state.surfaces.get_mut(&surface) {
            record.bound_to = Some(me);
        }
        state.stats.surface_binds += 1;
        Ok(())
    }

    fn unbind_surface(&self, surface: SurfaceId) -> Result<()> {
        let mut state = self.state.lock();
        let me = thread::current().id();
        let record = state
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| InteropError::render("unbind_surface", "unknown surface"))?;
        if record.bound_to != Some(me) {
            return Err(InteropError::render("unbind_surface", "surface is not current on this thread"));
        }
        record.bound_to = None;
        Ok(())
    }

    fn present(&self, surface: SurfaceId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("present")?;
        if !state.surfaces.contains_key(&surface) {
            return Err(InteropError::render("present", "unknown surface"));
        }
        state.stats.presents += 1;
        Ok(())
    }

    fn destroy_surface(&self, surface: SurfaceId) -> Result<()> {
        let mut state = self.state.lock();
        let me = thread::current().id();
        match state.surfaces.get(&surface) {
            None => return Err(InteropError::render("destroy_surface", "unknown surface")),
            Some(record) if record.bound_to.is_some_and(|owner| owner != me) => {
                return Err(InteropError::render("destroy_surface", "surface is current on another thread"));
            }
            Some(_) => {}
        }
        state.surfaces.remove(&surface);
        state.stats.surfaces_destroyed += 1;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------------

    fn create_buffer(&self, _target: BufferTarget) -> Result<RenderId> {
        let mut state = self.state.lock();
        state.render_call("create_buffer")?;
        let id = RenderId::new(self.next_name());
        state.buffers.insert(
            id,
            BufferRecord {
                usage: BufferUsage::default(),
                data: Arc::new(Mutex::new(Vec::new())),
                host_mapped: false,
                registration: None,
            },
        );
        state.stats.buffers_created += 1;
        Ok(id)
    }

    fn buffer_data(&self, buffer: RenderId, size: usize, usage: BufferUsage) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("buffer_data")?;
        let registration = state.buffer("buffer_data", buffer)?.registration;
        if state.is_mapped(registration) {
            return Err(InteropError::render("buffer_data", "buffer is mapped by the interop layer"));
        }
        let record = state.buffer("buffer_data", buffer)?;
        if record.host_mapped {
            return Err(InteropError::render("buffer_data", "buffer is mapped"));
        }
        *record.data.lock() = vec![0; size];
        record.usage = usage;
        state.stats.buffer_allocations += 1;
        Ok(())
    }

    fn map_buffer(&self, buffer: RenderId, _access: MapAccess) -> Result<Box<dyn HostMapping + '_>> {
        let mut state = self.state.lock();
        state.render_call("map_buffer")?;
        let registration = state.buffer("map_buffer", buffer)?.registration;
        if state.is_mapped(registration) {
            return Err(InteropError::render("map_buffer", "buffer is mapped by the interop layer"));
        }
        let record = state.buffer("map_buffer", buffer)?;
        if record.host_mapped {
            return Err(InteropError::render("map_buffer", "buffer is already mapped"));
        }
        record.host_mapped = true;
        let data = record.data.lock_arc();
        state.stats.host_maps += 1;
        Ok(Box::new(HeadlessMapping { data }))
    }

    fn unmap_buffer(&self, buffer: RenderId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("unmap_buffer")?;
        let record = state.buffer("unmap_buffer", buffer)?;
        if !record.host_mapped {
            return Err(InteropError::render("unmap_buffer", "buffer is not mapped"));
        }
        record.host_mapped = false;
        Ok(())
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<RenderId>) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("bind_buffer")?;
        match buffer {
            Some(id) => {
                state.buffer("bind_buffer", id)?;
                state.bound_buffers.insert(target, id);
            }
            None => {
                state.bound_buffers.remove(&target);
            }
        }
        Ok(())
    }

    fn delete_buffer(&self, buffer: RenderId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("delete_buffer")?;
        let record = state.buffer("delete_buffer", buffer)?;
        if record.host_mapped {
            return Err(InteropError::render("delete_buffer", "buffer is mapped"));
        }
        if record.registration.is_some() {
            return Err(InteropError::render("delete_buffer", "buffer is still registered with the interop layer"));
        }
        state.buffers.remove(&buffer);
        state.bound_buffers.retain(|_, bound| *bound != buffer);
        state.stats.buffers_deleted += 1;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Textures
    // ------------------------------------------------------------------------

    fn create_texture(&self, target: TextureTarget) -> Result<RenderId> {
        let mut state = self.state.lock();
        state.render_call("create_texture")?;
        let id = RenderId::new(self.next_name());
        state.textures.insert(
            id,
            TextureRecord {
                target,
                image: None,
                params: None,
                mipmapped: false,
                registration: None,
            },
        );
        state.stats.textures_created += 1;
        Ok(id)
    }

    fn bind_texture(&self, target: TextureTarget, texture: Option<RenderId>, _unit: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("bind_texture")?;
        if let Some(id) = texture {
            let record = state.texture("bind_texture", id)?;
            if record.target != target {
                return Err(InteropError::render("bind_texture", "texture bound to a different target"));
            }
        }
        Ok(())
    }

    fn tex_image(&self, texture: RenderId, spec: &ImageSpec, data: Option<&[u8]>) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("tex_image")?;
        validate_spec("tex_image", spec)?;
        if let Some(data) = data
            && data.len() != spec.byte_size()
        {
            return Err(InteropError::render(
                "tex_image",
                format!("expected {} bytes of pixel data, got {}", spec.byte_size(), data.len()),
            ));
        }
        let registration = state.texture("tex_image", texture)?.registration;
        if state.is_mapped(registration) {
            return Err(InteropError::render("tex_image", "texture is mapped by the interop layer"));
        }
        let record = state.texture("tex_image", texture)?;
        if record.target != spec.target {
            return Err(InteropError::render("tex_image", "image target does not match texture target"));
        }
        record.image = Some(StoredImage {
            spec: *spec,
            data: data.map_or_else(|| vec![0; spec.byte_size()], <[u8]>::to_vec),
        });
        record.mipmapped = false;
        state.stats.texture_uploads += 1;
        Ok(())
    }

    fn tex_sub_image(&self, texture: RenderId, spec: &ImageSpec, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("tex_sub_image")?;
        let registration = state.texture("tex_sub_image", texture)?.registration;
        if state.is_mapped(registration) {
            return Err(InteropError::render("tex_sub_image", "texture is mapped by the interop layer"));
        }
        let record = state.texture("tex_sub_image", texture)?;
        let image = record
            .image
            .as_mut()
            .filter(|image| image.spec == *spec)
            .ok_or_else(|| InteropError::render("tex_sub_image", "no image with a matching layout"))?;
        if data.len() != image.data.len() {
            return Err(InteropError::render("tex_sub_image", "pixel data size mismatch"));
        }
        image.data.copy_from_slice(data);
        state.stats.texture_uploads += 1;
        Ok(())
    }

    fn set_sampling(&self, texture: RenderId, params: &TextureParameters) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("set_sampling")?;
        state.texture("set_sampling", texture)?.params = Some(*params);
        Ok(())
    }

    fn generate_mipmap(&self, texture: RenderId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("generate_mipmap")?;
        let record = state.texture("generate_mipmap", texture)?;
        if record.image.is_none() {
            return Err(InteropError::render("generate_mipmap", "texture has no image"));
        }
        record.mipmapped = true;
        state.stats.mipmaps_generated += 1;
        Ok(())
    }

    fn read_tex_image(&self, texture: RenderId, format: PixelFormat, ty: GlType, dst: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("read_tex_image")?;
        let registration = state.texture("read_tex_image", texture)?.registration;
        if state.is_mapped(registration) {
            return Err(InteropError::render("read_tex_image", "texture is mapped by the interop layer"));
        }
        let record = state.texture("read_tex_image", texture)?;
        let image = record
            .image
            .as_ref()
            .ok_or_else(|| InteropError::render("read_tex_image", "texture has no image"))?;
        if image.spec.format != format || image.spec.ty != ty {
            return Err(InteropError::render(
                "read_tex_image",
                format!(
                    "cannot convert {:?}/{:?} to {format:?}/{ty:?}",
                    image.spec.format, image.spec.ty
                ),
            ));
        }
        if dst.len() != image.data.len() {
            return Err(InteropError::render("read_tex_image", "destination size mismatch"));
        }
        dst.copy_from_slice(&image.data);
        state.stats.texture_readbacks += 1;
        Ok(())
    }

    fn delete_texture(&self, texture: RenderId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("delete_texture")?;
        if state.texture("delete_texture", texture)?.registration.is_some() {
            return Err(InteropError::render("delete_texture", "texture is still registered with the interop layer"));
        }
        state.textures.remove(&texture);
        state.stats.textures_deleted += 1;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Frame State
    // ------------------------------------------------------------------------

    fn set_viewport(&self, x: i32, y: i32, width: u32, height: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("set_viewport")?;
        state.viewport = (x, y, width, height);
        Ok(())
    }

    fn set_depth_test(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("set_depth_test")?;
        state.depth_test = enabled;
        Ok(())
    }

    fn clear(&self, color: [f32; 4]) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("clear")?;
        state.last_clear = Some(color);
        state.stats.clears += 1;
        Ok(())
    }

    fn poll_error(&self) -> Option<String> {
        self.state.lock().pending_errors.pop_front()
    }
}

impl ComputeInterop for HeadlessDevice {
    fn name(&self) -> &str {
        &self.label
    }

    fn device(&self) -> Device {
        Device::Cuda(self.ordinal)
    }

    fn register_buffer(&self, buffer: RenderId) -> Result<InteropId> {
        let mut state = self.state.lock();
        state.interop_call("register_buffer")?;
        let record = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| InteropError::interop("register_buffer", format!("unknown buffer {buffer}")))?;
        if record.registration.is_some() {
            return Err(InteropError::interop("register_buffer", "buffer is already registered"));
        }
        if record.data.lock().is_empty() {
            return Err(InteropError::interop("register_buffer", "buffer has no storage"));
        }
        let id = InteropId::new(self.next_registration.fetch_add(1, Ordering::Relaxed));
        record.registration = Some(id);
        state.registrations.insert(
            id,
            Registration {
                object: Registered::Buffer(buffer),
                mapped: false,
            },
        );
        state.stats.registrations += 1;
        Ok(id)
    }

    fn register_image(&self, texture: RenderId, target: TextureTarget) -> Result<InteropId> {
        let mut state = self.state.lock();
        state.interop_call("register_image")?;
        let record = state
            .textures
            .get_mut(&texture)
            .ok_or_else(|| InteropError::interop("register_image", format!("unknown texture {texture}")))?;
        if record.target != target {
            return Err(InteropError::interop("register_image", "target does not match texture"));
        }
        if record.registration.is_some() {
            return Err(InteropError::interop("register_image", "texture is already registered"));
        }
        let Some(image) = record.image.as_ref() else {
            return Err(InteropError::interop("register_image", "texture has no image"));
        };
        if !image.spec.internal_format.is_interop_compatible() {
            return Err(InteropError::interop(
                "register_image",
                format!("{:?} cannot be registered", image.spec.internal_format),
            ));
        }
        let id = InteropId::new(self.next_registration.fetch_add(1, Ordering::Relaxed));
        record.registration = Some(id);
        state.registrations.insert(
            id,
            Registration {
                object: Registered::Image(texture),
                mapped: false,
            },
        );
        state.stats.registrations += 1;
        Ok(id)
    }

    fn unregister(&self, registration: InteropId) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("unregister")?;
        let entry = state.registration("unregister", registration)?;
        if entry.mapped {
            return Err(InteropError::interop("unregister", "registration is still mapped"));
        }
        let object = entry.object;
        state.registrations.remove(&registration);
        match object {
            Registered::Buffer(id) => {
                if let Some(buffer) = state.buffers.get_mut(&id) {
                    buffer.registration = None;
                }
            }
            Registered::Image(id) => {
                if let Some(texture) = state.textures.get_mut(&id) {
                    texture.registration = None;
                }
            }
        }
        state.stats.unregistrations += 1;
        Ok(())
    }

    fn map(&self, registration: InteropId) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("map")?;
        let entry = state.registration("map", registration)?;
        if entry.mapped {
            return Err(InteropError::interop("map", "registration is already mapped"));
        }
        if let Registered::Buffer(buffer) = entry.object
            && state.buffers.get(&buffer).is_some_and(|b| b.host_mapped)
        {
            return Err(InteropError::interop("map", "buffer is mapped by the render API"));
        }
        if let Some(entry) = state.registrations.get_mut(&registration) {
            entry.mapped = true;
        }
        state.stats.interop_maps += 1;
        Ok(())
    }

    fn unmap(&self, registration: InteropId) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("unmap")?;
        let entry = state
            .registrations
            .get_mut(&registration)
            .ok_or_else(|| InteropError::interop("unmap", "unknown registration"))?;
        if !entry.mapped {
            return Err(InteropError::interop("unmap", "registration is not mapped"));
        }
        entry.mapped = false;
        Ok(())
    }

    fn mapped_size(&self, registration: InteropId) -> Result<usize> {
        let mut state = self.state.lock();
        state.interop_call("mapped_size")?;
        let data = state.mapped_buffer("mapped_size", registration)?;
        let size = data.lock().len();
        Ok(size)
    }

    fn mapped_array(&self, registration: InteropId) -> Result<ArrayDescriptor> {
        let mut state = self.state.lock();
        state.interop_call("mapped_array")?;
        let image = state.mapped_image("mapped_array", registration)?;
        let spec = image.spec;
        Ok(ArrayDescriptor {
            width: spec.extent.width,
            height: spec.extent.height,
            depth: spec.extent.depth,
            channels: spec.internal_format.channels(),
            format: spec.internal_format.array_format(),
        })
    }

    fn copy_to_mapped(&self, registration: InteropId, offset: usize, src: &[u8], kind: CopyKind) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("copy_to_mapped")?;
        let data = state.mapped_buffer("copy_to_mapped", registration)?;
        let mut data = data.lock();
        let end = offset + src.len();
        if end > data.len() {
            return Err(InteropError::interop(
                "copy_to_mapped",
                format!("copy of {} bytes at {offset} overruns {} byte buffer", src.len(), data.len()),
            ));
        }
        data[offset..end].copy_from_slice(src);
        state.stats.count_copy(kind);
        Ok(())
    }

    fn copy_from_mapped(&self, registration: InteropId, offset: usize, dst: &mut [u8], kind: CopyKind) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("copy_from_mapped")?;
        let data = state.mapped_buffer("copy_from_mapped", registration)?;
        let data = data.lock();
        let end = offset + dst.len();
        if end > data.len() {
            return Err(InteropError::interop(
                "copy_from_mapped",
                format!("copy of {} bytes at {offset} overruns {} byte buffer", dst.len(), data.len()),
            ));
        }
        dst.copy_from_slice(&data[offset..end]);
        state.stats.count_copy(kind);
        Ok(())
    }

    fn scatter_rows(&self, registration: InteropId, indices: &[i64], src: &[u8], row_bytes: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("scatter_rows")?;
        let data = state.mapped_buffer("scatter_rows", registration)?;
        let mut data = data.lock();
        if src.len() != indices.len() * row_bytes {
            return Err(InteropError::interop("scatter_rows", "source does not hold one row per index"));
        }
        let rows = if row_bytes == 0 { 0 } else { data.len() / row_bytes };
        for (row, &index) in indices.iter().enumerate() {
            let Ok(target) = usize::try_from(index) else {
                return Err(InteropError::interop("scatter_rows", format!("negative index {index}")));
            };
            if target >= rows {
                return Err(InteropError::interop("scatter_rows", format!("index {index} out of {rows} rows")));
            }
            data[target * row_bytes..(target + 1) * row_bytes]
                .copy_from_slice(&src[row * row_bytes..(row + 1) * row_bytes]);
        }
        state.stats.kernel_launches += 1;
        Ok(())
    }

    fn gather_rows(&self, registration: InteropId, indices: &[i64], dst: &mut [u8], row_bytes: usize) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("gather_rows")?;
        let data = state.mapped_buffer("gather_rows", registration)?;
        let data = data.lock();
        if dst.len() != indices.len() * row_bytes {
            return Err(InteropError::interop("gather_rows", "destination does not hold one row per index"));
        }
        let rows = if row_bytes == 0 { 0 } else { data.len() / row_bytes };
        for (row, &index) in indices.iter().enumerate() {
            let Ok(source) = usize::try_from(index) else {
                return Err(InteropError::interop("gather_rows", format!("negative index {index}")));
            };
            if source >= rows {
                return Err(InteropError::interop("gather_rows", format!("index {index} out of {rows} rows")));
            }
            dst[row * row_bytes..(row + 1) * row_bytes]
                .copy_from_slice(&data[source * row_bytes..(source + 1) * row_bytes]);
        }
        state.stats.kernel_launches += 1;
        Ok(())
    }

    fn copy_from_array_2d(&self, registration: InteropId, dst: &mut [u8], pitch: usize, rows: usize, kind: CopyKind) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("copy_from_array_2d")?;
        let image = state.mapped_image("copy_from_array_2d", registration)?;
        let row_bytes = image.spec.row_bytes();
        if pitch > row_bytes || rows * row_bytes > image.data.len() || dst.len() < pitch * rows {
            return Err(InteropError::interop("copy_from_array_2d", "copy region exceeds the array"));
        }
        for row in 0..rows {
            dst[row * pitch..(row + 1) * pitch]
                .copy_from_slice(&image.data[row * row_bytes..row * row_bytes + pitch]);
        }
        state.stats.count_copy(kind);
        Ok(())
    }

    fn copy_to_array_2d(&self, registration: InteropId, src: &[u8], pitch: usize, rows: usize, kind: CopyKind) -> Result<()> {
        let mut state = self.state.lock();
        state.interop_call("copy_to_array_2d")?;
        let image = state.mapped_image("copy_to_array_2d", registration)?;
        let row_bytes = image.spec.row_bytes();
        if pitch > row_bytes || rows * row_bytes > image.data.len() || src.len() < pitch * rows {
            return Err(InteropError::interop("copy_to_array_2d", "copy region exceeds the array"));
        }
        for row in 0..rows {
            image.data[row * row_bytes..row * row_bytes + pitch]
                .copy_from_slice(&src[row * pitch..(row + 1) * pitch]);
        }
        state.stats.count_copy(kind);
        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(message) = state.failures.remove("synchronize") {
            return Err(InteropError::interop("synchronize", message));
        }
        state.stats.synchronizations += 1;
        Ok(())
    }
}
