//! wgpu Render Driver
//!
//! [`WgpuDevice`] implements [`RenderDevice`] on top of wgpu. Surfaces are
//! off-screen colour/depth targets, so no window system is involved. wgpu
//! exposes no graphics interop to a compute framework, so contexts built on
//! this driver keep every resource render-only.
//!
//! Buffers cannot be mapped in place. A host mapping reads the buffer back
//! into a staging vector and writes it again on unmap. Three-channel
//! formats have no wgpu counterpart and fail with
//! [`InteropError::UnsupportedFormat`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use rustc_hash::FxHashMap;

use super::{
    BufferTarget, BufferUsage, FilterMode, HostMapping, ImageSpec, InternalFormat, MapAccess, PixelFormat,
    RenderDevice, RenderId, SurfaceDescriptor, SurfaceId, TextureParameters, TextureTarget, WrapMode,
};
use crate::dtype::GlType;
use crate::errors::{InteropError, Result};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

fn texture_format(format: InternalFormat) -> Result<wgpu::TextureFormat> {
    use wgpu::TextureFormat as F;
    let mapped = match format {
        InternalFormat::R8 => F::R8Unorm,
        InternalFormat::R8Snorm => F::R8Snorm,
        InternalFormat::R16I => F::R16Sint,
        InternalFormat::R32I => F::R32Sint,
        InternalFormat::R32F => F::R32Float,
        InternalFormat::Rgba8 => F::Rgba8Unorm,
        InternalFormat::Rgba8Snorm => F::Rgba8Snorm,
        InternalFormat::Rgba16I => F::Rgba16Sint,
        InternalFormat::Rgba32I => F::Rgba32Sint,
        InternalFormat::Rgba32F => F::Rgba32Float,
        InternalFormat::Rgb8
        | InternalFormat::Rgb8Snorm
        | InternalFormat::Rgb16I
        | InternalFormat::Rgb32I
        | InternalFormat::Rgb32F => {
            return Err(InteropError::UnsupportedFormat {
                channels: 3,
                dtype: format!("{format:?}"),
            });
        }
    };
    Ok(mapped)
}

fn filter(mode: FilterMode) -> (wgpu::FilterMode, Option<wgpu::MipmapFilterMode>) {
    match mode {
        FilterMode::Nearest => (wgpu::FilterMode::Nearest, None),
        FilterMode::Linear => (wgpu::FilterMode::Linear, None),
        FilterMode::LinearMipmapLinear => (wgpu::FilterMode::Linear, Some(wgpu::MipmapFilterMode::Linear)),
        FilterMode::LinearMipmapNearest => (wgpu::FilterMode::Linear, Some(wgpu::MipmapFilterMode::Nearest)),
    }
}

fn extent(spec: &ImageSpec) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: spec.extent.width as u32,
        height: spec.extent.height as u32,
        depth_or_array_layers: spec.extent.depth as u32,
    }
}

fn align_to(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

struct Offscreen {
    color: wgpu::Texture,
    depth: wgpu::Texture,
    width: u32,
    height: u32,
    bound_to: Option<ThreadId>,
}

struct BufferRecord {
    target: BufferTarget,
    buffer: Option<wgpu::Buffer>,
    size: usize,
    staging: Arc<Mutex<Vec<u8>>>,
    mapped: Option<MapAccess>,
}

struct TextureRecord {
    target: TextureTarget,
    texture: Option<wgpu::Texture>,
    spec: Option<ImageSpec>,
    sampler: Option<wgpu::Sampler>,
}

#[derive(Default)]
struct WgpuState {
    surfaces: FxHashMap<SurfaceId, Offscreen>,
    buffers: FxHashMap<RenderId, BufferRecord>,
    textures: FxHashMap<RenderId, TextureRecord>,
    bound_textures: FxHashMap<u32, RenderId>,
    viewport: (i32, i32, u32, u32),
    depth_test: bool,
}

impl WgpuState {
    fn current_surface(&self) -> Option<&Offscreen> {
        let me = thread::current().id();
        self.surfaces.values().find(|s| s.bound_to == Some(me))
    }

    fn render_call(&self, call: &'static str) -> Result<()> {
        if self.current_surface().is_none() {
            return Err(InteropError::render(call, "no surface is bound on this thread"));
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
}

struct StagingMapping {
    data: ArcMutexGuard<RawMutex, Vec<u8>>,
}

impl HostMapping for StagingMapping {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Render driver backed by a wgpu device.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    label: String,
    next_name: AtomicU32,
    state: Mutex<WgpuState>,
    errors: Arc<Mutex<VecDeque<String>>>,
}

impl WgpuDevice {
    /// Requests the default adapter and a device without surface support.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| InteropError::ContextInit(e.to_string()))?;

        let info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("myth-interop"),
            ..Default::default()
        }))
        .map_err(|e| InteropError::ContextInit(e.to_string()))?;

        let errors = Arc::new(Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&errors);
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| {
            sink.lock().push_back(error.to_string());
        }));

        log::info!("wgpu device ready: {} ({:?})", info.name, info.backend);
        Ok(Self {
            device,
            queue,
            label: format!("wgpu/{}", info.name),
            next_name: AtomicU32::new(1),
            state: Mutex::new(WgpuState::default()),
            errors,
        })
    }

    fn next_name(&self) -> u32 {
        self.next_name.fetch_add(1, Ordering::Relaxed)
    }

    fn wait(&self, call: &'static str) -> Result<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(drop)
            .map_err(|e| InteropError::render(call, e.to_string()))
    }

    /// Maps `buffer` for reading and copies out `len` bytes.
    fn read_mappable(&self, call: &'static str, buffer: &wgpu::Buffer, len: usize) -> Result<Vec<u8>> {
        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.wait(call)?;
        rx.recv()
            .map_err(|e| InteropError::render(call, e.to_string()))?
            .map_err(|e| InteropError::render(call, e.to_string()))?;
        let data = slice.get_mapped_range()[..len].to_vec();
        buffer.unmap();
        Ok(data)
    }

    fn read_buffer(&self, call: &'static str, source: &wgpu::Buffer, size: usize) -> Result<Vec<u8>> {
        let aligned = align_to(size, wgpu::COPY_BUFFER_ALIGNMENT as usize) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size: aligned,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Buffer Readback") });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, aligned);
        self.queue.submit(Some(encoder.finish()));
        self.read_mappable(call, &staging, size)
    }

    fn write_image(&self, texture: &wgpu::Texture, spec: &ImageSpec, data: &[u8]) {
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(spec.row_bytes() as u32),
                rows_per_image: Some(spec.extent.height as u32),
            },
            extent(spec),
        );
    }

    fn offscreen(&self, width: u32, height: u32) -> (wgpu::Texture, wgpu::Texture) {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let color = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Surface Color"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Surface Depth"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        (color, depth)
    }
}

impl RenderDevice for WgpuDevice {
    fn name(&self) -> &str {
        &self.label
    }

    // ------------------------------------------------------------------------
    // Surfaces
    // ------------------------------------------------------------------------

    fn create_surface(&self, desc: &SurfaceDescriptor) -> Result<SurfaceId> {
        if desc.samples > 1 {
            log::debug!("Off-screen surface '{}' renders single-sampled", desc.label);
        }
        let (color, depth) = self.offscreen(desc.width, desc.height);
        let id = SurfaceId::new(self.next_name());
        self.state.lock().surfaces.insert(
            id,
            Offscreen {
                color,
                depth,
                width: desc.width,
                height: desc.height,
                bound_to: None,
            },
        );
        Ok(id)
    }

    fn resize_surface(&self, surface: SurfaceId, width: u32, height: u32) -> Result<()> {
        let (color, depth) = self.offscreen(width, height);
        let mut state = self.state.lock();
        let record = state
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| InteropError::render("resize_surface", "unknown surface"))?;
        record.color.destroy();
        record.depth.destroy();
        record.color = color;
        record.depth = depth;
        record.width = width;
        record.height = height;
        Ok(())
    }

    fn bind_surface(&self, surface: SurfaceId) -> Result<()> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let record = state
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| InteropError::render("bind_surface", "unknown surface"))?;
        match record.bound_to {
            Some(owner) if owner != me => Err(InteropError::render("bind_surface", "surface is bound to another thread")),
            _ => {
                record.bound_to = Some(me);
                Ok(())
            }
        }
    }

    fn unbind_surface(&self, surface: SurfaceId) -> Result<()> {
        let mut state = self.state.lock();
        let record = state
            .surfaces
            .get_mut(&surface)
            .ok_or_else(|| InteropError::render("unbind_surface", "unknown surface"))?;
        record.bound_to = None;
        Ok(())
    }

    fn present(&self, surface: SurfaceId) -> Result<()> {
        if !self.state.lock().surfaces.contains_key(&surface) {
            return Err(InteropError::render("present", "unknown surface"));
        }
        self.queue.submit(std::iter::empty());
        self.wait("present")
    }

    fn destroy_surface(&self, surface: SurfaceId) -> Result<()> {
        let record = self
            .state
            .lock()
            .surfaces
            .remove(&surface)
            .ok_or_else(|| InteropError::render("destroy_surface", "unknown surface"))?;
        record.color.destroy();
        record.depth.destroy();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------------

    fn create_buffer(&self, target: BufferTarget) -> Result<RenderId> {
        let mut state = self.state.lock();
        state.render_call("create_buffer")?;
        let id = RenderId::new(self.next_name());
        state.buffers.insert(
            id,
            BufferRecord {
                target,
                buffer: None,
                size: 0,
                staging: Arc::new(Mutex::new(Vec::new())),
                mapped: None,
            },
        );
        Ok(id)
    }

    fn buffer_data(&self, buffer: RenderId, size: usize, _usage: BufferUsage) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("buffer_data")?;
        let record = state.buffer("buffer_data", buffer)?;
        if record.mapped.is_some() {
            return Err(InteropError::render("buffer_data", "buffer is mapped"));
        }
        let role = match record.target {
            BufferTarget::Array => wgpu::BufferUsages::VERTEX,
            BufferTarget::Element => wgpu::BufferUsages::INDEX,
        };
        let gpu = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Interop Buffer"),
            size: align_to(size, wgpu::COPY_BUFFER_ALIGNMENT as usize) as u64,
            usage: role | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if let Some(old) = record.buffer.replace(gpu) {
            old.destroy();
        }
        record.size = size;
        Ok(())
    }

    fn map_buffer(&self, buffer: RenderId, access: MapAccess) -> Result<Box<dyn HostMapping + '_>> {
        let mut state = self.state.lock();
        state.render_call("map_buffer")?;
        let record = state.buffer("map_buffer", buffer)?;
        if record.mapped.is_some() {
            return Err(InteropError::render("map_buffer", "buffer is already mapped"));
        }
        let contents = match record.buffer.as_ref() {
            Some(gpu) => self.read_buffer("map_buffer", gpu, record.size)?,
            None => Vec::new(),
        };
        *record.staging.lock() = contents;
        record.mapped = Some(access);
        let data = record.staging.lock_arc();
        Ok(Box::new(StagingMapping { data }))
    }

    fn unmap_buffer(&self, buffer: RenderId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("unmap_buffer")?;
        let record = state.buffer("unmap_buffer", buffer)?;
        let access = record
            .mapped
            .take()
            .ok_or_else(|| InteropError::render("unmap_buffer", "buffer is not mapped"))?;
        let mut staging = std::mem::take(&mut *record.staging.lock());
        if access.writable()
            && let Some(gpu) = record.buffer.as_ref()
        {
            staging.resize(align_to(staging.len(), wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
            self.queue.write_buffer(gpu, 0, &staging);
        }
        Ok(())
    }

    fn bind_buffer(&self, _target: BufferTarget, buffer: Option<RenderId>) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("bind_buffer")?;
        if let Some(id) = buffer {
            state.buffer("bind_buffer", id)?;
        }
        Ok(())
    }

    fn delete_buffer(&self, buffer: RenderId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("delete_buffer")?;
        let record = state
            .buffers
            .remove(&buffer)
            .ok_or_else(|| InteropError::render("delete_buffer", format!("unknown buffer {buffer}")))?;
        if let Some(gpu) = record.buffer {
            gpu.destroy();
        }
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
                texture: None,
                spec: None,
                sampler: None,
            },
        );
        Ok(id)
    }

    fn bind_texture(&self, _target: TextureTarget, texture: Option<RenderId>, unit: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("bind_texture")?;
        match texture {
            Some(id) => {
                state.texture("bind_texture", id)?;
                state.bound_textures.insert(unit, id);
            }
            None => {
                state.bound_textures.remove(&unit);
            }
        }
        Ok(())
    }

    fn tex_image(&self, texture: RenderId, spec: &ImageSpec, data: Option<&[u8]>) -> Result<()> {
        let format = texture_format(spec.internal_format)?;
        let mut state = self.state.lock();
        state.render_call("tex_image")?;
        let record = state.texture("tex_image", texture)?;
        let dimension = match record.target {
            TextureTarget::D1 => wgpu::TextureDimension::D1,
            TextureTarget::D2 | TextureTarget::Rectangle => wgpu::TextureDimension::D2,
            TextureTarget::D3 => wgpu::TextureDimension::D3,
        };
        let gpu = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Interop Texture"),
            size: extent(spec),
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        if let Some(data) = data {
            self.write_image(&gpu, spec, data);
        }
        if let Some(old) = record.texture.replace(gpu) {
            old.destroy();
        }
        record.spec = Some(*spec);
        Ok(())
    }

    fn tex_sub_image(&self, texture: RenderId, spec: &ImageSpec, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("tex_sub_image")?;
        let record = state.texture("tex_sub_image", texture)?;
        if record.spec.as_ref() != Some(spec) {
            return Err(InteropError::render("tex_sub_image", "no image with a matching layout"));
        }
        let gpu = record
            .texture
            .as_ref()
            .ok_or_else(|| InteropError::render("tex_sub_image", "texture has no image"))?;
        self.write_image(gpu, spec, data);
        Ok(())
    }

    fn set_sampling(&self, texture: RenderId, params: &TextureParameters) -> Result<()> {
        let border = self.device.features().contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        let address = |mode: WrapMode| match mode {
            WrapMode::Repeat => wgpu::AddressMode::Repeat,
            WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            WrapMode::ClampToBorder if border => wgpu::AddressMode::ClampToBorder,
            WrapMode::ClampToBorder => wgpu::AddressMode::ClampToEdge,
        };
        let (min_filter, mipmap_filter) = filter(params.min_filter);
        let (mag_filter, _) = filter(params.mag_filter);
        let all_linear = min_filter == wgpu::FilterMode::Linear
            && mag_filter == wgpu::FilterMode::Linear
            && mipmap_filter == Some(wgpu::MipmapFilterMode::Linear);

        let mut state = self.state.lock();
        state.render_call("set_sampling")?;
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Interop Sampler"),
            address_mode_u: address(params.wrap_s),
            address_mode_v: address(params.wrap_t),
            address_mode_w: address(params.wrap_r),
            mag_filter,
            min_filter,
            mipmap_filter: mipmap_filter.unwrap_or(wgpu::MipmapFilterMode::Nearest),
            anisotropy_clamp: if params.anisotropic && all_linear { 16 } else { 1 },
            compare: params.shadow_map.then_some(wgpu::CompareFunction::LessEqual),
            border_color: border.then_some(wgpu::SamplerBorderColor::OpaqueBlack),
            ..Default::default()
        });
        state.texture("set_sampling", texture)?.sampler = Some(sampler);
        Ok(())
    }

    fn generate_mipmap(&self, texture: RenderId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("generate_mipmap")?;
        state.texture("generate_mipmap", texture)?;
        log::trace!("Texture {texture} keeps its base level only on wgpu");
        Ok(())
    }

    fn read_tex_image(&self, texture: RenderId, format: PixelFormat, ty: GlType, dst: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("read_tex_image")?;
        let record = state.texture("read_tex_image", texture)?;
        let (Some(gpu), Some(spec)) = (record.texture.as_ref(), record.spec) else {
            return Err(InteropError::render("read_tex_image", "texture has no image"));
        };
        if spec.format != format || spec.ty != ty {
            return Err(InteropError::render("read_tex_image", "transfer layout differs from the image"));
        }
        if dst.len() != spec.byte_size() {
            return Err(InteropError::render("read_tex_image", "destination size mismatch"));
        }

        let row_bytes = spec.row_bytes();
        if row_bytes == 0 {
            return Ok(());
        }
        let padded = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize);
        let rows = spec.extent.height * spec.extent.depth;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture Readback"),
            size: (padded * rows) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Texture Readback") });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: gpu,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(spec.extent.height as u32),
                },
            },
            extent(&spec),
        );
        self.queue.submit(Some(encoder.finish()));

        let data = self.read_mappable("read_tex_image", &staging, padded * rows)?;
        for (row, chunk) in dst.chunks_exact_mut(row_bytes).enumerate() {
            chunk.copy_from_slice(&data[row * padded..row * padded + row_bytes]);
        }
        Ok(())
    }

    fn delete_texture(&self, texture: RenderId) -> Result<()> {
        let mut state = self.state.lock();
        state.render_call("delete_texture")?;
        let record = state
            .textures
            .remove(&texture)
            .ok_or_else(|| InteropError::render("delete_texture", format!("unknown texture {texture}")))?;
        state.bound_textures.retain(|_, bound| *bound != texture);
        if let Some(gpu) = record.texture {
            gpu.destroy();
        }
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
        let state = self.state.lock();
        let surface = state
            .current_surface()
            .ok_or_else(|| InteropError::render("clear", "no surface is bound on this thread"))?;
        let color_view = surface.color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = surface.depth.create_view(&wgpu::TextureViewDescriptor::default());
        let [r, g, b, a] = color.map(f64::from);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Clear") });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn poll_error(&self) -> Option<String> {
        self.errors.lock().pop_front()
    }
}
