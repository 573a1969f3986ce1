//! Textures
//!
//! A [`Texture`] holds one base-level image whose render format is derived
//! from the `(channels, dtype)` of the tensor it is built from (see
//! [`image_format`]). 1-D, 2-D and rectangle textures of an interop
//! compatible format are also registered with the compute interop layer, so
//! [`Texture::to_tensor`] can copy device to device. Volume textures always
//! read back through the render API.
//!
//! Tensor layouts:
//!
//! | Target | Layout |
//! |---|---|
//! | 1-D | `[W]` or `[W, C]` |
//! | 2-D, rectangle | `[H, W]` or `[H, W, C]` |
//! | 3-D | `[D, H, W]` or `[D, H, W, C]` |

use super::format::image_format;
use super::{Resource, ResourceState, check_owner};
use crate::backend::{
    CopyKind, Extent, ImageSpec, InteropId, InternalFormat, PixelFormat, RenderId, TextureParameters, TextureTarget,
};
use crate::context::Current;
use crate::dtype::{DType, ScalarType};
use crate::errors::{InteropError, Result};
use crate::mapping::ScopedInteropMap;
use crate::render::Bindable;
use crate::tensor::{Device, Shape, Tensor};

/// Splits a tensor shape into texel extent and channel count for `target`.
fn layout(target: TextureTarget, shape: &[usize]) -> Result<(Extent, usize)> {
    let layout = match (target, shape) {
        (TextureTarget::D1, &[w]) => (Extent::new(w, 1, 1), 1),
        (TextureTarget::D1, &[w, c]) => (Extent::new(w, 1, 1), c),
        (TextureTarget::D2 | TextureTarget::Rectangle, &[h, w]) => (Extent::new(w, h, 1), 1),
        (TextureTarget::D2 | TextureTarget::Rectangle, &[h, w, c]) => (Extent::new(w, h, 1), c),
        (TextureTarget::D3, &[d, h, w]) => (Extent::new(w, h, d), 1),
        (TextureTarget::D3, &[d, h, w, c]) => (Extent::new(w, h, d), c),
        _ => {
            return Err(InteropError::ShapeMismatch(format!(
                "shape {shape:?} is not a {target:?} texture layout"
            )));
        }
    };
    Ok(layout)
}

/// Tensor shape of an image, the inverse of [`layout`].
fn tensor_shape(spec: &ImageSpec) -> Shape {
    let Extent { width, height, depth } = spec.extent;
    let mut shape = match spec.target {
        TextureTarget::D1 => Shape::from_slice(&[width]),
        TextureTarget::D2 | TextureTarget::Rectangle => Shape::from_slice(&[height, width]),
        TextureTarget::D3 => Shape::from_slice(&[depth, height, width]),
    };
    let channels = spec.format.channels();
    if channels > 1 {
        shape.push(channels);
    }
    shape
}

/// A 1-D, 2-D, 3-D or rectangle texture.
#[derive(Debug)]
pub struct Texture {
    context: u64,
    id: Option<RenderId>,
    registration: Option<InteropId>,
    target: TextureTarget,
    params: TextureParameters,
    image: Option<ImageSpec>,
    dtype: Option<DType>,
    /// Output of the interop read path, reused while its layout holds.
    cache: Option<Tensor>,
}

impl Texture {
    pub(crate) fn new(cur: &Current<'_>, target: TextureTarget) -> Result<Self> {
        let id = cur.render().create_texture(target)?;
        cur.check_errors("create_texture")?;
        log::debug!("Created texture {id} ({target:?})");
        let params = if target == TextureTarget::Rectangle {
            TextureParameters::rect_good()
        } else {
            TextureParameters::good_quality()
        };
        Ok(Self {
            context: cur.context_id(),
            id: Some(id),
            registration: None,
            target,
            params,
            image: None,
            dtype: None,
            cache: None,
        })
    }

    fn live(&self, cur: &Current<'_>) -> Result<RenderId> {
        check_owner(self.context, cur)?;
        self.id.ok_or(InteropError::ResourceReleased)
    }

    /// Image spec for a tensor-shaped request. Fails before any GPU call.
    fn spec_for(&self, shape: &[usize], dtype: DType) -> Result<ImageSpec> {
        let (extent, channels) = layout(self.target, shape)?;
        let (internal_format, format) = image_format(channels, dtype)?;
        Ok(ImageSpec {
            target: self.target,
            internal_format,
            extent,
            format,
            ty: dtype.render_type(),
        })
    }

    fn registrable(&self, spec: &ImageSpec) -> bool {
        self.target != TextureTarget::D3 && spec.internal_format.is_interop_compatible()
    }

    // ------------------------------------------------------------------------
    // Image Specification
    // ------------------------------------------------------------------------

    /// Re-specifies the image, re-applies sampling and re-registers.
    ///
    /// Rectangle textures keep their storage when the layout is unchanged.
    fn specify(&mut self, cur: &Current<'_>, spec: ImageSpec, dtype: DType, data: Option<&[u8]>) -> Result<()> {
        let id = self.live(cur)?;
        let render = cur.render();

        if let Some(registration) = self.registration {
            cur.require_interop()?.unregister(registration)?;
            self.registration = None;
        }

        let sampling = if self.target == TextureTarget::D3 {
            TextureParameters::volume()
        } else {
            self.params
        };
        render.bind_texture(self.target, Some(id), 0)?;
        let uploaded = match data {
            Some(data) if self.target == TextureTarget::Rectangle && self.image == Some(spec) => {
                render.tex_sub_image(id, &spec, data)
            }
            _ => render.tex_image(id, &spec, data),
        }
        .and_then(|()| render.set_sampling(id, &sampling));
        let unbound = render.bind_texture(self.target, None, 0);
        uploaded?;
        unbound?;
        self.image = Some(spec);
        self.dtype = Some(dtype);

        if self.registrable(&spec)
            && let Some(interop) = cur.interop()
        {
            self.registration = Some(interop.register_image(id, self.target)?);
            log::debug!("Texture {id} registered for interop ({:?})", spec.internal_format);
        }
        Ok(())
    }

    fn generate_mipmaps(&self, cur: &Current<'_>, id: RenderId) -> Result<()> {
        if self.target != TextureTarget::D2 {
            return Ok(());
        }
        let render = cur.render();
        render.bind_texture(self.target, Some(id), 0)?;
        let generated = render.generate_mipmap(id);
        let unbound = render.bind_texture(self.target, None, 0);
        generated?;
        unbound
    }

    /// Replaces the image with a copy of `image`.
    ///
    /// Device-resident images go straight into the interop mapping when the
    /// texture can be registered, and are staged through host memory
    /// otherwise. Unsupported layouts and formats fail before the texture is
    /// touched.
    pub fn copy_from_tensor(&mut self, cur: &Current<'_>, image: &Tensor) -> Result<()> {
        let id = self.live(cur)?;
        let dtype = DType::try_from(image.dtype())?;
        let spec = self.spec_for(image.shape(), dtype)?;

        if image.is_cuda() && self.registrable(&spec) && cur.interop().is_some() {
            self.specify(cur, spec, dtype, None)?;
            let registration = self.registration.ok_or(InteropError::InteropUnavailable)?;
            let map = ScopedInteropMap::new(cur, registration)?;
            map.write_array_2d(
                &image.bytes(),
                spec.row_bytes(),
                spec.extent.height * spec.extent.depth,
                CopyKind::DeviceToDevice,
            )?;
            map.finish()?;
        } else if image.is_cuda() {
            let staged = image.to_device(Device::Cpu);
            self.specify(cur, spec, dtype, Some(staged.bytes().as_slice()))?;
        } else {
            self.specify(cur, spec, dtype, Some(image.bytes().as_slice()))?;
        }

        self.generate_mipmaps(cur, id)?;
        cur.check_errors("from_tensor")?;
        log::debug!(
            "Texture {id} specified {}x{}x{} {:?}",
            spec.extent.width,
            spec.extent.height,
            spec.extent.depth,
            spec.internal_format
        );
        Ok(())
    }

    /// Allocates an uninitialised image of a tensor-shaped size.
    pub fn empty(&mut self, cur: &Current<'_>, dims: &[usize], dtype: DType) -> Result<()> {
        let id = self.live(cur)?;
        let spec = self.spec_for(dims, dtype)?;
        self.specify(cur, spec, dtype, None)?;
        self.generate_mipmaps(cur, id)?;
        cur.check_errors("empty")
    }

    // ------------------------------------------------------------------------
    // Read Back
    // ------------------------------------------------------------------------

    /// Copies the image into a tensor.
    ///
    /// Registered textures copy through the interop mapping into a cached
    /// output that is re-allocated only when its shape, dtype or device
    /// changes. The returned tensor is a view of that cache in the image's
    /// layout, so the next call overwrites it. Unless `non_blocking`, the compute device is
    /// synchronised before returning.
    ///
    /// Other textures read back into host memory, then move to the compute
    /// device if `keep_on_device`.
    pub fn to_tensor(&mut self, cur: &Current<'_>, keep_on_device: bool, non_blocking: bool) -> Result<Tensor> {
        let id = self.live(cur)?;
        let spec = self.image.ok_or(InteropError::NotAllocated)?;
        let device = if keep_on_device {
            cur.require_interop()?.device()
        } else {
            Device::Cpu
        };

        match self.registration {
            Some(registration) => self.read_mapped(cur, registration, &spec, device, non_blocking),
            None => {
                let dtype = self.dtype.ok_or(InteropError::NotAllocated)?;
                let output = Tensor::zeros(&tensor_shape(&spec), dtype.scalar_type(), Device::Cpu);
                let render = cur.render();
                render.bind_texture(self.target, Some(id), 0)?;
                let read = render.read_tex_image(id, spec.format, spec.ty, &mut output.bytes_mut());
                let unbound = render.bind_texture(self.target, None, 0);
                read?;
                unbound?;
                cur.check_errors("to_tensor")?;
                Ok(if device.is_cpu() { output } else { output.to_device(device) })
            }
        }
    }

    fn read_mapped(
        &mut self,
        cur: &Current<'_>,
        registration: InteropId,
        spec: &ImageSpec,
        device: Device,
        non_blocking: bool,
    ) -> Result<Tensor> {
        let interop = cur.require_interop()?;
        let map = ScopedInteropMap::new(cur, registration)?;
        let array = map.array()?;
        let scalar = ScalarType::try_from(array.format)?;
        let shape = [array.height * array.depth, array.width, array.channels];

        let output = match self.cache.as_ref() {
            Some(cache) if cache.shape() == shape.as_slice() && cache.dtype() == scalar && cache.device() == device => {
                cache.clone()
            }
            _ => {
                let fresh = Tensor::zeros(&shape, scalar, device);
                self.cache = Some(fresh.clone());
                fresh
            }
        };
        let kind = if device.is_cpu() {
            CopyKind::DeviceToHost
        } else {
            CopyKind::DeviceToDevice
        };
        let pitch = array.width * array.channels * scalar.element_size();
        map.read_array_2d(&mut output.bytes_mut(), pitch, shape[0], kind)?;
        if !non_blocking {
            interop.synchronize()?;
        }
        map.finish()?;
        cur.check_errors("to_tensor")?;
        output.reshape(&tensor_shape(spec))
    }

    // ------------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------------

    /// Stores and applies sampling parameters.
    pub fn set_parameters(&mut self, cur: &Current<'_>, params: TextureParameters) -> Result<()> {
        let id = self.live(cur)?;
        let render = cur.render();
        render.bind_texture(self.target, Some(id), 0)?;
        let applied = render.set_sampling(id, &params);
        let unbound = render.bind_texture(self.target, None, 0);
        applied?;
        unbound?;
        self.params = params;
        cur.check_errors("set_parameters")
    }

    #[inline]
    #[must_use]
    pub fn parameters(&self) -> TextureParameters {
        self.params
    }

    /// Binds to texture unit `unit`.
    pub fn bind_unit(&self, cur: &Current<'_>, unit: u32) -> Result<()> {
        let id = self.live(cur)?;
        cur.render().bind_texture(self.target, Some(id), unit)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn width(&self) -> usize {
        self.image.map_or(0, |spec| spec.extent.width)
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.image.map_or(0, |spec| spec.extent.height)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.image.map_or(0, |spec| spec.extent.depth)
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> TextureTarget {
        self.target
    }

    /// `None` until an image is specified.
    #[inline]
    #[must_use]
    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    #[must_use]
    pub fn internal_format(&self) -> Option<InternalFormat> {
        self.image.map(|spec| spec.internal_format)
    }

    #[must_use]
    pub fn format(&self) -> Option<PixelFormat> {
        self.image.map(|spec| spec.format)
    }

    #[inline]
    #[must_use]
    pub fn image_spec(&self) -> Option<&ImageSpec> {
        self.image.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn render_id(&self) -> Option<RenderId> {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> ResourceState {
        match (self.id, self.registration, self.image) {
            (None, ..) => ResourceState::Released,
            (Some(_), Some(_), _) => ResourceState::Registered,
            (Some(_), None, Some(_)) => ResourceState::RenderOnly,
            (Some(_), None, None) => ResourceState::Unallocated,
        }
    }
}

impl Bindable for Texture {
    fn bind(&self, cur: &Current<'_>) -> Result<()> {
        self.bind_unit(cur, 0)
    }

    fn unbind(&self, cur: &Current<'_>) -> Result<()> {
        self.live(cur)?;
        cur.render().bind_texture(self.target, None, 0)
    }
}

impl Resource for Texture {
    fn release(&mut self, cur: &Current<'_>) -> Result<()> {
        let Some(id) = self.id else {
            return Ok(());
        };
        check_owner(self.context, cur)?;
        if let Some(registration) = self.registration {
            cur.require_interop()?.unregister(registration)?;
            self.registration = None;
        }
        cur.render().delete_texture(id)?;
        self.id = None;
        self.cache = None;
        log::debug!("Released texture {id}");
        Ok(())
    }

    fn is_released(&self) -> bool {
        self.id.is_none()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            log::warn!("Texture {id} dropped without release; its native handles leak");
        }
    }
}
