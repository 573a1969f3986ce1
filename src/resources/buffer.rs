//! Array Buffers
//!
//! A [`Buffer`] is a render-API vertex or element buffer whose storage is
//! also registered with the compute interop layer after its first
//! allocation. Rows are laid out row-major along the first dimension; the
//! optional second dimension is the per-vertex attribute width.

use smallvec::SmallVec;

use super::{Resource, ResourceState, check_owner};
use crate::backend::{BufferTarget, BufferUsage, CopyKind, InteropId, MapAccess, RenderId};
use crate::context::Current;
use crate::dtype::{DType, GlType};
use crate::errors::{InteropError, Result};
use crate::mapping::{ScopedBufferMap, ScopedInteropMap};
use crate::render::Bindable;
use crate::tensor::{Device, Tensor};

/// Widest vertex attribute a buffer row may hold.
pub const MAX_COLUMNS: usize = 4;

/// A linear GPU array shared between the render API and the compute side.
#[derive(Debug)]
pub struct Buffer {
    context: u64,
    id: Option<RenderId>,
    registration: Option<InteropId>,
    target: BufferTarget,
    usage: BufferUsage,
    dtype: Option<DType>,
    shape: SmallVec<[usize; 2]>,
    byte_size: usize,

    /// Normalize integer attributes to `[0, 1]` / `[-1, 1]` when read by shaders.
    pub normalize: bool,
    /// Keep integer attributes as integers instead of widening them to float.
    pub integer_attrib: bool,
}

impl Buffer {
    pub(crate) fn new(cur: &Current<'_>, target: BufferTarget, usage: BufferUsage) -> Result<Self> {
        let id = cur.render().create_buffer(target)?;
        cur.check_errors("create_buffer")?;
        log::debug!("Created buffer {id} ({target:?}, {usage:?})");
        Ok(Self {
            context: cur.context_id(),
            id: Some(id),
            registration: None,
            target,
            usage,
            dtype: None,
            shape: SmallVec::new(),
            byte_size: 0,
            normalize: false,
            integer_attrib: false,
        })
    }

    fn live(&self, cur: &Current<'_>) -> Result<RenderId> {
        check_owner(self.context, cur)?;
        self.id.ok_or(InteropError::ResourceReleased)
    }

    /// The dtype of the described contents, as long as the storage still
    /// holds them.
    fn allocated_dtype(&self) -> Result<DType> {
        let dtype = self.dtype.ok_or(InteropError::NotAllocated)?;
        if dtype.size() * self.shape.iter().product::<usize>() > self.byte_size {
            return Err(InteropError::NotAllocated);
        }
        Ok(dtype)
    }

    /// Elements per row.
    fn columns(&self) -> usize {
        if self.shape.len() == 2 { self.shape[1] } else { 1 }
    }

    fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------------

    /// (Re)creates the render storage and makes sure it is registered.
    ///
    /// A registration of a different byte size is torn down first. Shape and
    /// dtype are left to the caller, which commits them only once the whole
    /// operation succeeded. If the new registration fails the buffer stays
    /// render-only.
    fn allocate_storage(&mut self, cur: &Current<'_>, size: usize) -> Result<()> {
        let id = self.live(cur)?;
        let render = cur.render();

        if size != self.byte_size
            && let Some(registration) = self.registration
        {
            cur.require_interop()?.unregister(registration)?;
            self.registration = None;
            log::debug!("Buffer {id} unregistered for resize ({} -> {size} bytes)", self.byte_size);
        }

        render.bind_buffer(self.target, Some(id))?;
        let allocated = render.buffer_data(id, size, self.usage);
        let unbound = render.bind_buffer(self.target, None);
        allocated?;
        unbound?;
        self.byte_size = size;

        if self.registration.is_none()
            && let Some(interop) = cur.interop()
        {
            self.registration = Some(interop.register_buffer(id)?);
            log::debug!("Buffer {id} registered for interop ({size} bytes)");
        }
        cur.check_errors("allocate")
    }

    /// Allocates storage for `rows × cols` elements of `dtype`.
    ///
    /// `cols == 0` makes a one-dimensional buffer. A zero byte size leaves the
    /// buffer untouched. Contents are undefined afterwards. On failure the
    /// previous shape and dtype are kept.
    pub fn allocate(&mut self, cur: &Current<'_>, rows: usize, cols: usize, dtype: DType) -> Result<()> {
        self.live(cur)?;
        if cols > MAX_COLUMNS {
            return Err(InteropError::ShapeMismatch(format!(
                "buffers hold at most {MAX_COLUMNS} columns, got {cols}"
            )));
        }
        let size = dtype.size() * rows * cols.max(1);
        if size == 0 {
            return Ok(());
        }

        self.allocate_storage(cur, size)?;
        self.dtype = Some(dtype);
        self.shape = if cols > 0 {
            SmallVec::from_slice(&[rows, cols])
        } else {
            SmallVec::from_slice(&[rows])
        };
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Transfers
    // ------------------------------------------------------------------------

    /// Replaces the contents with a copy of `tensor`, which must be 1-D or
    /// 2-D with at most [`MAX_COLUMNS`] columns.
    ///
    /// Device-resident tensors are copied device to device through the
    /// interop mapping. Without interop, host tensors are written through a
    /// render-API mapping. Shape and dtype change only when the copy
    /// succeeded.
    pub fn copy_from_tensor(&mut self, cur: &Current<'_>, tensor: &Tensor) -> Result<()> {
        let id = self.live(cur)?;
        let dtype = DType::try_from(tensor.dtype())?;
        match tensor.dim() {
            1 => {}
            2 if tensor.size(1) <= MAX_COLUMNS => {}
            2 => {
                return Err(InteropError::ShapeMismatch(format!(
                    "buffers hold at most {MAX_COLUMNS} columns, got {}",
                    tensor.size(1)
                )));
            }
            dim => {
                return Err(InteropError::ShapeMismatch(format!(
                    "buffers take 1-D or 2-D tensors, got {dim} dimensions"
                )));
            }
        }
        if tensor.is_cuda() && cur.interop().is_none() {
            return Err(InteropError::InteropUnavailable);
        }

        let size = tensor.nbytes();
        if size > 0 {
            self.allocate_storage(cur, size)?;
            match self.registration {
                Some(registration) => {
                    let kind = if tensor.is_cuda() {
                        CopyKind::DeviceToDevice
                    } else {
                        CopyKind::HostToDevice
                    };
                    let map = ScopedInteropMap::new(cur, registration)?;
                    map.write(0, &tensor.bytes(), kind)?;
                    map.finish()?;
                }
                None => {
                    let mut map = ScopedBufferMap::new(cur, id, MapAccess::WriteOnly)?;
                    map.bytes_mut()?[..size].copy_from_slice(&tensor.bytes());
                    map.finish()?;
                }
            }
            cur.check_errors("from_tensor")?;
        }

        self.dtype = Some(dtype);
        self.shape = SmallVec::from_slice(tensor.shape());
        Ok(())
    }

    /// Copies the contents into a new tensor.
    ///
    /// With `keep_on_device` the tensor lives on the compute device, which
    /// requires interop.
    pub fn to_tensor(&self, cur: &Current<'_>, keep_on_device: bool) -> Result<Tensor> {
        let id = self.live(cur)?;
        let dtype = self.allocated_dtype()?;
        let device = if keep_on_device {
            cur.require_interop()?.device()
        } else {
            Device::Cpu
        };

        let output = Tensor::zeros(&self.shape, dtype.scalar_type(), device);
        let size = output.nbytes();
        if size == 0 {
            return Ok(output);
        }

        match self.registration {
            Some(registration) => {
                let kind = if keep_on_device {
                    CopyKind::DeviceToDevice
                } else {
                    CopyKind::DeviceToHost
                };
                let map = ScopedInteropMap::new(cur, registration)?;
                map.read(0, &mut output.bytes_mut(), kind)?;
                map.finish()?;
            }
            None => {
                let map = ScopedBufferMap::new(cur, id, MapAccess::ReadOnly)?;
                output.bytes_mut().copy_from_slice(&map.bytes()[..size]);
                map.finish()?;
            }
        }
        cur.check_errors("to_tensor")?;
        Ok(output)
    }

    // ------------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------------

    /// Validates `Int64` row indices against the first dimension.
    fn checked_rows(&self, indices: &[i64]) -> Result<Vec<usize>> {
        let rows = self.rows();
        indices
            .iter()
            .map(|&index| {
                usize::try_from(index)
                    .ok()
                    .filter(|&row| row < rows)
                    .ok_or(InteropError::IndexOutOfRange { index, size: rows })
            })
            .collect()
    }

    /// Writes row `i` of `values` to row `indices[i]`.
    ///
    /// Device-resident operands run the interop scatter kernel. Host operands
    /// are written through a render-API mapping.
    pub fn index_put(&mut self, cur: &Current<'_>, indices: &Tensor, values: &Tensor) -> Result<()> {
        let id = self.live(cur)?;
        let dtype = self.allocated_dtype()?;
        if indices.size(0) != values.size(0) {
            return Err(InteropError::ShapeMismatch(format!(
                "{} indices for {} value rows",
                indices.size(0),
                values.size(0)
            )));
        }
        if indices.device() != values.device() {
            return Err(InteropError::DeviceMismatch(format!(
                "indices on {}, values on {}",
                indices.device(),
                values.device()
            )));
        }
        let index_values = indices.indices()?;
        if index_values.is_empty() {
            return Ok(());
        }
        if DType::try_from(values.dtype())? != dtype {
            return Err(InteropError::UnsupportedType(format!(
                "cannot write {} values into a {dtype:?} buffer",
                values.dtype()
            )));
        }
        let cols = self.columns();
        if values.numel() != index_values.len() * cols {
            return Err(InteropError::ShapeMismatch(format!(
                "value rows must hold {cols} elements, got shape {:?}",
                values.shape()
            )));
        }
        let rows = self.checked_rows(&index_values)?;
        let row_bytes = cols * dtype.size();

        if values.is_cuda() {
            let registration = self.registration.ok_or(InteropError::InteropUnavailable)?;
            let map = ScopedInteropMap::new(cur, registration)?;
            map.scatter_rows(&index_values, &values.bytes(), row_bytes)?;
            map.finish()?;
        } else {
            let mut map = ScopedBufferMap::new(cur, id, MapAccess::WriteOnly)?;
            let dst = map.bytes_mut()?;
            let src = values.bytes();
            for (i, row) in rows.into_iter().enumerate() {
                dst[row * row_bytes..(row + 1) * row_bytes].copy_from_slice(&src[i * row_bytes..(i + 1) * row_bytes]);
            }
            drop(src);
            map.finish()?;
        }
        cur.check_errors("index_put")
    }

    /// Reads the rows at `indices` into a new tensor.
    ///
    /// `keep_on_device` selects the interop gather kernel and requires
    /// device-resident indices; otherwise the indices must be on the host.
    /// One-dimensional buffers yield a 1-D result.
    pub fn index_select(&self, cur: &Current<'_>, indices: &Tensor, keep_on_device: bool) -> Result<Tensor> {
        let id = self.live(cur)?;
        let dtype = self.allocated_dtype()?;
        if keep_on_device != indices.is_cuda() {
            return Err(InteropError::DeviceMismatch(format!(
                "indices must reside on the {} when keep_on_device is {keep_on_device}",
                if keep_on_device { "compute device" } else { "host" }
            )));
        }
        let index_values = indices.indices()?;
        let cols = self.columns();
        let count = index_values.len();
        let shape: SmallVec<[usize; 2]> = if self.shape.len() == 2 {
            SmallVec::from_slice(&[count, cols])
        } else {
            SmallVec::from_slice(&[count])
        };
        let output = Tensor::zeros(&shape, dtype.scalar_type(), indices.device());
        if count == 0 {
            return Ok(output);
        }
        let rows = self.checked_rows(&index_values)?;
        let row_bytes = cols * dtype.size();

        if keep_on_device {
            let registration = self.registration.ok_or(InteropError::InteropUnavailable)?;
            let map = ScopedInteropMap::new(cur, registration)?;
            map.gather_rows(&index_values, &mut output.bytes_mut(), row_bytes)?;
            map.finish()?;
        } else {
            let map = ScopedBufferMap::new(cur, id, MapAccess::ReadOnly)?;
            let src = map.bytes();
            let mut dst = output.bytes_mut();
            for (i, row) in rows.into_iter().enumerate() {
                dst[i * row_bytes..(i + 1) * row_bytes].copy_from_slice(&src[row * row_bytes..(row + 1) * row_bytes]);
            }
            drop(dst);
            map.finish()?;
        }
        cur.check_errors("index_select")?;
        Ok(output)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    #[must_use]
    pub fn dims(&self) -> usize {
        self.shape.len()
    }

    /// Extent of dimension `i`, or 0 past the last dimension.
    #[inline]
    #[must_use]
    pub fn size(&self, i: usize) -> usize {
        self.shape.get(i).copied().unwrap_or(0)
    }

    /// `None` until the first allocation.
    #[inline]
    #[must_use]
    pub fn dtype(&self) -> Option<DType> {
        self.dtype
    }

    #[inline]
    #[must_use]
    pub fn render_type(&self) -> Option<GlType> {
        self.dtype.map(DType::render_type)
    }

    /// `None` once released.
    #[inline]
    #[must_use]
    pub fn render_id(&self) -> Option<RenderId> {
        self.id
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shape.is_empty() || self.shape.contains(&0)
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    #[must_use]
    pub fn state(&self) -> ResourceState {
        match (self.id, self.registration) {
            (None, _) => ResourceState::Released,
            (Some(_), Some(_)) => ResourceState::Registered,
            (Some(_), None) if self.byte_size > 0 => ResourceState::RenderOnly,
            (Some(_), None) => ResourceState::Unallocated,
        }
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> BufferTarget {
        self.target
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Bindable for Buffer {
    fn bind(&self, cur: &Current<'_>) -> Result<()> {
        let id = self.live(cur)?;
        cur.render().bind_buffer(self.target, Some(id))
    }

    fn unbind(&self, cur: &Current<'_>) -> Result<()> {
        self.live(cur)?;
        cur.render().bind_buffer(self.target, None)
    }
}

impl Resource for Buffer {
    fn release(&mut self, cur: &Current<'_>) -> Result<()> {
        let Some(id) = self.id else {
            return Ok(());
        };
        check_owner(self.context, cur)?;
        if let Some(registration) = self.registration {
            cur.require_interop()?.unregister(registration)?;
            self.registration = None;
        }
        cur.render().delete_buffer(id)?;
        self.id = None;
        self.byte_size = 0;
        log::debug!("Released buffer {id}");
        Ok(())
    }

    fn is_released(&self) -> bool {
        self.id.is_none()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            log::warn!("Buffer {id} dropped without release; its native handles leak");
        }
    }
}
