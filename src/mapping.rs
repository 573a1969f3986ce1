//! Scoped Mapping Guards
//!
//! A mapping of a resource's backing memory lives exactly as long as the
//! guard that opened it. Every exit path, early returns included, runs the
//! matching unmap or unbind in `Drop`. Call `finish` to observe the release
//! error instead of having it logged.

use crate::backend::{
    ArrayDescriptor, ComputeInterop, CopyKind, HostMapping, InteropId, MapAccess, RenderDevice, RenderId,
};
use crate::context::Current;
use crate::errors::{InteropError, Result};
use crate::render::Bindable;

// ============================================================================
// Compute Interop Mapping
// ============================================================================

/// A registration mapped into the compute framework's address space.
pub struct ScopedInteropMap<'a> {
    interop: &'a dyn ComputeInterop,
    registration: InteropId,
    mapped: bool,
}

impl<'a> ScopedInteropMap<'a> {
    pub fn new(cur: &Current<'a>, registration: InteropId) -> Result<Self> {
        let interop = cur.require_interop()?;
        interop.map(registration)?;
        Ok(Self {
            interop,
            registration,
            mapped: true,
        })
    }

    /// Byte size of a mapped buffer.
    pub fn size(&self) -> Result<usize> {
        self.interop.mapped_size(self.registration)
    }

    pub fn array(&self) -> Result<ArrayDescriptor> {
        self.interop.mapped_array(self.registration)
    }

    pub fn write(&self, offset: usize, src: &[u8], kind: CopyKind) -> Result<()> {
        self.interop.copy_to_mapped(self.registration, offset, src, kind)
    }

    pub fn read(&self, offset: usize, dst: &mut [u8], kind: CopyKind) -> Result<()> {
        self.interop.copy_from_mapped(self.registration, offset, dst, kind)
    }

    pub fn scatter_rows(&self, indices: &[i64], src: &[u8], row_bytes: usize) -> Result<()> {
        self.interop.scatter_rows(self.registration, indices, src, row_bytes)
    }

    pub fn gather_rows(&self, indices: &[i64], dst: &mut [u8], row_bytes: usize) -> Result<()> {
        self.interop.gather_rows(self.registration, indices, dst, row_bytes)
    }

    pub fn read_array_2d(&self, dst: &mut [u8], pitch: usize, rows: usize, kind: CopyKind) -> Result<()> {
        self.interop.copy_from_array_2d(self.registration, dst, pitch, rows, kind)
    }

    pub fn write_array_2d(&self, src: &[u8], pitch: usize, rows: usize, kind: CopyKind) -> Result<()> {
        self.interop.copy_to_array_2d(self.registration, src, pitch, rows, kind)
    }

    /// Unmaps now and reports the result.
    pub fn finish(mut self) -> Result<()> {
        self.mapped = false;
        self.interop.unmap(self.registration)
    }
}

impl Drop for ScopedInteropMap<'_> {
    fn drop(&mut self) {
        if self.mapped
            && let Err(err) = self.interop.unmap(self.registration)
        {
            log::error!("Failed to unmap interop registration {}: {err}", self.registration.get());
        }
    }
}

// ============================================================================
// Render Buffer Mapping
// ============================================================================

/// A render buffer mapped into host memory.
pub struct ScopedBufferMap<'a> {
    render: &'a dyn RenderDevice,
    buffer: RenderId,
    access: MapAccess,
    mapping: Option<Box<dyn HostMapping + 'a>>,
}

impl<'a> ScopedBufferMap<'a> {
    pub fn new(cur: &Current<'a>, buffer: RenderId, access: MapAccess) -> Result<Self> {
        let render = cur.render();
        let mapping = render.map_buffer(buffer, access)?;
        Ok(Self {
            render,
            buffer,
            access,
            mapping: Some(mapping),
        })
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match &self.mapping {
            Some(mapping) => mapping.bytes(),
            None => &[],
        }
    }

    pub fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        if !self.access.writable() {
            return Err(InteropError::ReadOnlyMapping);
        }
        match self.mapping.as_mut() {
            Some(mapping) => Ok(mapping.bytes_mut()),
            None => Ok(&mut []),
        }
    }

    fn unmap(&mut self) -> Result<()> {
        match self.mapping.take() {
            Some(mapping) => {
                drop(mapping);
                self.render.unmap_buffer(self.buffer)
            }
            None => Ok(()),
        }
    }

    /// Unmaps now and reports the result.
    pub fn finish(mut self) -> Result<()> {
        self.unmap()
    }
}

impl Drop for ScopedBufferMap<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.unmap() {
            log::error!("Failed to unmap buffer {}: {err}", self.buffer);
        }
    }
}

// ============================================================================
// Binding
// ============================================================================

/// Keeps `target` bound until the guard goes away.
pub struct ScopedBind<'a, T: Bindable + ?Sized> {
    cur: &'a Current<'a>,
    target: &'a T,
    bound: bool,
}

impl<'a, T: Bindable + ?Sized> ScopedBind<'a, T> {
    pub fn new(cur: &'a Current<'a>, target: &'a T) -> Result<Self> {
        target.bind(cur)?;
        Ok(Self {
            cur,
            target,
            bound: true,
        })
    }

    /// Unbinds now and reports the result.
    pub fn finish(mut self) -> Result<()> {
        self.bound = false;
        self.target.unbind(self.cur)
    }
}

impl<T: Bindable + ?Sized> Drop for ScopedBind<'_, T> {
    fn drop(&mut self) {
        if self.bound
            && let Err(err) = self.target.unbind(self.cur)
        {
            log::error!("Failed to unbind on scope exit: {err}");
        }
    }
}
