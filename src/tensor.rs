//! Typed Arrays
//!
//! [`Tensor`] is the array type exchanged with the compute framework: a
//! row-major shape, a [`ScalarType`], a residency [`Device`] and contiguous
//! byte storage. Clones and views share storage, mirroring the reference
//! semantics of framework tensors.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;

use crate::dtype::ScalarType;
use crate::errors::{InteropError, Result};

/// Shape storage. Rank four covers every layout the interop layer produces.
pub type Shape = SmallVec<[usize; 4]>;

/// Where a tensor's storage resides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// Compute device with the given ordinal.
    Cuda(u32),
}

impl Device {
    #[inline]
    #[must_use]
    pub fn is_cpu(self) -> bool {
        matches!(self, Self::Cpu)
    }

    #[inline]
    #[must_use]
    pub fn is_cuda(self) -> bool {
        matches!(self, Self::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

/// Rust scalar types that can back a [`Tensor`].
pub trait Element: bytemuck::Pod + Send + Sync + 'static {
    const SCALAR: ScalarType;
}

macro_rules! impl_element {
    ($($ty:ty => $scalar:ident),* $(,)?) => {
        $(impl Element for $ty {
            const SCALAR: ScalarType = ScalarType::$scalar;
        })*
    };
}

impl_element! {
    f64 => Float64,
    i64 => Int64,
    f32 => Float32,
    i32 => Int32,
    i16 => Int16,
    u8 => UInt8,
    i8 => Int8,
}

/// A contiguous, row-major typed array.
#[derive(Clone)]
pub struct Tensor {
    shape: Shape,
    dtype: ScalarType,
    device: Device,
    storage: Arc<RwLock<Vec<u8>>>,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape.as_slice())
            .field("dtype", &self.dtype)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

fn numel_of(shape: &[usize]) -> usize {
    shape.iter().product()
}

impl Tensor {
    /// Copies `data` into a new host tensor of the given shape.
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize]) -> Result<Self> {
        if numel_of(shape) != data.len() {
            return Err(InteropError::ShapeMismatch(format!(
                "shape {shape:?} holds {} elements, got {}",
                numel_of(shape),
                data.len()
            )));
        }
        Ok(Self {
            shape: Shape::from_slice(shape),
            dtype: T::SCALAR,
            device: Device::Cpu,
            storage: Arc::new(RwLock::new(bytemuck::cast_slice(data).to_vec())),
        })
    }

    /// A zero-filled tensor.
    #[must_use]
    pub fn zeros(shape: &[usize], dtype: ScalarType, device: Device) -> Self {
        let nbytes = numel_of(shape) * dtype.element_size();
        Self {
            shape: Shape::from_slice(shape),
            dtype,
            device,
            storage: Arc::new(RwLock::new(vec![0u8; nbytes])),
        }
    }

    /// Returns a copy of this tensor resident on `device`.
    #[must_use]
    pub fn to_device(&self, device: Device) -> Self {
        Self {
            shape: self.shape.clone(),
            dtype: self.dtype,
            device,
            storage: Arc::new(RwLock::new(self.storage.read().clone())),
        }
    }

    /// Copies the elements out as `T`, which must match the tensor dtype.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::SCALAR != self.dtype {
            return Err(InteropError::UnsupportedType(format!(
                "cannot read {} tensor as {}",
                self.dtype,
                T::SCALAR
            )));
        }
        let bytes = self.storage.read();
        Ok(bytemuck::pod_collect_to_vec::<u8, T>(&bytes))
    }

    /// A view with a new shape over the same storage.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        if numel_of(shape) != self.numel() {
            return Err(InteropError::ShapeMismatch(format!(
                "cannot view {:?} as {shape:?}",
                self.shape.as_slice()
            )));
        }
        Ok(Self {
            shape: Shape::from_slice(shape),
            dtype: self.dtype,
            device: self.device,
            storage: Arc::clone(&self.storage),
        })
    }

    #[inline]
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    /// Extent of dimension `i`, or 0 past the last dimension.
    #[inline]
    #[must_use]
    pub fn size(&self, i: usize) -> usize {
        self.shape.get(i).copied().unwrap_or(0)
    }

    #[inline]
    #[must_use]
    pub fn numel(&self) -> usize {
        numel_of(&self.shape)
    }

    #[inline]
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.numel() * self.dtype.element_size()
    }

    #[inline]
    #[must_use]
    pub fn dtype(&self) -> ScalarType {
        self.dtype
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    #[inline]
    #[must_use]
    pub fn is_cpu(&self) -> bool {
        self.device.is_cpu()
    }

    #[inline]
    #[must_use]
    pub fn is_cuda(&self) -> bool {
        self.device.is_cuda()
    }

    /// Whether two tensors are views of the same storage.
    #[must_use]
    pub fn shares_storage(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Raw little-endian element bytes.
    pub fn bytes(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.storage.read()
    }

    pub fn bytes_mut(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.storage.write()
    }

    /// Reads an `Int64` index tensor.
    pub(crate) fn indices(&self) -> Result<Vec<i64>> {
        if self.dtype != ScalarType::Int64 {
            return Err(InteropError::UnsupportedType(format!(
                "index tensors must be int64, got {}",
                self.dtype
            )));
        }
        if self.dim() != 1 {
            return Err(InteropError::ShapeMismatch(format!(
                "index tensors must be 1-D, got shape {:?}",
                self.shape.as_slice()
            )));
        }
        self.to_vec::<i64>()
    }
}
