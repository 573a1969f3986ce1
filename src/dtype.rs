//! Numeric-Type Bridge
//!
//! Three vocabularies describe the element type of a buffer or texture:
//!
//! - [`DType`]: the library tag exposed to callers
//! - [`GlType`]: the render-API scalar enum (GL constants)
//! - [`ScalarType`]: the compute framework scalar enum
//!
//! The supported subset is a closed table. Every tag maps to exactly one
//! render scalar and one compute scalar, and back. Values outside the table
//! fail with [`InteropError::UnsupportedType`] at the boundary.

use std::fmt;

use crate::errors::{InteropError, Result};

/// Render-API scalar type. Discriminants are the GL enum values.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlType {
    Byte = 0x1400,
    UnsignedByte = 0x1401,
    Short = 0x1402,
    UnsignedShort = 0x1403,
    Int = 0x1404,
    UnsignedInt = 0x1405,
    Float = 0x1406,
    Double = 0x140A,
    HalfFloat = 0x140B,
    /// `GL_INT64_ARB`
    Int64 = 0x140E,
    /// `GL_UNSIGNED_INT64_ARB`
    UnsignedInt64 = 0x140F,
}

impl GlType {
    /// Size in bytes of one element.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort | Self::HalfFloat => 2,
            Self::Int | Self::UnsignedInt | Self::Float => 4,
            Self::Double | Self::Int64 | Self::UnsignedInt64 => 8,
        }
    }

    /// The raw GL enum value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

/// Compute framework scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Float64,
    Int64,
    Float32,
    Int32,
    Int16,
    UInt8,
    Int8,
    Float16,
    Bool,
}

impl ScalarType {
    /// Storage size of one element, including types the bridge rejects.
    #[must_use]
    pub const fn element_size(self) -> usize {
        match self {
            Self::Float64 | Self::Int64 => 8,
            Self::Float32 | Self::Int32 => 4,
            Self::Int16 | Self::Float16 => 2,
            Self::UInt8 | Self::Int8 | Self::Bool => 1,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float64 => "float64",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Int32 => "int32",
            Self::Int16 => "int16",
            Self::UInt8 => "uint8",
            Self::Int8 => "int8",
            Self::Float16 => "float16",
            Self::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// Library type tag. Shares its discriminants with [`GlType`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Double = 0x140A,
    Int64 = 0x140E,
    Float = 0x1406,
    Int32 = 0x1404,
    Int16 = 0x1402,
    Uint8 = 0x1401,
    Int8 = 0x1400,
}

/// One row of the bridge table.
#[derive(Debug, Clone, Copy)]
struct DTypeEntry {
    tag: DType,
    size: usize,
    render: GlType,
    compute: ScalarType,
}

impl DTypeEntry {
    const fn new(tag: DType, size: usize, render: GlType, compute: ScalarType) -> Self {
        Self { tag, size, render, compute }
    }
}

const DTYPE_TABLE: [DTypeEntry; 7] = [
    DTypeEntry::new(DType::Double, 8, GlType::Double, ScalarType::Float64),
    DTypeEntry::new(DType::Int64, 8, GlType::Int64, ScalarType::Int64),
    DTypeEntry::new(DType::Float, 4, GlType::Float, ScalarType::Float32),
    DTypeEntry::new(DType::Int32, 4, GlType::Int, ScalarType::Int32),
    DTypeEntry::new(DType::Int16, 2, GlType::Short, ScalarType::Int16),
    DTypeEntry::new(DType::Uint8, 1, GlType::UnsignedByte, ScalarType::UInt8),
    DTypeEntry::new(DType::Int8, 1, GlType::Byte, ScalarType::Int8),
];

impl DType {
    /// Every supported tag, in table order.
    pub const ALL: [DType; 7] = [
        DType::Double,
        DType::Int64,
        DType::Float,
        DType::Int32,
        DType::Int16,
        DType::Uint8,
        DType::Int8,
    ];

    const fn entry(self) -> DTypeEntry {
        let index = match self {
            DType::Double => 0,
            DType::Int64 => 1,
            DType::Float => 2,
            DType::Int32 => 3,
            DType::Int16 => 4,
            DType::Uint8 => 5,
            DType::Int8 => 6,
        };
        DTYPE_TABLE[index]
    }

    /// Size in bytes of one element.
    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        self.entry().size
    }

    #[inline]
    #[must_use]
    pub const fn render_type(self) -> GlType {
        self.entry().render
    }

    #[inline]
    #[must_use]
    pub const fn scalar_type(self) -> ScalarType {
        self.entry().compute
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.scalar_type(), f)
    }
}

impl From<DType> for GlType {
    fn from(tag: DType) -> Self {
        tag.render_type()
    }
}

impl From<DType> for ScalarType {
    fn from(tag: DType) -> Self {
        tag.scalar_type()
    }
}

impl TryFrom<GlType> for DType {
    type Error = InteropError;

    fn try_from(ty: GlType) -> Result<Self> {
        DTYPE_TABLE
            .iter()
            .find(|e| e.render == ty)
            .map(|e| e.tag)
            .ok_or_else(|| InteropError::UnsupportedType(format!("render type {ty:?}")))
    }
}

impl TryFrom<ScalarType> for DType {
    type Error = InteropError;

    fn try_from(ty: ScalarType) -> Result<Self> {
        DTYPE_TABLE
            .iter()
            .find(|e| e.compute == ty)
            .map(|e| e.tag)
            .ok_or_else(|| InteropError::UnsupportedType(ty.to_string()))
    }
}

impl TryFrom<GlType> for ScalarType {
    type Error = InteropError;

    fn try_from(ty: GlType) -> Result<Self> {
        DType::try_from(ty).map(DType::scalar_type)
    }
}

impl TryFrom<ScalarType> for GlType {
    type Error = InteropError;

    fn try_from(ty: ScalarType) -> Result<Self> {
        DType::try_from(ty).map(DType::render_type)
    }
}

impl TryFrom<u32> for DType {
    type Error = InteropError;

    fn try_from(raw: u32) -> Result<Self> {
        DType::ALL
            .into_iter()
            .find(|tag| *tag as u32 == raw)
            .ok_or_else(|| InteropError::UnsupportedType(format!("type tag {raw:#06x}")))
    }
}

/// Byte size of a compute scalar type, failing outside the table.
pub fn type_size(ty: ScalarType) -> Result<usize> {
    DType::try_from(ty).map(DType::size)
}
