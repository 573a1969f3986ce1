//! Driver vocabulary shared by [`RenderDevice`](super::RenderDevice) and
//! [`ComputeInterop`](super::ComputeInterop).

use std::fmt;

use crate::dtype::{GlType, ScalarType};
use crate::errors::InteropError;

// ============================================================================
// Native Handles
// ============================================================================

/// Render-API object name (buffer or texture).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderId(u32);

impl RenderId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Native surface (window or off-screen) owned by a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u32);

impl SurfaceId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Compute-interop registration of a render object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InteropId(u64);

impl InteropId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

// ============================================================================
// Surfaces
// ============================================================================

/// Parameters of the native surface created on first bind.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceDescriptor {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub core_profile: bool,
    pub samples: u32,
}

// ============================================================================
// Buffers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferTarget {
    /// Vertex attributes.
    #[default]
    Array,
    /// Element indices.
    Element,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Contents are rewritten often.
    #[default]
    Dynamic,
    /// Contents are written once.
    Static,
}

/// Access requested when mapping a buffer into host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl MapAccess {
    #[inline]
    #[must_use]
    pub fn writable(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

// ============================================================================
// Textures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    D1,
    D2,
    D3,
    Rectangle,
}

impl TextureTarget {
    /// Number of spatial dimensions.
    #[must_use]
    pub fn rank(self) -> usize {
        match self {
            Self::D1 => 1,
            Self::D2 | Self::Rectangle => 2,
            Self::D3 => 3,
        }
    }
}

/// Sized internal storage format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InternalFormat {
    R8,
    R8Snorm,
    R16I,
    R32I,
    R32F,
    Rgb8,
    Rgb8Snorm,
    Rgb16I,
    Rgb32I,
    Rgb32F,
    Rgba8,
    Rgba8Snorm,
    Rgba16I,
    Rgba32I,
    Rgba32F,
}

impl InternalFormat {
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::R8 | Self::R8Snorm | Self::R16I | Self::R32I | Self::R32F => 1,
            Self::Rgb8 | Self::Rgb8Snorm | Self::Rgb16I | Self::Rgb32I | Self::Rgb32F => 3,
            Self::Rgba8 | Self::Rgba8Snorm | Self::Rgba16I | Self::Rgba32I | Self::Rgba32F => 4,
        }
    }

    /// Whether the compute interop layer can register textures of this format.
    #[must_use]
    pub fn is_interop_compatible(self) -> bool {
        matches!(
            self,
            Self::R8
                | Self::R16I
                | Self::R32I
                | Self::R32F
                | Self::Rgb8
                | Self::Rgb32I
                | Self::Rgb32F
                | Self::Rgba8
                | Self::Rgba16I
                | Self::Rgba32I
                | Self::Rgba32F
        )
    }

    /// Element format of the array the interop layer exposes for this format.
    #[must_use]
    pub fn array_format(self) -> ArrayFormat {
        match self {
            Self::R8 | Self::Rgb8 | Self::Rgba8 => ArrayFormat::UnsignedInt8,
            Self::R8Snorm | Self::Rgb8Snorm | Self::Rgba8Snorm => ArrayFormat::SignedInt8,
            Self::R16I | Self::Rgb16I | Self::Rgba16I => ArrayFormat::SignedInt16,
            Self::R32I | Self::Rgb32I | Self::Rgba32I => ArrayFormat::SignedInt32,
            Self::R32F | Self::Rgb32F | Self::Rgba32F => ArrayFormat::Float,
        }
    }
}

/// Layout of pixel data handed to or read from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Red,
    Rgb,
    Rgba,
    RedInteger,
    RgbInteger,
    RgbaInteger,
}

impl PixelFormat {
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Red | Self::RedInteger => 1,
            Self::Rgb | Self::RgbInteger => 3,
            Self::Rgba | Self::RgbaInteger => 4,
        }
    }
}

/// Texel extent. Unused dimensions are 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Extent {
    #[must_use]
    pub const fn new(width: usize, height: usize, depth: usize) -> Self {
        Self { width, height, depth }
    }

    #[must_use]
    pub fn texels(self) -> usize {
        self.width * self.height * self.depth
    }
}

/// Full description of a texture image specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    pub target: TextureTarget,
    pub internal_format: InternalFormat,
    pub extent: Extent,
    pub format: PixelFormat,
    pub ty: GlType,
}

impl ImageSpec {
    /// Bytes of one tightly packed row.
    #[must_use]
    pub fn row_bytes(&self) -> usize {
        self.extent.width * self.format.channels() * self.ty.size()
    }

    /// Bytes of the whole tightly packed image.
    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.extent.texels() * self.format.channels() * self.ty.size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
    LinearMipmapLinear,
    LinearMipmapNearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
    ClampToBorder,
}

/// Sampling state applied to a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureParameters {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    /// Only used by 3-D textures.
    pub wrap_r: WrapMode,
    pub anisotropic: bool,
    pub shadow_map: bool,
}

impl TextureParameters {
    #[must_use]
    pub const fn new(
        min_filter: FilterMode,
        mag_filter: FilterMode,
        wrap_s: WrapMode,
        wrap_t: WrapMode,
        anisotropic: bool,
    ) -> Self {
        Self {
            min_filter,
            mag_filter,
            wrap_s,
            wrap_t,
            wrap_r: WrapMode::Repeat,
            anisotropic,
            shadow_map: false,
        }
    }

    #[must_use]
    pub const fn good_quality() -> Self {
        Self::new(FilterMode::LinearMipmapLinear, FilterMode::Linear, WrapMode::Repeat, WrapMode::Repeat, false)
    }

    #[must_use]
    pub const fn medium_quality() -> Self {
        Self::new(FilterMode::LinearMipmapNearest, FilterMode::Linear, WrapMode::Repeat, WrapMode::Repeat, true)
    }

    #[must_use]
    pub const fn poor_quality() -> Self {
        Self::new(FilterMode::Nearest, FilterMode::Nearest, WrapMode::Repeat, WrapMode::Repeat, true)
    }

    /// Preset for rectangle textures, which have no mipmaps.
    #[must_use]
    pub const fn rect_good() -> Self {
        Self::new(FilterMode::Linear, FilterMode::Linear, WrapMode::ClampToBorder, WrapMode::ClampToBorder, true)
    }

    /// Fixed sampling used for volume textures.
    #[must_use]
    pub const fn volume() -> Self {
        Self::new(FilterMode::Linear, FilterMode::Linear, WrapMode::Repeat, WrapMode::Repeat, false)
    }
}

impl Default for TextureParameters {
    fn default() -> Self {
        Self::good_quality()
    }
}

// ============================================================================
// Compute Interop
// ============================================================================

/// Direction of a copy through an interop mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyKind {
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

/// Element format of a mapped interop array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayFormat {
    UnsignedInt8,
    UnsignedInt16,
    UnsignedInt32,
    SignedInt8,
    SignedInt16,
    SignedInt32,
    Half,
    Float,
}

/// Description of the array behind a mapped texture registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDescriptor {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub channels: usize,
    pub format: ArrayFormat,
}

impl TryFrom<ArrayFormat> for ScalarType {
    type Error = InteropError;

    fn try_from(format: ArrayFormat) -> Result<Self, Self::Error> {
        match format {
            ArrayFormat::UnsignedInt8 => Ok(Self::UInt8),
            ArrayFormat::SignedInt8 => Ok(Self::Int8),
            ArrayFormat::SignedInt16 => Ok(Self::Int16),
            ArrayFormat::SignedInt32 => Ok(Self::Int32),
            ArrayFormat::Half => Ok(Self::Float16),
            ArrayFormat::Float => Ok(Self::Float32),
            ArrayFormat::UnsignedInt16 | ArrayFormat::UnsignedInt32 => Err(InteropError::UnsupportedType(
                format!("array format {format:?} has no compute scalar type"),
            )),
        }
    }
}
