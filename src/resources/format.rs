//! Texture format lookup from `(channels, dtype)`.

use crate::backend::{InternalFormat, PixelFormat};
use crate::dtype::DType;
use crate::errors::{InteropError, Result};

/// Internal storage format and transfer format for an image with
/// `channels` components of `dtype`.
///
/// Only 1, 3 and 4 channels of `Float`, `Int32`, `Int16`, `Uint8` and
/// `Int8` are supported. Everything else is
/// [`InteropError::UnsupportedFormat`].
pub fn image_format(channels: usize, dtype: DType) -> Result<(InternalFormat, PixelFormat)> {
    use InternalFormat as I;
    use PixelFormat as P;

    let formats = match (channels, dtype) {
        (1, DType::Float) => (I::R32F, P::Red),
        (1, DType::Int32) => (I::R32I, P::RedInteger),
        (1, DType::Int16) => (I::R16I, P::RedInteger),
        (1, DType::Uint8) => (I::R8, P::Red),
        (1, DType::Int8) => (I::R8Snorm, P::Red),

        (3, DType::Float) => (I::Rgb32F, P::Rgb),
        (3, DType::Int32) => (I::Rgb32I, P::RgbInteger),
        (3, DType::Int16) => (I::Rgb16I, P::RgbInteger),
        (3, DType::Uint8) => (I::Rgb8, P::Rgb),
        (3, DType::Int8) => (I::Rgb8Snorm, P::Rgb),

        (4, DType::Float) => (I::Rgba32F, P::Rgba),
        (4, DType::Int32) => (I::Rgba32I, P::RgbaInteger),
        (4, DType::Int16) => (I::Rgba16I, P::RgbaInteger),
        (4, DType::Uint8) => (I::Rgba8, P::Rgba),
        (4, DType::Int8) => (I::Rgba8Snorm, P::Rgba),

        _ => {
            return Err(InteropError::UnsupportedFormat {
                channels,
                dtype: format!("{dtype:?}"),
            });
        }
    };
    Ok(formats)
}
