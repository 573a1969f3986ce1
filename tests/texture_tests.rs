//! Texture Tests
//!
//! Tests for:
//! - Format selection from (channels, dtype)
//! - Upload from host and device tensors
//! - Read back through interop and through the render API
//! - Output caching and synchronisation
//! - Sampling parameters and mipmaps

use myth_interop::backend::{InternalFormat, PixelFormat};
use myth_interop::{
    Context, ContextSettings, DType, Device, InteropError, Resource, ResourceState, ScalarType, Tensor,
    TextureParameters, TextureTarget,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32 * 0.5).collect()
}

// ============================================================================
// Formats
// ============================================================================

#[test]
fn two_channel_images_are_rejected_before_upload() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let image = Tensor::zeros(&[4, 4, 2], ScalarType::Float32, Device::Cpu);

    let result = cur.texture_from_tensor(&image, TextureTarget::D2);
    assert!(matches!(result, Err(InteropError::UnsupportedFormat { channels: 2, .. })));
    assert_eq!(device.stats().texture_uploads, 0);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(ctx.live_resources(), 0);
}

#[test]
fn unsupported_types_are_rejected() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_texture(TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();

    let double = Tensor::zeros(&[2, 2], ScalarType::Float64, Device::Cpu);
    assert!(matches!(
        texture.copy_from_tensor(&cur, &double),
        Err(InteropError::UnsupportedFormat { .. })
    ));
    let half = Tensor::zeros(&[2, 2], ScalarType::Float16, Device::Cpu);
    assert!(matches!(
        texture.copy_from_tensor(&cur, &half),
        Err(InteropError::UnsupportedType(_))
    ));
    assert!(matches!(texture.empty(&cur, &[2, 2, 4], DType::Int64), Err(InteropError::UnsupportedFormat { .. })));
    assert_eq!(device.stats().texture_uploads, 0);
    assert_eq!(texture.state(), ResourceState::Unallocated);
}

#[test]
fn layouts_must_match_the_target() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let flat = Tensor::zeros(&[16], ScalarType::Float32, Device::Cpu);
    assert!(matches!(
        cur.texture_from_tensor(&flat, TextureTarget::D2),
        Err(InteropError::ShapeMismatch(_))
    ));
    let cube = Tensor::zeros(&[2, 2, 2, 2, 1], ScalarType::Float32, Device::Cpu);
    assert!(matches!(
        cur.texture_from_tensor(&cube, TextureTarget::D3),
        Err(InteropError::ShapeMismatch(_))
    ));
}

#[test]
fn formats_follow_channels_and_dtype() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();

    let rgb = Tensor::zeros(&[16, 3], ScalarType::UInt8, Device::Cpu);
    let handle = cur.texture_from_tensor(&rgb, TextureTarget::D1).unwrap();
    let texture = cur.texture(&handle).unwrap();
    assert_eq!(texture.internal_format(), Some(InternalFormat::Rgb8));
    assert_eq!(texture.format(), Some(PixelFormat::Rgb));
    assert_eq!((texture.width(), texture.height(), texture.depth()), (16, 1, 1));

    let ints = Tensor::zeros(&[2, 2, 4], ScalarType::Int32, Device::Cpu);
    let handle = cur.texture_from_tensor(&ints, TextureTarget::D2).unwrap();
    let texture = cur.texture(&handle).unwrap();
    assert_eq!(texture.internal_format(), Some(InternalFormat::Rgba32I));
    assert_eq!(texture.format(), Some(PixelFormat::RgbaInteger));
    assert_eq!(texture.dtype(), Some(DType::Int32));
}

// ============================================================================
// Upload & Read Back
// ============================================================================

#[test]
fn host_image_round_trip_through_interop() {
    init_logging();
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let pixels = ramp(4 * 8 * 4);
    let image = Tensor::from_slice(&pixels, &[4, 8, 4]).unwrap();

    let handle = cur.texture_from_tensor(&image, TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();
    assert_eq!(texture.state(), ResourceState::Registered);
    assert_eq!((texture.width(), texture.height(), texture.depth()), (8, 4, 1));
    assert_eq!(device.stats().texture_uploads, 1);

    let output = texture.to_tensor(&cur, false, false).unwrap();
    assert!(output.is_cpu());
    assert_eq!(output.shape(), &[4, 8, 4]);
    assert_eq!(output.to_vec::<f32>().unwrap(), pixels);

    let stats = device.stats();
    assert_eq!(stats.device_to_host, 1);
    assert_eq!(stats.synchronizations, 1);
    assert_eq!(stats.texture_readbacks, 0);
}

#[test]
fn single_channel_output_has_no_channel_axis() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let image = Tensor::from_slice(&[1u8, 2, 3, 4, 5, 6], &[2, 3]).unwrap();
    let handle = cur.texture_from_tensor(&image, TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();
    assert_eq!(texture.internal_format(), Some(InternalFormat::R8));

    let output = texture.to_tensor(&cur, false, false).unwrap();
    assert_eq!(output.shape(), &[2, 3]);
    assert_eq!(output.to_vec::<u8>().unwrap(), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn unit_dimensions_survive_interop_round_trip() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();

    for (shape, target) in [
        (vec![1, 8], TextureTarget::D2),
        (vec![1, 4, 3], TextureTarget::D2),
        (vec![4, 1, 4], TextureTarget::Rectangle),
    ] {
        let pixels = ramp(shape.iter().product());
        let image = Tensor::from_slice(&pixels, &shape).unwrap();
        let handle = cur.texture_from_tensor(&image, target).unwrap();
        let mut texture = cur.texture(&handle).unwrap();
        assert_eq!(texture.state(), ResourceState::Registered);

        let output = texture.to_tensor(&cur, false, false).unwrap();
        assert_eq!(output.shape(), shape.as_slice());
        assert_eq!(output.to_vec::<f32>().unwrap(), pixels);
    }
}

#[test]
fn snorm_images_read_back_through_render_api() {
    init_logging();
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let values: Vec<i8> = (-7..8).collect();
    let image = Tensor::from_slice(&values, &[3, 5]).unwrap();

    let handle = cur.texture_from_tensor(&image, TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();
    assert_eq!(texture.internal_format(), Some(InternalFormat::R8Snorm));
    assert_eq!(texture.state(), ResourceState::RenderOnly);
    assert_eq!(device.stats().registrations, 0);

    let output = texture.to_tensor(&cur, false, false).unwrap();
    assert_eq!(output.shape(), &[3, 5]);
    assert_eq!(output.to_vec::<i8>().unwrap(), values);
    assert_eq!(device.stats().texture_readbacks, 1);

    let on_device = texture.to_tensor(&cur, true, false).unwrap();
    assert_eq!(on_device.device(), Device::Cuda(0));
    assert_eq!(on_device.to_vec::<i8>().unwrap(), values);
}

#[test]
fn volume_images_read_back_through_render_api() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let voxels = ramp(2 * 3 * 4);
    let image = Tensor::from_slice(&voxels, &[2, 3, 4]).unwrap();

    let handle = cur.texture_from_tensor(&image, TextureTarget::D3).unwrap();
    let mut texture = cur.texture(&handle).unwrap();
    let id = texture.render_id().unwrap();
    assert_eq!((texture.width(), texture.height(), texture.depth()), (4, 3, 2));
    assert_eq!(texture.state(), ResourceState::RenderOnly);
    assert_eq!(device.texture_parameters(id), Some(TextureParameters::volume()));
    assert!(!device.is_mipmapped(id));

    let output = texture.to_tensor(&cur, false, false).unwrap();
    assert_eq!(output.shape(), &[2, 3, 4]);
    assert_eq!(output.to_vec::<f32>().unwrap(), voxels);
    assert_eq!(device.stats().texture_readbacks, 1);

    let rgba = Tensor::zeros(&[2, 3, 4, 4], ScalarType::Float32, Device::Cpu);
    texture.copy_from_tensor(&cur, &rgba).unwrap();
    assert_eq!(texture.to_tensor(&cur, false, false).unwrap().shape(), &[2, 3, 4, 4]);
}

#[test]
fn device_images_upload_through_interop() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let pixels = ramp(6 * 5 * 3);
    let image = Tensor::from_slice(&pixels, &[6, 5, 3]).unwrap().to_device(Device::Cuda(0));

    let handle = cur.texture_from_tensor(&image, TextureTarget::Rectangle).unwrap();
    let mut texture = cur.texture(&handle).unwrap();
    assert_eq!(device.stats().device_to_device, 1);

    let output = texture.to_tensor(&cur, true, false).unwrap();
    assert_eq!(output.device(), Device::Cuda(0));
    assert_eq!(output.shape(), &[6, 5, 3]);
    assert_eq!(output.to_vec::<f32>().unwrap(), pixels);
    assert_eq!(device.stats().device_to_device, 2);
}

#[test]
fn unregistrable_device_images_are_staged() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let image = Tensor::zeros(&[2, 2, 3], ScalarType::Int16, Device::Cuda(0));

    let handle = cur.texture_from_tensor(&image, TextureTarget::D2).unwrap();
    let texture = cur.texture(&handle).unwrap();
    assert_eq!(texture.internal_format(), Some(InternalFormat::Rgb16I));
    assert_eq!(texture.state(), ResourceState::RenderOnly);
    assert_eq!(device.stats().device_to_device, 0);
    assert_eq!(device.stats().texture_uploads, 1);
}

#[test]
fn empty_images_are_zeroed() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_texture(TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();
    assert!(matches!(texture.to_tensor(&cur, false, false), Err(InteropError::NotAllocated)));

    texture.empty(&cur, &[4, 4, 4], DType::Float).unwrap();
    let output = texture.to_tensor(&cur, false, false).unwrap();
    assert_eq!(output.shape(), &[4, 4, 4]);
    assert!(output.to_vec::<f32>().unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn rectangle_reupload_replaces_contents() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_texture(TextureTarget::Rectangle).unwrap();
    let mut texture = cur.texture(&handle).unwrap();

    let first = Tensor::from_slice(&[1u8, 2, 3, 4], &[2, 2]).unwrap();
    let second = Tensor::from_slice(&[5u8, 6, 7, 8], &[2, 2]).unwrap();
    texture.copy_from_tensor(&cur, &first).unwrap();
    texture.copy_from_tensor(&cur, &second).unwrap();

    assert_eq!(device.stats().texture_uploads, 2);
    assert_eq!(device.live_registrations(), 1);
    assert_eq!(texture.to_tensor(&cur, false, false).unwrap().to_vec::<u8>().unwrap(), vec![5, 6, 7, 8]);
}

// ============================================================================
// Output Cache
// ============================================================================

#[test]
fn interop_output_is_cached() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let image = Tensor::from_slice(&ramp(3 * 3 * 4), &[3, 3, 4]).unwrap();
    let handle = cur.texture_from_tensor(&image, TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();

    let a = texture.to_tensor(&cur, false, false).unwrap();
    let b = texture.to_tensor(&cur, false, false).unwrap();
    assert!(a.shares_storage(&b));

    // A different device needs a new output.
    let c = texture.to_tensor(&cur, true, false).unwrap();
    assert!(!c.shares_storage(&b));

    // So does a different layout.
    let larger = Tensor::zeros(&[4, 4, 4], ScalarType::Float32, Device::Cpu);
    texture.copy_from_tensor(&cur, &larger).unwrap();
    let d = texture.to_tensor(&cur, true, false).unwrap();
    assert!(!d.shares_storage(&c));
    assert_eq!(d.shape(), &[4, 4, 4]);
}

#[test]
fn non_blocking_reads_skip_synchronize() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let image = Tensor::zeros(&[2, 2], ScalarType::Float32, Device::Cpu);
    let handle = cur.texture_from_tensor(&image, TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();

    texture.to_tensor(&cur, true, true).unwrap();
    assert_eq!(device.stats().synchronizations, 0);
    texture.to_tensor(&cur, true, false).unwrap();
    assert_eq!(device.stats().synchronizations, 1);
}

// ============================================================================
// Sampling & Mipmaps
// ============================================================================

#[test]
fn default_parameters_per_target() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();

    let rect = cur.create_texture(TextureTarget::Rectangle).unwrap();
    let mut rect = cur.texture(&rect).unwrap();
    assert_eq!(rect.parameters(), TextureParameters::rect_good());
    rect.empty(&cur, &[2, 2], DType::Uint8).unwrap();
    assert_eq!(
        device.texture_parameters(rect.render_id().unwrap()),
        Some(TextureParameters::rect_good())
    );

    let plain = cur.create_texture(TextureTarget::D2).unwrap();
    let plain = cur.texture(&plain).unwrap();
    assert_eq!(plain.parameters(), TextureParameters::good_quality());
    assert_eq!(TextureParameters::default(), TextureParameters::good_quality());
}

#[test]
fn set_parameters_applies_immediately() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_texture(TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();

    texture.set_parameters(&cur, TextureParameters::poor_quality()).unwrap();
    assert_eq!(texture.parameters(), TextureParameters::poor_quality());
    let id = texture.render_id().unwrap();
    assert_eq!(device.texture_parameters(id), Some(TextureParameters::poor_quality()));

    // Re-specifying keeps the chosen sampling.
    texture.empty(&cur, &[2, 2], DType::Float).unwrap();
    assert_eq!(device.texture_parameters(id), Some(TextureParameters::poor_quality()));
}

#[test]
fn mipmaps_only_for_2d_textures() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let image = Tensor::zeros(&[8, 8, 4], ScalarType::UInt8, Device::Cpu);

    let d2 = cur.texture_from_tensor(&image, TextureTarget::D2).unwrap();
    let rect = cur.texture_from_tensor(&image, TextureTarget::Rectangle).unwrap();
    assert!(device.is_mipmapped(cur.texture(&d2).unwrap().render_id().unwrap()));
    assert!(!device.is_mipmapped(cur.texture(&rect).unwrap().render_id().unwrap()));
    assert_eq!(device.stats().mipmaps_generated, 1);
}

// ============================================================================
// Release
// ============================================================================

#[test]
fn release_unregisters_and_deletes() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let image = Tensor::zeros(&[4, 4, 4], ScalarType::Float32, Device::Cpu);
    let handle = cur.texture_from_tensor(&image, TextureTarget::D2).unwrap();
    let mut texture = cur.texture(&handle).unwrap();
    texture.to_tensor(&cur, false, false).unwrap();

    texture.release(&cur).unwrap();
    assert_eq!(texture.state(), ResourceState::Released);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_registrations(), 0);
    assert!(matches!(
        texture.to_tensor(&cur, false, false),
        Err(InteropError::ResourceReleased)
    ));
    texture.release(&cur).unwrap();
    assert_eq!(device.stats().textures_deleted, 1);
}
