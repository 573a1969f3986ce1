//! Buffer Tests
//!
//! Tests for:
//! - Allocation, registration and state transitions
//! - Tensor upload and readback through interop and host mappings
//! - Row scatter (index_put) and gather (index_select)
//! - Shape, dtype and device validation

use std::sync::Arc;

use myth_interop::{
    Bindable, BufferTarget, BufferUsage, Context, ContextSettings, DType, Device, HeadlessDevice, InteropError,
    Resource, ResourceState, ScalarType, Tensor,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn points(rows: usize) -> Vec<f32> {
    (0..rows * 3).map(|i| i as f32).collect()
}

/// A context without a compute interop driver.
fn render_only_context() -> (Context, Arc<HeadlessDevice>) {
    let device = Arc::new(HeadlessDevice::new());
    let ctx = Context::new(ContextSettings::default(), device.clone(), None);
    (ctx, device)
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn new_buffer_is_unallocated() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Element, BufferUsage::Static).unwrap();
    let buffer = cur.buffer(&handle).unwrap();

    assert_eq!(buffer.state(), ResourceState::Unallocated);
    assert_eq!(buffer.dtype(), None);
    assert!(buffer.is_empty());
    assert_eq!(buffer.dims(), 0);
    assert_eq!(buffer.target(), BufferTarget::Element);
    assert_eq!(buffer.usage(), BufferUsage::Static);
    assert!(matches!(buffer.to_tensor(&cur, false), Err(InteropError::NotAllocated)));
}

#[test]
fn allocate_registers_storage() {
    init_logging();
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    buffer.allocate(&cur, 10, 3, DType::Float).unwrap();
    assert_eq!(buffer.state(), ResourceState::Registered);
    assert_eq!(buffer.shape(), &[10, 3]);
    assert_eq!(buffer.byte_size(), 120);
    assert_eq!(buffer.dtype(), Some(DType::Float));
    assert_eq!(buffer.render_type(), Some(myth_interop::GlType::Float));
    assert_eq!(device.stats().registrations, 1);
    assert_eq!(device.buffer_usage(buffer.render_id().unwrap()), Some(BufferUsage::Dynamic));

    // Scratch binding is cleared again.
    assert_eq!(device.bound_buffer(BufferTarget::Array), None);

    buffer.allocate(&cur, 16, 0, DType::Int32).unwrap();
    assert_eq!(buffer.shape(), &[16]);
    assert_eq!(buffer.dims(), 1);
    assert_eq!(buffer.size(0), 16);
    assert_eq!(buffer.size(1), 0);
}

#[test]
fn zero_sized_allocation_is_a_noop() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    buffer.allocate(&cur, 0, 3, DType::Float).unwrap();
    assert_eq!(buffer.state(), ResourceState::Unallocated);
    assert_eq!(buffer.dtype(), None);
    assert_eq!(device.stats().buffer_allocations, 0);
    assert_eq!(device.stats().registrations, 0);
}

#[test]
fn resize_reregisters_storage() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    buffer.allocate(&cur, 10, 3, DType::Float).unwrap();
    buffer.allocate(&cur, 10, 3, DType::Float).unwrap();
    assert_eq!(device.stats().unregistrations, 0);
    assert_eq!(device.stats().registrations, 1);

    buffer.allocate(&cur, 20, 3, DType::Float).unwrap();
    assert_eq!(device.stats().unregistrations, 1);
    assert_eq!(device.stats().registrations, 2);
    assert_eq!(device.live_registrations(), 1);
    assert_eq!(buffer.state(), ResourceState::Registered);
}

#[test]
fn failed_registration_leaves_buffer_render_only() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    device.fail_next("register_buffer");
    assert!(matches!(
        buffer.allocate(&cur, 4, 2, DType::Float),
        Err(InteropError::Interop { call: "register_buffer", .. })
    ));
    assert_eq!(buffer.state(), ResourceState::RenderOnly);
    assert_eq!(buffer.dtype(), None);

    // The next allocation registers it.
    buffer.allocate(&cur, 4, 2, DType::Float).unwrap();
    assert_eq!(buffer.state(), ResourceState::Registered);
}

#[test]
fn too_many_columns_are_rejected() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    assert!(matches!(
        buffer.allocate(&cur, 4, 5, DType::Float),
        Err(InteropError::ShapeMismatch(_))
    ));
    let wide = Tensor::zeros(&[2, 5], ScalarType::Float32, Device::Cpu);
    assert!(matches!(buffer.copy_from_tensor(&cur, &wide), Err(InteropError::ShapeMismatch(_))));
    let cube = Tensor::zeros(&[2, 2, 2], ScalarType::Float32, Device::Cpu);
    assert!(matches!(buffer.copy_from_tensor(&cur, &cube), Err(InteropError::ShapeMismatch(_))));
    assert_eq!(device.stats().buffer_allocations, 0);
}

#[test]
fn unsupported_dtypes_are_rejected() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let half = Tensor::zeros(&[8], ScalarType::Float16, Device::Cpu);
    assert!(matches!(
        cur.buffer_from_tensor(&half, BufferTarget::Array, BufferUsage::Dynamic),
        Err(InteropError::UnsupportedType(_))
    ));
}

// ============================================================================
// Transfers
// ============================================================================

#[test]
fn device_tensor_round_trip() {
    init_logging();
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let values = points(1000);
    let input = Tensor::from_slice(&values, &[1000, 3]).unwrap().to_device(Device::Cuda(0));

    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 1000, 3, DType::Float).unwrap();
    buffer.copy_from_tensor(&cur, &input).unwrap();
    assert_eq!(device.stats().device_to_device, 1);

    let host = buffer.to_tensor(&cur, false).unwrap();
    assert!(host.is_cpu());
    assert_eq!(host.shape(), &[1000, 3]);
    assert_eq!(host.to_vec::<f32>().unwrap(), values);
    assert_eq!(device.stats().device_to_host, 1);

    let indices = Tensor::from_slice(&[0i64, 999], &[2]).unwrap();
    let rows = buffer.index_select(&cur, &indices, false).unwrap();
    assert_eq!(rows.shape(), &[2, 3]);
    assert_eq!(rows.to_vec::<f32>().unwrap(), vec![0.0, 1.0, 2.0, 2997.0, 2998.0, 2999.0]);
}

#[test]
fn every_dtype_round_trips() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();

    for dtype in DType::ALL {
        for device in [Device::Cpu, Device::Cuda(0)] {
            let host = Tensor::zeros(&[10, 2], dtype.scalar_type(), Device::Cpu);
            for (i, byte) in host.bytes_mut().iter_mut().enumerate() {
                *byte = (i * 7 % 251) as u8;
            }
            let input = host.to_device(device);

            let handle = cur
                .buffer_from_tensor(&input, BufferTarget::Array, BufferUsage::Dynamic)
                .unwrap();
            let buffer = cur.buffer(&handle).unwrap();
            assert_eq!(buffer.dtype(), Some(dtype));

            let output = buffer.to_tensor(&cur, device.is_cuda()).unwrap();
            assert_eq!(output.device(), device, "{dtype:?}");
            assert_eq!(output.dtype(), dtype.scalar_type());
            assert_eq!(output.shape(), &[10, 2]);
            assert_eq!(output.bytes().as_slice(), input.bytes().as_slice(), "{dtype:?} on {device}");
        }
    }
}

#[test]
fn device_readback_stays_on_device() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let input = Tensor::from_slice(&[1i32, 2, 3, 4], &[4]).unwrap();
    let handle = cur
        .buffer_from_tensor(&input, BufferTarget::Element, BufferUsage::Static)
        .unwrap();
    assert_eq!(device.stats().host_to_device, 1);

    let buffer = cur.buffer(&handle).unwrap();
    let output = buffer.to_tensor(&cur, true).unwrap();
    assert_eq!(output.device(), Device::Cuda(0));
    assert_eq!(output.dtype(), ScalarType::Int32);
    assert_eq!(output.to_vec::<i32>().unwrap(), vec![1, 2, 3, 4]);
    assert_eq!(device.stats().device_to_device, 1);
}

#[test]
fn render_side_sees_uploaded_bytes() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let input = Tensor::from_slice(&[7u8, 8, 9], &[3]).unwrap();
    let handle = cur
        .buffer_from_tensor(&input, BufferTarget::Array, BufferUsage::Dynamic)
        .unwrap();

    let buffer = cur.buffer(&handle).unwrap();
    let id = buffer.render_id().unwrap();
    assert_eq!(device.buffer_bytes(id), Some(vec![7, 8, 9]));
    assert_eq!(buffer.dtype(), Some(DType::Uint8));
}

#[test]
fn empty_tensor_commits_shape_only() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    let empty = Tensor::zeros(&[0, 3], ScalarType::Float32, Device::Cpu);
    buffer.copy_from_tensor(&cur, &empty).unwrap();
    assert_eq!(buffer.shape(), &[0, 3]);
    assert!(buffer.is_empty());
    assert_eq!(device.stats().buffer_allocations, 0);

    let output = buffer.to_tensor(&cur, false).unwrap();
    assert_eq!(output.shape(), &[0, 3]);
    assert_eq!(output.numel(), 0);
}

#[test]
fn failed_upload_unmaps_registration() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let input = Tensor::from_slice(&points(4), &[4, 3]).unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    device.fail_next("copy_to_mapped");
    assert!(matches!(
        buffer.copy_from_tensor(&cur, &input),
        Err(InteropError::Interop { call: "copy_to_mapped", .. })
    ));

    // The mapping guard unmapped on the error path, so mapping again works.
    buffer.copy_from_tensor(&cur, &input).unwrap();
    assert_eq!(buffer.to_tensor(&cur, false).unwrap().to_vec::<f32>().unwrap(), points(4));
    assert_eq!(device.stats().interop_maps, 3);
}

#[test]
fn failed_transfers_keep_previous_metadata() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.copy_from_tensor(&cur, &Tensor::from_slice(&points(4), &[4, 3]).unwrap()).unwrap();

    // Same byte size, so the storage is re-created under the old registration.
    let ints = Tensor::from_slice(&[7i32; 12], &[6, 2]).unwrap();
    device.fail_next("copy_to_mapped");
    assert!(buffer.copy_from_tensor(&cur, &ints).is_err());
    assert_eq!(buffer.shape(), &[4, 3]);
    assert_eq!(buffer.dtype(), Some(DType::Float));

    // A larger re-allocation that fails to register still keeps them.
    device.fail_next("register_buffer");
    assert!(buffer.allocate(&cur, 16, 4, DType::Int32).is_err());
    assert_eq!(buffer.shape(), &[4, 3]);
    assert_eq!(buffer.dtype(), Some(DType::Float));
    assert_eq!(buffer.state(), ResourceState::RenderOnly);

    // Storage that no longer holds the described contents cannot be read.
    device.fail_next("register_buffer");
    assert!(buffer.allocate(&cur, 1, 0, DType::Int8).is_err());
    assert_eq!(buffer.shape(), &[4, 3]);
    assert!(matches!(buffer.to_tensor(&cur, false), Err(InteropError::NotAllocated)));
}

#[test]
fn deferred_errors_are_reported() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    device.push_error("out of memory");
    assert_eq!(
        buffer.allocate(&cur, 4, 1, DType::Float),
        Err(InteropError::render("allocate", "out of memory"))
    );
}

// ============================================================================
// Without Interop
// ============================================================================

#[test]
fn host_path_without_interop() {
    let (ctx, device) = render_only_context();
    assert!(!ctx.has_interop());
    let cur = ctx.current().unwrap();
    let input = Tensor::from_slice(&points(5), &[5, 3]).unwrap();
    let handle = cur
        .buffer_from_tensor(&input, BufferTarget::Array, BufferUsage::Dynamic)
        .unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    assert_eq!(buffer.state(), ResourceState::RenderOnly);
    assert_eq!(device.stats().registrations, 0);
    assert_eq!(device.stats().host_maps, 1);
    assert_eq!(buffer.to_tensor(&cur, false).unwrap().to_vec::<f32>().unwrap(), points(5));

    assert_eq!(buffer.to_tensor(&cur, true).err(), Some(InteropError::InteropUnavailable));
    let on_device = input.to_device(Device::Cuda(0));
    assert_eq!(
        buffer.copy_from_tensor(&cur, &on_device),
        Err(InteropError::InteropUnavailable)
    );
}

#[test]
fn host_indexing_without_interop() {
    let (ctx, _device) = render_only_context();
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 4, 2, DType::Int16).unwrap();

    let indices = Tensor::from_slice(&[3i64, 0], &[2]).unwrap();
    let values = Tensor::from_slice(&[30i16, 31, 0, 1], &[2, 2]).unwrap();
    buffer.index_put(&cur, &indices, &values).unwrap();

    let rows = buffer.index_select(&cur, &indices, false).unwrap();
    assert_eq!(rows.to_vec::<i16>().unwrap(), vec![30, 31, 0, 1]);
}

// ============================================================================
// Indexing
// ============================================================================

#[test]
fn index_put_then_select_on_device() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 8, 3, DType::Float).unwrap();

    let gpu = Device::Cuda(0);
    let indices = Tensor::from_slice(&[1i64, 6], &[2]).unwrap().to_device(gpu);
    let values = Tensor::from_slice(&[10.0f32, 11.0, 12.0, 60.0, 61.0, 62.0], &[2, 3])
        .unwrap()
        .to_device(gpu);
    buffer.index_put(&cur, &indices, &values).unwrap();

    let rows = buffer.index_select(&cur, &indices, true).unwrap();
    assert_eq!(rows.device(), gpu);
    assert_eq!(rows.shape(), &[2, 3]);
    assert_eq!(rows.to_vec::<f32>().unwrap(), values.to_vec::<f32>().unwrap());
    assert_eq!(device.stats().kernel_launches, 2);

    let all = buffer.to_tensor(&cur, false).unwrap().to_vec::<f32>().unwrap();
    assert_eq!(&all[3..6], &[10.0, 11.0, 12.0]);
    assert_eq!(&all[0..3], &[0.0, 0.0, 0.0]);
}

#[test]
fn host_put_is_visible_to_device_select() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 4, 0, DType::Int64).unwrap();

    let indices = Tensor::from_slice(&[2i64], &[1]).unwrap();
    let values = Tensor::from_slice(&[42i64], &[1]).unwrap();
    buffer.index_put(&cur, &indices, &values).unwrap();

    let rows = buffer
        .index_select(&cur, &indices.to_device(Device::Cuda(0)), true)
        .unwrap();
    assert_eq!(rows.shape(), &[1]);
    assert_eq!(rows.to_vec::<i64>().unwrap(), vec![42]);
}

#[test]
fn empty_indices_are_a_noop() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 4, 3, DType::Float).unwrap();
    let maps = device.stats().interop_maps + device.stats().host_maps;

    let indices = Tensor::from_slice::<i64>(&[], &[0]).unwrap();
    let values = Tensor::zeros(&[0, 3], ScalarType::Float32, Device::Cpu);
    buffer.index_put(&cur, &indices, &values).unwrap();

    let rows = buffer.index_select(&cur, &indices, false).unwrap();
    assert_eq!(rows.shape(), &[0, 3]);
    assert!(rows.is_cpu());
    assert_eq!(device.stats().interop_maps + device.stats().host_maps, maps);
}

#[test]
fn mismatched_counts_are_rejected() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 4, 3, DType::Float).unwrap();

    let indices = Tensor::from_slice(&[0i64, 1], &[2]).unwrap();
    let values = Tensor::zeros(&[3, 3], ScalarType::Float32, Device::Cpu);
    assert!(matches!(
        buffer.index_put(&cur, &indices, &values),
        Err(InteropError::ShapeMismatch(_))
    ));

    // Right row count, wrong row width.
    let narrow = Tensor::zeros(&[2, 2], ScalarType::Float32, Device::Cpu);
    assert!(matches!(
        buffer.index_put(&cur, &indices, &narrow),
        Err(InteropError::ShapeMismatch(_))
    ));
}

#[test]
fn mixed_devices_are_rejected() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 4, 3, DType::Float).unwrap();

    let indices = Tensor::from_slice(&[0i64], &[1]).unwrap();
    let values = Tensor::zeros(&[1, 3], ScalarType::Float32, Device::Cuda(0));
    assert!(matches!(
        buffer.index_put(&cur, &indices, &values),
        Err(InteropError::DeviceMismatch(_))
    ));
    assert!(matches!(
        buffer.index_select(&cur, &indices, true),
        Err(InteropError::DeviceMismatch(_))
    ));
    assert!(matches!(
        buffer.index_select(&cur, &indices.to_device(Device::Cuda(0)), false),
        Err(InteropError::DeviceMismatch(_))
    ));
}

#[test]
fn out_of_range_indices_are_rejected() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let input = Tensor::from_slice(&points(1000), &[1000, 3]).unwrap();
    let handle = cur
        .buffer_from_tensor(&input, BufferTarget::Array, BufferUsage::Dynamic)
        .unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();

    let past_end = Tensor::from_slice(&[0i64, 1000], &[2]).unwrap();
    assert_eq!(
        buffer.index_select(&cur, &past_end, false).err(),
        Some(InteropError::IndexOutOfRange { index: 1000, size: 1000 })
    );

    let negative = Tensor::from_slice(&[-1i64], &[1]).unwrap();
    let values = Tensor::zeros(&[1, 3], ScalarType::Float32, Device::Cpu);
    assert_eq!(
        buffer.index_put(&cur, &negative, &values),
        Err(InteropError::IndexOutOfRange { index: -1, size: 1000 })
    );
}

#[test]
fn wrong_index_and_value_types_are_rejected() {
    let (ctx, _device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 4, 3, DType::Float).unwrap();

    let indices = Tensor::from_slice(&[0i64], &[1]).unwrap();
    let ints = Tensor::zeros(&[1, 3], ScalarType::Int32, Device::Cpu);
    assert!(matches!(
        buffer.index_put(&cur, &indices, &ints),
        Err(InteropError::UnsupportedType(_))
    ));

    let narrow_indices = Tensor::from_slice(&[0i32], &[1]).unwrap();
    assert!(matches!(
        buffer.index_select(&cur, &narrow_indices, false),
        Err(InteropError::UnsupportedType(_))
    ));

    let matrix_indices = Tensor::from_slice(&[0i64, 1], &[1, 2]).unwrap();
    assert!(matches!(
        buffer.index_select(&cur, &matrix_indices, false),
        Err(InteropError::ShapeMismatch(_))
    ));
}

// ============================================================================
// Binding & Release
// ============================================================================

#[test]
fn bind_and_unbind() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Element, BufferUsage::Static).unwrap();
    let buffer = cur.buffer(&handle).unwrap();

    buffer.bind(&cur).unwrap();
    assert_eq!(device.bound_buffer(BufferTarget::Element), buffer.render_id());
    buffer.unbind(&cur).unwrap();
    assert_eq!(device.bound_buffer(BufferTarget::Element), None);
}

#[test]
fn release_is_idempotent() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let handle = cur.create_buffer(BufferTarget::Array, BufferUsage::Dynamic).unwrap();
    let mut buffer = cur.buffer(&handle).unwrap();
    buffer.allocate(&cur, 4, 4, DType::Uint8).unwrap();

    buffer.release(&cur).unwrap();
    assert!(buffer.is_released());
    assert_eq!(buffer.state(), ResourceState::Released);
    assert_eq!(buffer.render_id(), None);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_registrations(), 0);

    buffer.release(&cur).unwrap();
    assert_eq!(device.stats().buffers_deleted, 1);
    assert!(matches!(
        buffer.allocate(&cur, 4, 4, DType::Uint8),
        Err(InteropError::ResourceReleased)
    ));

    // The registry releasing it again is harmless.
    drop(buffer);
    cur.release(handle.as_resource()).unwrap();
    assert_eq!(device.stats().buffers_deleted, 1);
}

#[test]
fn failed_creation_frees_the_buffer() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let cur = ctx.current().unwrap();
    let wide = Tensor::zeros(&[2, 6], ScalarType::Float32, Device::Cpu);
    assert!(
        cur.buffer_from_tensor(&wide, BufferTarget::Array, BufferUsage::Dynamic)
            .is_err()
    );
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(ctx.live_resources(), 0);
}
