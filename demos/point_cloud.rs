//! Streams a point cloud through an interop vertex buffer on the headless
//! driver and prints what crossed the interop boundary.

use glam::Vec3;

use myth_interop::{BufferTarget, BufferUsage, Context, ContextSettings, Device, Tensor};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let (ctx, device) = Context::headless(ContextSettings::new(1280, 720));
    let gpu = Device::Cuda(0);

    // A unit spiral, resident on the compute device.
    let points: Vec<f32> = (0..4096)
        .flat_map(|i| {
            let t = i as f32 / 4096.0;
            let p = Vec3::new((t * 40.0).cos(), t * 2.0 - 1.0, (t * 40.0).sin());
            p.to_array()
        })
        .collect();
    let cloud = Tensor::from_slice(&points, &[4096, 3])?.to_device(gpu);

    {
        let cur = ctx.current()?;
        let handle = cur.buffer_from_tensor(&cloud, BufferTarget::Array, BufferUsage::Dynamic)?;
        let mut buffer = cur.buffer(&handle)?;

        // Pull every 512th point to the origin without leaving the device.
        let picked: Vec<i64> = (0..8).map(|i| i * 512).collect();
        let indices = Tensor::from_slice(&picked, &[8])?.to_device(gpu);
        let origin = Tensor::zeros(&[8, 3], cloud.dtype(), gpu);
        buffer.index_put(&cur, &indices, &origin)?;

        let moved = buffer.index_select(&cur, &indices, true)?;
        log::info!("Selected {:?} on {}", moved.shape(), moved.device());

        let host = buffer.to_tensor(&cur, false)?;
        let first = host.to_vec::<f32>()?;
        println!(
            "{} points, first = ({:.2}, {:.2}, {:.2})",
            host.size(0),
            first[0],
            first[1],
            first[2]
        );
    }

    ctx.release()?;
    let stats = device.stats();
    println!(
        "device->device copies: {}, device->host copies: {}, kernels: {}",
        stats.device_to_device, stats.device_to_host, stats.kernel_launches
    );
    Ok(())
}
