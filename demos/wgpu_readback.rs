//! Round-trips a buffer and a texture through a real GPU via the wgpu
//! backend. Run with `--features wgpu`.

use std::sync::Arc;

use myth_interop::backend::wgpu::WgpuDevice;
use myth_interop::{BufferTarget, BufferUsage, Context, ContextSettings, Tensor, TextureTarget};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let device = Arc::new(WgpuDevice::new()?);
    let ctx = Context::new(ContextSettings::new(256, 256), device, None);

    {
        let cur = ctx.current()?;

        let weights: Vec<f32> = (0..64).map(|i| i as f32 * 0.25).collect();
        let tensor = Tensor::from_slice(&weights, &[16, 4])?;
        let handle = cur.buffer_from_tensor(&tensor, BufferTarget::Array, BufferUsage::Static)?;
        let back = cur.buffer(&handle)?.to_tensor(&cur, false)?;
        anyhow::ensure!(back.to_vec::<f32>()? == weights, "buffer contents changed on the GPU");

        // 16x16 RGBA checkerboard.
        let pixels: Vec<u8> = (0..16 * 16)
            .flat_map(|i| {
                let on = ((i % 16) + (i / 16)) % 2 == 0;
                if on { [255, 255, 255, 255] } else { [0, 0, 0, 255] }
            })
            .collect();
        let image = Tensor::from_slice(&pixels, &[16, 16, 4])?;
        let handle = cur.texture_from_tensor(&image, TextureTarget::D2)?;
        let back = cur.texture(&handle)?.to_tensor(&cur, false, false)?;
        anyhow::ensure!(back.to_vec::<u8>()? == pixels, "texture contents changed on the GPU");

        println!("buffer {:?} and texture {:?} survived the round trip", tensor.shape(), back.shape());
    }

    ctx.release()?;
    Ok(())
}
