use anyhow::Result;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Tensor};
use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::DeviceMap;

/// Whether this build can reach a CUDA device. Metal does not count.
pub fn cuda_available() -> bool {
    cuda_is_available()
}

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    match device_map {
        DeviceMap::ForceCpu => Ok(Device::Cpu),
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Ok(Device::new_cuda(ordinal)?),
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Ok(Device::new_metal(ordinal)?),
        DeviceMap::Ordinal(_) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                warn!("no accelerator found, running on CPU; build with `--features metal` to use the GPU");
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                warn!("no accelerator found, running on CPU; build with `--features cuda` to use the GPU");
            }
            Ok(Device::Cpu)
        }
    }
}

pub(crate) fn device_label(device: &Device) -> String {
    match device {
        Device::Cpu => "cpu".to_string(),
        Device::Cuda(_) => format!("cuda ({:?})", device.location()),
        Device::Metal(_) => format!("metal ({:?})", device.location()),
    }
}

/// Converts a u8 tensor with shape (3, height, width) into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_image expects an image with 3 channels, got {channels}");
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| candle_core::Error::msg("error converting tensor to image buffer"))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

/// Looks through the whole error chain for an accelerator allocation failure.
pub fn is_out_of_memory(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let text = cause.to_string().to_ascii_lowercase();
        text.contains("out_of_memory") || text.contains("out of memory")
    })
}

/// Waits for queued kernels so freed buffers go back to the allocator.
///
/// candle frees device buffers on drop and has no explicit cache to empty, so
/// this is the closest equivalent. Errors are logged and swallowed.
pub(crate) fn release_cached_memory(device: &Device) {
    if device.is_cpu() {
        return;
    }
    match device.synchronize() {
        Ok(()) => info!("released cached accelerator memory"),
        Err(e) => debug!("device synchronize failed while releasing memory: {e}"),
    }
}
