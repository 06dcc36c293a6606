//! Component placement across host and accelerator memory.
//!
//! The text encoder only runs once per request, before denoising starts, so
//! with offload enabled its weights stay in host memory and only the
//! embeddings cross over to the accelerator. The UNet and VAE do the heavy
//! lifting and live on the best device.

use candle_core::Device;

#[derive(Debug, Clone)]
pub struct OffloadPlan {
    pub text_encoder: Device,
    pub unet: Device,
    pub vae: Device,
}

impl OffloadPlan {
    pub fn new(device: &Device, cpu_offload: bool) -> Self {
        let text_encoder = if cpu_offload {
            Device::Cpu
        } else {
            device.clone()
        };
        Self {
            text_encoder,
            unet: device.clone(),
            vae: device.clone(),
        }
    }

    /// True when some weights are kept on host while others sit on an accelerator.
    pub fn is_split(&self) -> bool {
        self.text_encoder.is_cpu() && !self.unet.is_cpu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_only_plan_is_not_split() {
        let plan = OffloadPlan::new(&Device::Cpu, true);
        assert!(plan.text_encoder.is_cpu());
        assert!(plan.unet.is_cpu());
        assert!(plan.vae.is_cpu());
        assert!(!plan.is_split());
    }

    #[test]
    fn without_offload_everything_follows_the_device() {
        let plan = OffloadPlan::new(&Device::Cpu, false);
        assert!(plan.text_encoder.same_device(&plan.unet));
        assert!(plan.vae.same_device(&plan.unet));
    }
}
