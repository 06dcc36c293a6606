#[cfg(feature = "accelerate")]
extern crate accelerate_src;

#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

pub mod device_map;
pub mod error;
pub mod loader;
mod loader_factory;
pub mod offload;
mod util;

mod stable_diffusion;

pub use device_map::*;
pub use error::GenerationError;
use image::DynamicImage;
pub use loader::*;
pub use loader_factory::*;
pub use offload::OffloadPlan;
pub use stable_diffusion::{StableDiffusionLoader, StableDiffusionModel};
pub(crate) use util::*;
pub use util::{cuda_available, is_out_of_memory};

/// Negative prompt applied to every generation.
pub const NEGATIVE_PROMPT: &str = "blurry, low quality, distorted, ugly, bad anatomy";

/// Fixed sampling parameters. Callers only ever supply the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub steps: usize,
    pub guidance_scale: f64,
    pub height: usize,
    pub width: usize,
    pub negative_prompt: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            steps: 30,
            guidance_scale: 7.5,
            height: 512,
            width: 512,
            negative_prompt: NEGATIVE_PROMPT.to_string(),
        }
    }
}

/// A loaded text-to-image pipeline.
///
/// `generate` takes `&self` and may be called from several threads at once;
/// implementations must not rely on callers serializing access.
pub trait ImagePipeline: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<DynamicImage, GenerationError>;

    /// Best-effort release of accelerator memory held after a failed run.
    fn release_cached_memory(&self) {}

    /// Human readable name of the device the denoiser runs on.
    fn device_label(&self) -> String;
}
