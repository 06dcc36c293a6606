use std::future::Future;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{DeviceMap, ImagePipeline, ModelVariant};

/// Numeric precision used for weights on an accelerator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Precision {
    /// F16 on accelerators. Host execution still uses F32.
    #[default]
    Half,
    Full,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    pub device_map: DeviceMap,
    pub precision: Precision,
    /// Chunk size for sliced attention; `None` computes attention in one pass.
    pub attention_slice_size: Option<usize>,
    /// Keep the text encoder in host memory when an accelerator is used.
    pub cpu_offload: bool,
    pub use_flash_attn: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            device_map: DeviceMap::default(),
            precision: Precision::default(),
            attention_slice_size: Some(1),
            cpu_offload: true,
            use_flash_attn: cfg!(feature = "flash-attn"),
        }
    }
}

pub trait Loader {
    type Model: ImagePipeline;

    fn load(
        repo_id: &str,
        variant: ModelVariant,
        api: Api,
        options: LoadOptions,
    ) -> impl Future<Output = Result<Self::Model>>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_enable_memory_savers() {
        let options = LoadOptions::default();
        assert_eq!(options.precision, Precision::Half);
        assert_eq!(options.attention_slice_size, Some(1));
        assert!(options.cpu_offload);
    }
}
