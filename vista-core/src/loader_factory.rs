use anyhow::{anyhow, Result};
use hf_hub::api::tokio::Api;
use std::sync::Arc;
use tracing::info;

use crate::{ImagePipeline, LoadOptions, Loader, StableDiffusionLoader};

/// Supported Stable Diffusion releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    V1_5,
    V2_1,
}

impl ModelVariant {
    /// Detect model variant from a repository id such as `runwayml/stable-diffusion-v1-5`.
    ///
    /// SDXL and SD3 repositories are rejected; their pipelines differ from this one.
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name = model_name.to_lowercase();
        let repo = name.rsplit('/').next().unwrap_or(&name);

        let release = repo
            .strip_prefix("stable-diffusion")
            .or_else(|| repo.strip_prefix("sd"))?
            .trim_start_matches(['-', '_', '.']);

        if release.starts_with("xl") || release.starts_with('3') {
            None
        } else if release.starts_with('2') || release.starts_with("v2") {
            Some(ModelVariant::V2_1)
        } else {
            Some(ModelVariant::V1_5)
        }
    }

    /// Repository holding the CLIP tokenizer for this release.
    pub fn tokenizer_repo(&self) -> &'static str {
        // v2.1 shares the vocabulary; its config pads with `!` instead of `<|endoftext|>`.
        match self {
            ModelVariant::V1_5 | ModelVariant::V2_1 => "openai/clip-vit-base-patch32",
        }
    }
}

/// Load a model based on its repository id, detecting the release from the name.
pub async fn load_model(
    model_name: &str,
    api: Api,
    options: LoadOptions,
) -> Result<Arc<dyn ImagePipeline>> {
    let variant = ModelVariant::from_name(model_name)
        .ok_or_else(|| anyhow!("Unsupported model: {}", model_name))?;

    info!(model = model_name, ?variant, "loading model");

    let model = StableDiffusionLoader::load(model_name, variant, api, options).await?;
    Ok(Arc::new(model))
}
