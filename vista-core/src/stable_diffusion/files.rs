use std::path::PathBuf;

use anyhow::{Context, Result};
use hf_hub::api::tokio::Api;
use tracing::debug;

use crate::ModelVariant;

/// Local paths of every weight file the pipeline needs.
pub(super) struct WeightFiles {
    pub tokenizer: PathBuf,
    pub text_encoder: PathBuf,
    pub unet: PathBuf,
    pub vae: PathBuf,
}

fn weight_name(component: &str, stem: &str, use_f16: bool) -> String {
    if use_f16 {
        format!("{component}/{stem}.fp16.safetensors")
    } else {
        format!("{component}/{stem}.safetensors")
    }
}

impl WeightFiles {
    pub async fn fetch(
        api: &Api,
        repo_id: &str,
        variant: ModelVariant,
        use_f16: bool,
    ) -> Result<Self> {
        let repo = api.model(repo_id.to_string());
        let get = |name: String| {
            let repo = &repo;
            async move {
                debug!(file = %name, "fetching weights");
                repo.get(&name)
                    .await
                    .with_context(|| format!("failed to get {name} from {repo_id}"))
            }
        };

        let tokenizer = api
            .model(variant.tokenizer_repo().to_string())
            .get("tokenizer.json")
            .await
            .context("failed to get CLIP tokenizer")?;
        let text_encoder = get(weight_name("text_encoder", "model", use_f16)).await?;
        let unet = get(weight_name("unet", "diffusion_pytorch_model", use_f16)).await?;
        let vae = get(weight_name("vae", "diffusion_pytorch_model", use_f16)).await?;

        Ok(Self {
            tokenizer,
            text_encoder,
            unet,
            vae,
        })
    }
}
