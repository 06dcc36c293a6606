use anyhow::{Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::Module;
use candle_transformers::models::stable_diffusion::{
    self, clip::ClipTextTransformer, unet_2d::UNet2DConditionModel, vae::AutoEncoderKL,
    StableDiffusionConfig,
};
use hf_hub::api::tokio::Api;
use image::DynamicImage;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

mod files;

use files::WeightFiles;

use crate::{
    device_label, release_cached_memory, select_best_device, tensor_to_image, GenerationError,
    GenerationParams, ImagePipeline, LoadOptions, Loader, ModelVariant, OffloadPlan, Precision,
};

const VAE_SCALE: f64 = 0.18215;
const LATENT_CHANNELS: usize = 4;
const END_OF_TEXT: &str = "<|endoftext|>";

/// Truncates or pads CLIP token ids to exactly `max` entries.
///
/// An over-long sequence keeps its first `max - 1` ids and ends with `eos_id`.
fn fit_to_context(mut ids: Vec<u32>, max: usize, pad_id: u32, eos_id: u32) -> Vec<u32> {
    if ids.len() > max {
        ids.truncate(max.saturating_sub(1));
        ids.push(eos_id);
    }
    ids.resize(max, pad_id);
    ids
}

pub struct StableDiffusionModel {
    variant: ModelVariant,
    attention_slice_size: Option<usize>,
    plan: OffloadPlan,
    dtype: DType,
    tokenizer: Tokenizer,
    pad_id: u32,
    eos_id: u32,
    max_tokens: usize,
    text_model: ClipTextTransformer,
    unet: UNet2DConditionModel,
    vae: AutoEncoderKL,
}

fn sd_config(
    variant: ModelVariant,
    attention_slice_size: Option<usize>,
    height: usize,
    width: usize,
) -> StableDiffusionConfig {
    match variant {
        ModelVariant::V1_5 => {
            StableDiffusionConfig::v1_5(attention_slice_size, Some(height), Some(width))
        }
        ModelVariant::V2_1 => {
            StableDiffusionConfig::v2_1(attention_slice_size, Some(height), Some(width))
        }
    }
}

impl StableDiffusionModel {
    /// Encodes `prompt` with CLIP on the text encoder's device, padded to the context length.
    fn embed(&self, prompt: &str) -> Result<Tensor> {
        let ids = self
            .tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        if ids.len() > self.max_tokens {
            warn!(
                tokens = ids.len(),
                max = self.max_tokens,
                "prompt exceeds the text encoder context, truncating"
            );
        }
        let tokens = fit_to_context(ids, self.max_tokens, self.pad_id, self.eos_id);
        let tokens = Tensor::new(tokens.as_slice(), &self.plan.text_encoder)?.unsqueeze(0)?;
        Ok(self.text_model.forward(&tokens)?)
    }

    fn sample(&self, prompt: &str, params: &GenerationParams) -> Result<DynamicImage> {
        let config = sd_config(
            self.variant,
            self.attention_slice_size,
            params.height,
            params.width,
        );
        let mut scheduler = config.build_scheduler(params.steps)?;
        let device = &self.plan.unet;

        // --- Text embeddings: unconditional (negative) first, then the prompt ---
        let cond = self.embed(prompt).context("failed to encode prompt")?;
        let uncond = self
            .embed(&params.negative_prompt)
            .context("failed to encode negative prompt")?;
        let text_embeddings = Tensor::cat(&[uncond, cond], 0)?
            .to_device(device)?
            .to_dtype(self.dtype)?;

        // --- Initial latents ---
        let latents = Tensor::randn(
            0f32,
            1f32,
            (1, LATENT_CHANNELS, params.height / 8, params.width / 8),
            device,
        )?;
        let latents = (latents * scheduler.init_noise_sigma())?;
        let mut latents = latents.to_dtype(self.dtype)?;

        // --- Denoising with classifier-free guidance ---
        let timesteps = scheduler.timesteps().to_vec();
        for (index, &timestep) in timesteps.iter().enumerate() {
            let model_input = Tensor::cat(&[&latents, &latents], 0)?;
            let model_input = scheduler.scale_model_input(model_input, timestep)?;
            let noise_pred = self
                .unet
                .forward(&model_input, timestep as f64, &text_embeddings)?;
            let noise_pred = noise_pred.chunk(2, 0)?;
            let (noise_uncond, noise_text) = (&noise_pred[0], &noise_pred[1]);
            let noise_pred =
                (noise_uncond + ((noise_text - noise_uncond)? * params.guidance_scale)?)?;
            latents = scheduler.step(&noise_pred, timestep, &latents)?;
            debug!(step = index + 1, total = timesteps.len(), "denoising step done");
        }

        // --- Decode and post-process ---
        let latents = (latents.to_device(&self.plan.vae)? / VAE_SCALE)?;
        let decoded = self.vae.decode(&latents)?;
        let img = ((decoded / 2.)? + 0.5)?.to_device(&Device::Cpu)?;
        let img = (img.clamp(0f32, 1.)? * 255.)?.to_dtype(DType::U8)?;

        tensor_to_image(&img.i(0)?)
    }
}

impl ImagePipeline for StableDiffusionModel {
    fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<DynamicImage, GenerationError> {
        self.sample(prompt, params).map_err(GenerationError::classify)
    }

    fn release_cached_memory(&self) {
        release_cached_memory(&self.plan.unet);
    }

    fn device_label(&self) -> String {
        device_label(&self.plan.unet)
    }
}

pub struct StableDiffusionLoader;

impl Loader for StableDiffusionLoader {
    type Model = StableDiffusionModel;

    async fn load(
        repo_id: &str,
        variant: ModelVariant,
        api: Api,
        options: LoadOptions,
    ) -> Result<Self::Model> {
        // Configure devices.
        let device = select_best_device(options.device_map).context("failed to set up device")?;
        let plan = OffloadPlan::new(&device, options.cpu_offload);
        let use_f16 = options.precision == Precision::Half && !device.is_cpu();
        let dtype = if use_f16 { DType::F16 } else { DType::F32 };
        info!(
            device = %device_label(&device),
            ?dtype,
            offload = plan.is_split(),
            slice = ?options.attention_slice_size,
            "configured pipeline placement"
        );

        let files = WeightFiles::fetch(&api, repo_id, variant, use_f16).await?;

        let config = sd_config(
            variant,
            options.attention_slice_size,
            GenerationParams::default().height,
            GenerationParams::default().width,
        );

        // --- Tokenizer ---
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(Error::msg)
            .context("failed to load CLIP tokenizer")?;
        let vocab = tokenizer.get_vocab(true);
        let token_id = |token: &str| {
            vocab
                .get(token)
                .copied()
                .with_context(|| format!("tokenizer has no `{token}` token"))
        };
        let pad_id = token_id(config.clip.pad_with.as_deref().unwrap_or(END_OF_TEXT))?;
        let eos_id = token_id(END_OF_TEXT)?;

        // --- Text encoder (kept in F32, it is small and runs once per request) ---
        let text_model = stable_diffusion::build_clip_transformer(
            &config.clip,
            &files.text_encoder,
            &plan.text_encoder,
            DType::F32,
        )
        .context("failed to load text encoder")?;

        // --- UNet ---
        let unet = config
            .build_unet(
                &files.unet,
                &plan.unet,
                LATENT_CHANNELS,
                options.use_flash_attn,
                dtype,
            )
            .context("failed to load unet")?;

        // --- VAE ---
        let vae = config
            .build_vae(&files.vae, &plan.vae, dtype)
            .context("failed to load vae")?;

        info!(model = repo_id, "pipeline loaded");

        Ok(StableDiffusionModel {
            variant,
            attention_slice_size: options.attention_slice_size,
            dtype,
            tokenizer,
            pad_id,
            eos_id,
            max_tokens: config.clip.max_position_embeddings,
            text_model,
            unet,
            vae,
            plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOS: u32 = 49406;
    const EOS: u32 = 49407;

    fn encoding(words: u32) -> Vec<u32> {
        let mut ids = vec![BOS];
        ids.extend(1..=words);
        ids.push(EOS);
        ids
    }

    #[test]
    fn over_long_prompt_keeps_end_of_text() {
        let fitted = fit_to_context(encoding(78), 77, EOS, EOS);
        assert_eq!(fitted.len(), 77);
        assert_eq!(fitted[0], BOS);
        assert_eq!(fitted[75], 75);
        assert_eq!(fitted[76], EOS);
    }

    #[test]
    fn exact_context_is_untouched() {
        let ids = encoding(75);
        assert_eq!(ids.len(), 77);
        assert_eq!(fit_to_context(ids.clone(), 77, EOS, EOS), ids);
    }

    #[test]
    fn short_prompt_is_padded() {
        let fitted = fit_to_context(encoding(3), 77, 0, EOS);
        assert_eq!(fitted.len(), 77);
        assert_eq!(&fitted[..5], &[BOS, 1, 2, 3, EOS]);
        assert!(fitted[5..].iter().all(|&id| id == 0));
    }
}
