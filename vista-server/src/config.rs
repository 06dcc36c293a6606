use clap::Parser;
use vista_core::{DeviceMap, LoadOptions, Precision};

/// Command line and environment configuration for the server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "EventVista image generation server")]
pub struct Args {
    /// Host address to bind the server to
    #[arg(long, env = "VISTA_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "VISTA_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Pretrained model repository on the Hugging Face hub
    #[arg(long, env = "VISTA_MODEL", default_value = "runwayml/stable-diffusion-v1-5")]
    pub model: String,

    /// Access token for gated or private model repositories
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Use CPU instead of GPU
    #[arg(long, env = "VISTA_CPU")]
    pub cpu: bool,

    /// Accelerator ordinal to place the pipeline on
    #[arg(long, env = "VISTA_DEVICE", default_value_t = 0)]
    pub device: usize,

    /// Load F32 weights on the accelerator instead of F16
    #[arg(long, env = "VISTA_FULL_PRECISION")]
    pub full_precision: bool,

    /// Chunk size for sliced attention
    #[arg(long, env = "VISTA_ATTENTION_SLICE_SIZE", default_value_t = 1)]
    pub attention_slice_size: usize,

    /// Maximum number of generations running at once (unbounded when unset)
    #[arg(long, env = "VISTA_MAX_CONCURRENT")]
    pub max_concurrent_generations: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long, env = "VISTA_LOG_JSON")]
    pub log_json: bool,
}

impl Args {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            device_map: DeviceMap::from_flags(self.cpu, self.device),
            precision: if self.full_precision {
                Precision::Full
            } else {
                Precision::Half
            },
            attention_slice_size: Some(self.attention_slice_size.max(1)),
            cpu_offload: true,
            ..LoadOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_deployment() {
        let args = Args::parse_from(["vista-server"]);
        assert_eq!(args.model, "runwayml/stable-diffusion-v1-5");
        assert_eq!(args.bind_address(), "0.0.0.0:8000");
        assert_eq!(args.max_concurrent_generations, None);

        let options = args.load_options();
        assert_eq!(options.device_map, DeviceMap::Ordinal(0));
        assert_eq!(options.precision, Precision::Half);
        assert!(options.cpu_offload);
    }

    #[test]
    fn cpu_and_precision_flags() {
        let args = Args::parse_from(["vista-server", "--cpu", "--full-precision", "--port", "9000"]);
        let options = args.load_options();
        assert_eq!(options.device_map, DeviceMap::ForceCpu);
        assert_eq!(options.precision, Precision::Full);
        assert_eq!(args.port, 9000);
    }
}
