use anyhow::Result;
use clap::Parser;
use hf_hub::api::tokio::ApiBuilder;
use std::sync::Arc;
use tokio::{self, net::TcpListener};
use tracing::{error, info, warn};
use vista_server::{router, telemetry, AppState, Args, PipelineState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    telemetry::init_tracing(args.log_json);

    info!(model = %args.model, "starting EventVista image generator");
    if args.hf_token.is_none() {
        warn!("HF_TOKEN is not set, gated model repositories will fail to download");
    }

    // --- Load the pipeline once; a failure leaves the server up without a model ---
    let mut builder = ApiBuilder::new();
    if let Some(token) = args.hf_token.clone() {
        builder = builder.with_token(Some(token));
    }
    let loaded = match builder.build() {
        Ok(api) => vista_core::load_model(&args.model, api, args.load_options()).await,
        Err(e) => Err(e.into()),
    };
    let pipeline = PipelineState::from_load(loaded);
    match &pipeline {
        PipelineState::Loaded(model) => {
            info!(device = %model.device_label(), "pipeline loaded successfully")
        }
        PipelineState::Failed(reason) => error!(%reason, "error loading pipeline"),
    }

    let state = AppState::new(args.model.clone(), pipeline)
        .with_concurrency_limit(args.max_concurrent_generations);
    let app = router(Arc::new(state));

    // --- Start the server ---
    let listener = TcpListener::bind(args.bind_address()).await?;
    info!("started server on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
