use std::sync::Arc;

use tokio::sync::Semaphore;
use vista_core::{GenerationParams, ImagePipeline};

/// Outcome of the one-time model load.
#[derive(Clone)]
pub enum PipelineState {
    Loaded(Arc<dyn ImagePipeline>),
    Failed(String),
}

impl PipelineState {
    pub fn from_load(result: anyhow::Result<Arc<dyn ImagePipeline>>) -> Self {
        match result {
            Ok(pipeline) => Self::Loaded(pipeline),
            Err(e) => Self::Failed(format!("{e:#}")),
        }
    }

    pub fn pipeline(&self) -> Option<&Arc<dyn ImagePipeline>> {
        match self {
            Self::Loaded(pipeline) => Some(pipeline),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Loaded(_) => None,
            Self::Failed(reason) => Some(reason),
        }
    }
}

/// Application state shared across all handlers.
pub struct AppState {
    pub model_name: String,
    pub pipeline: PipelineState,
    pub params: GenerationParams,
    /// Caps in-flight generations when set.
    pub limiter: Option<Arc<Semaphore>>,
}

impl AppState {
    pub fn new(model_name: impl Into<String>, pipeline: PipelineState) -> Self {
        Self {
            model_name: model_name.into(),
            pipeline,
            params: GenerationParams::default(),
            limiter: None,
        }
    }

    pub fn with_concurrency_limit(mut self, limit: Option<usize>) -> Self {
        self.limiter = limit.map(|permits| Arc::new(Semaphore::new(permits.max(1))));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_load_keeps_the_reason() {
        let state = PipelineState::from_load(Err(
            anyhow::anyhow!("401 Unauthorized").context("failed to get unet weights")
        ));
        assert!(state.pipeline().is_none());
        assert_eq!(
            state.failure(),
            Some("failed to get unet weights: 401 Unauthorized")
        );
    }

    #[test]
    fn concurrency_limit_is_optional() {
        let state = AppState::new("m", PipelineState::Failed("x".into()));
        assert!(state.limiter.is_none());
        let state = state.with_concurrency_limit(Some(2));
        assert_eq!(state.limiter.map(|s| s.available_permits()), Some(2));
    }
}
