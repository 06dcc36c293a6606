use thiserror::Error;

use crate::is_out_of_memory;

/// Failure of a single generation run.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("accelerator out of memory: {0}")]
    OutOfMemory(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl GenerationError {
    /// Sorts a raw sampling error into an out-of-memory condition or a generic failure.
    pub fn classify(err: anyhow::Error) -> Self {
        if is_out_of_memory(&err) {
            Self::OutOfMemory(format!("{err:#}"))
        } else {
            Self::Failed(err)
        }
    }

    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory(_))
    }
}
