//! Error taxonomy for the pipeline
//!
//! An empty detection list and an empty confidence set are not errors and
//! have no variant here; they are represented by an empty `Vec` and `None`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::session::SessionState;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source bytes could not be decoded into a pixel buffer
    #[error("failed to load image from {}: {source}", .path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The OCR engine reported a failure
    #[error("OCR engine failed: {0:#}")]
    Ocr(anyhow::Error),

    /// The OCR engine did not answer within the configured bound
    #[error("OCR engine did not finish within {0:?}")]
    OcrTimeout(Duration),

    /// A session action that is not allowed in the current state
    #[error("cannot {action} while session is {state}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("failed to write CSV export: {0}")]
    Export(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// True for failures that concern one image only
    ///
    /// The batch scanner skips these and moves on.
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            PipelineError::ImageLoad { .. } | PipelineError::Ocr(_) | PipelineError::OcrTimeout(_)
        )
    }
}
