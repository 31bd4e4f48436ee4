//! Pipeline configuration
//!
//! Settings stored in TOML format:
//!
//! ```toml
//! [ocr]
//! language = "eng"
//! data_path = "/usr/share/tesseract-ocr/5/tessdata"
//! timeout_secs = 120
//!
//! [detect]
//! threshold = 0.5
//! ```

use crate::error::PipelineError;
use crate::ocr::TesseractSettings;
use crate::session::DEFAULT_THRESHOLD;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Pipeline settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// OCR engine settings
    pub ocr: OcrConfig,
    /// Detection settings
    pub detect: DetectConfig,
}

/// OCR engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract language code(s)
    pub language: String,
    /// Directory holding the language data
    pub data_path: Option<String>,
    /// Upper bound for one OCR call in seconds; 0 disables the bound
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            data_path: None,
            timeout_secs: 120,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn tesseract_settings(&self) -> TesseractSettings {
        TesseractSettings {
            data_path: self.data_path.clone(),
            language: self.language.clone(),
        }
    }
}

/// Detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Default confidence threshold for single-image detection
    pub threshold: f64,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that the type system cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.ocr.language.trim().is_empty() {
            return Err(PipelineError::Config("ocr.language must not be empty".into()));
        }
        if !self.detect.threshold.is_finite() {
            return Err(PipelineError::Config("detect.threshold must be a number".into()));
        }
        Ok(())
    }

    /// Build a Tesseract-backed detector from these settings
    #[cfg(feature = "tesseract")]
    pub fn detector(&self) -> Result<crate::detect::Detector> {
        use crate::ocr::TesseractEngine;
        use std::sync::Arc;

        let engine = TesseractEngine::new(self.ocr.tesseract_settings())?;
        let detector = crate::detect::Detector::new(Arc::new(engine));
        Ok(match self.ocr.timeout() {
            Some(timeout) => detector.with_timeout(timeout),
            None => detector,
        })
    }
}
