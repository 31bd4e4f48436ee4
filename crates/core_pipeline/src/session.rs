//! Interactive single-image session
//!
//! One image at a time: load it, optionally preview a filter, detect text,
//! adjust the threshold and export. The allowed actions per state are:
//!
//! | state        | load | apply_filter | clear | detect | export / annotate |
//! |--------------|------|--------------|-------|--------|-------------------|
//! | Idle         | yes  |              |       |        |                   |
//! | ImageLoaded  | yes  | yes          | yes   | yes    |                   |
//! | Filtered     | yes  | yes          | yes   | yes    |                   |
//! | Detected     | yes  |              | yes   |        | yes               |
//!
//! `set_threshold` is allowed in every state.

use crate::confidence::filter_by_confidence;
use crate::detect::Detector;
use crate::error::{PipelineError, Result};
use crate::export::{annotate, write_csv};
use crate::preprocess::{apply_filter, load_image};
use crate::types::{Detection, FilterKind};
use image::{DynamicImage, RgbImage};
use std::fmt;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Threshold used until the caller picks one
pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ImageLoaded,
    Filtered,
    Detected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::ImageLoaded => "image-loaded",
            SessionState::Filtered => "filtered",
            SessionState::Detected => "detected",
        })
    }
}

struct Loaded {
    original: DynamicImage,
    current: DynamicImage,
    filter: FilterKind,
    detections: Vec<Detection>,
}

pub struct Session {
    detector: Detector,
    state: SessionState,
    threshold: f64,
    image: Option<Loaded>,
}

impl Session {
    pub fn new(detector: Detector) -> Self {
        Self {
            detector,
            state: SessionState::Idle,
            threshold: DEFAULT_THRESHOLD,
            image: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Filter applied to the displayed image
    pub fn filter(&self) -> FilterKind {
        self.image.as_ref().map_or(FilterKind::None, |l| l.filter)
    }

    /// The image as currently displayed (after any filter)
    pub fn current_image(&self) -> Option<&DynamicImage> {
        self.image.as_ref().map(|l| &l.current)
    }

    pub fn original_image(&self) -> Option<&DynamicImage> {
        self.image.as_ref().map(|l| &l.original)
    }

    /// Load an image file; load failures are returned to the caller
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let image = load_image(path)?;
        info!(path = %path.display(), "image loaded");
        self.load_image(image);
        Ok(())
    }

    /// Start over with an already decoded image
    pub fn load_image(&mut self, image: DynamicImage) {
        self.image = Some(Loaded {
            current: image.clone(),
            original: image,
            filter: FilterKind::None,
            detections: Vec::new(),
        });
        self.state = SessionState::ImageLoaded;
    }

    /// Preview a filter
    ///
    /// Filters always start from the original image; they do not stack.
    pub fn apply_filter(&mut self, kind: FilterKind) -> Result<()> {
        self.require(&[SessionState::ImageLoaded, SessionState::Filtered], "apply a filter")?;
        let loaded = self.loaded_mut("apply a filter")?;
        loaded.current = apply_filter(&loaded.original, kind);
        loaded.filter = kind;
        self.state = if kind == FilterKind::None {
            SessionState::ImageLoaded
        } else {
            SessionState::Filtered
        };
        Ok(())
    }

    /// Drop filter and detections, back to the original image
    pub fn clear(&mut self) -> Result<()> {
        self.require(
            &[
                SessionState::ImageLoaded,
                SessionState::Filtered,
                SessionState::Detected,
            ],
            "clear",
        )?;
        let loaded = self.loaded_mut("clear")?;
        loaded.current = loaded.original.clone();
        loaded.filter = FilterKind::None;
        loaded.detections.clear();
        self.state = SessionState::ImageLoaded;
        Ok(())
    }

    /// Run OCR with the selected filter
    ///
    /// Returns the detections above the current threshold.
    pub fn detect(&mut self) -> Result<Vec<Detection>> {
        self.require(&[SessionState::ImageLoaded, SessionState::Filtered], "detect")?;
        let detector = self.detector.clone();
        let loaded = self.loaded_mut("detect")?;
        loaded.detections = detector.detect(&loaded.original, loaded.filter)?;
        self.state = SessionState::Detected;
        Ok(self.filtered_detections())
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Every detection from the last run, regardless of threshold
    pub fn all_detections(&self) -> &[Detection] {
        self.image
            .as_ref()
            .map_or(&[][..], |l| l.detections.as_slice())
    }

    /// Detections from the last run above the current threshold
    pub fn filtered_detections(&self) -> Vec<Detection> {
        filter_by_confidence(self.all_detections(), self.threshold)
    }

    /// Write the thresholded detections as CSV
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<()> {
        self.require(&[SessionState::Detected], "export")?;
        write_csv(&self.filtered_detections(), writer)
    }

    /// Original image with boxes around the thresholded detections
    pub fn annotated(&self) -> Result<RgbImage> {
        self.require(&[SessionState::Detected], "annotate")?;
        let loaded = self.loaded("annotate")?;
        Ok(annotate(&loaded.original, &self.filtered_detections()))
    }

    fn require(&self, allowed: &[SessionState], action: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PipelineError::InvalidTransition {
                state: self.state,
                action,
            })
        }
    }

    fn loaded(&self, action: &'static str) -> Result<&Loaded> {
        let state = self.state;
        self.image
            .as_ref()
            .ok_or(PipelineError::InvalidTransition { state, action })
    }

    fn loaded_mut(&mut self, action: &'static str) -> Result<&mut Loaded> {
        let state = self.state;
        self.image
            .as_mut()
            .ok_or(PipelineError::InvalidTransition { state, action })
    }
}
