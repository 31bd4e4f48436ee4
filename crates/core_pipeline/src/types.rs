//! Core types for the textscan pipeline
//!
//! This module defines the records that flow between the filter engine,
//! the detection orchestrator, the batch scanner and the report utilities.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Image preprocessing transform applied before OCR
///
/// Indices follow the historical menu order (0 = none, 1-6 as in the batch
/// prompt, 7 = grayscale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Identity
    #[default]
    None,
    /// 3x3 sharpen kernel
    Sharpen,
    /// 5x5 Gaussian blur
    GaussianBlur,
    /// Morphological opening, 5x5 square
    Opening,
    /// Morphological closing, 5x5 square
    Closing,
    /// Single erosion, 5x5 square
    Erosion,
    /// Single dilation, 5x5 square
    Dilation,
    /// Luma-weighted reduction to one channel
    Grayscale,
}

impl FilterKind {
    /// Every filter, in index order
    pub const ALL: [FilterKind; 8] = [
        FilterKind::None,
        FilterKind::Sharpen,
        FilterKind::GaussianBlur,
        FilterKind::Opening,
        FilterKind::Closing,
        FilterKind::Erosion,
        FilterKind::Dilation,
        FilterKind::Grayscale,
    ];

    /// Map a numeric selector to a filter
    ///
    /// Out-of-range selectors fall back to [`FilterKind::None`] so that
    /// unattended batch runs never stop on a bad selector.
    pub fn from_index(index: i64) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or_else(|| {
                warn!(index, "unknown filter selector, using no filter");
                FilterKind::None
            })
    }

    /// Parse a selector given either as an index or as a name
    ///
    /// Names are matched case-insensitively and ignore `-`, `_` and spaces,
    /// so `gaussian-blur`, `GaussianBlur` and `blur` all select the blur.
    /// Unrecognised input falls back to [`FilterKind::None`].
    pub fn parse_lenient(selector: &str) -> Self {
        let trimmed = selector.trim();
        if let Ok(index) = trimmed.parse::<i64>() {
            return Self::from_index(index);
        }

        let normalized: String = trimmed
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "none" | "clear" | "" => FilterKind::None,
            "sharpen" => FilterKind::Sharpen,
            "gaussianblur" | "gaussian" | "blur" => FilterKind::GaussianBlur,
            "opening" | "open" => FilterKind::Opening,
            "closing" | "close" => FilterKind::Closing,
            "erosion" | "erode" => FilterKind::Erosion,
            "dilation" | "dilate" => FilterKind::Dilation,
            "grayscale" | "greyscale" | "gray" | "grey" => FilterKind::Grayscale,
            _ => {
                warn!(selector, "unknown filter name, using no filter");
                FilterKind::None
            }
        }
    }

    /// Numeric selector of this filter
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable lowercase name, as used on the command line and over HTTP
    pub fn name(self) -> &'static str {
        match self {
            FilterKind::None => "none",
            FilterKind::Sharpen => "sharpen",
            FilterKind::GaussianBlur => "gaussian_blur",
            FilterKind::Opening => "opening",
            FilterKind::Closing => "closing",
            FilterKind::Erosion => "erosion",
            FilterKind::Dilation => "dilation",
            FilterKind::Grayscale => "grayscale",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Quadrilateral around a text region
///
/// Points run clockwise from the top-left corner, so index 0 is the
/// top-left and index 2 the bottom-right of an axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polygon(pub [Point; 4]);

impl Polygon {
    /// Polygon of an axis-aligned rectangle
    pub fn from_rect(left: i32, top: i32, width: i32, height: i32) -> Self {
        let right = left + width;
        let bottom = top + height;
        Self([
            Point::new(left, top),
            Point::new(right, top),
            Point::new(right, bottom),
            Point::new(left, bottom),
        ])
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }

    pub fn top_left(&self) -> Point {
        self.0[0]
    }

    pub fn bottom_right(&self) -> Point {
        self.0[2]
    }
}

/// Raw OCR engine output, before the orchestrator tags it
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub polygon: Polygon,
    pub text: String,
    pub confidence: f64,
}

/// One recognized text region
///
/// Only the detection orchestrator creates these; the fields are read
/// through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    text: String,
    confidence: f64,
    polygon: Polygon,
    source_filter: FilterKind,
}

impl Detection {
    pub(crate) fn new(
        text: String,
        confidence: f64,
        polygon: Polygon,
        source_filter: FilterKind,
    ) -> Self {
        Self {
            text,
            confidence,
            polygon,
            source_filter,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Confidence in `[0, 1]`
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    /// Filter that was applied before this detection was made
    pub fn source_filter(&self) -> FilterKind {
        self.source_filter
    }
}

/// Results for one successfully processed image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// File name relative to the scanned directory
    pub filename: String,
    /// Detections in engine order
    pub detections: Vec<Detection>,
}

impl fmt::Display for ReportEntry {
    /// Text report block: `File:` line, one line per detection, blank line
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.filename)?;
        for detection in &self.detections {
            writeln!(
                f,
                "Text: {}, Confidence: {}",
                detection.text, detection.confidence
            )?;
        }
        writeln!(f)
    }
}

/// A file that could not be processed during a batch scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

/// Aggregated results of a batch scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Filter used for every image in the scan
    pub filter: FilterKind,
    /// Entries in directory enumeration order
    pub entries: Vec<ReportEntry>,
    /// Files that failed, in enumeration order
    pub skipped: Vec<SkippedFile>,
}

impl ScanReport {
    pub fn new(filter: FilterKind) -> Self {
        Self {
            filter,
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Number of files that were skipped
    pub fn skip_count(&self) -> usize {
        self.skipped.len()
    }

    /// Total number of detections over all entries
    pub fn detection_count(&self) -> usize {
        self.entries.iter().map(|e| e.detections.len()).sum()
    }

    /// Every confidence in the report, in report order
    pub fn confidences(&self) -> Vec<f64> {
        self.entries
            .iter()
            .flat_map(|e| e.detections.iter())
            .map(|d| d.confidence)
            .collect()
    }
}

impl fmt::Display for ScanReport {
    /// The plain-text batch report; skipped files are not part of it
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Progress notification emitted after each file of a batch scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub processed: usize,
    pub total: usize,
    pub filter: FilterKind,
}

impl fmt::Display for ScanProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scanning... ({}/{}) - Filter type: {}",
            self.processed, self.total, self.filter
        )
    }
}
