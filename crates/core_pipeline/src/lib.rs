//! Core pipeline for textscan
//!
//! This crate provides the detection-and-reporting pipeline: preprocessing
//! filters, OCR invocation through a pluggable engine, confidence
//! thresholding, batch scanning of image folders, and analysis of the
//! resulting reports.

pub mod config;
pub mod confidence;
pub mod detect;
pub mod error;
pub mod export;
pub mod ocr;
pub mod preprocess;
pub mod report;
pub mod scanner;
pub mod session;
pub mod types;

pub use config::PipelineConfig;
pub use confidence::{average_confidence, filter_by_confidence};
pub use detect::Detector;
pub use error::{PipelineError, Result};
pub use ocr::OcrEngine;
pub use scanner::BatchScanner;
pub use session::{Session, SessionState};
pub use types::*;
