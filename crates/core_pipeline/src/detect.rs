//! Detection orchestrator
//!
//! Runs one image through filter → grayscale reduction → OCR engine and
//! turns the raw engine output into tagged [`Detection`] records.

use crate::error::{PipelineError, Result};
use crate::ocr::OcrEngine;
use crate::preprocess::{apply_filter, load_image, to_ocr_input};
use crate::types::{Detection, FilterKind, RawDetection};
use image::{DynamicImage, GrayImage};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Owns the OCR engine handle and runs detections with it
///
/// Cloning is cheap and shares the same engine instance, so the batch
/// scanner, interactive sessions and the HTTP server can all use one engine.
#[derive(Clone)]
pub struct Detector {
    engine: Arc<dyn OcrEngine>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("engine", &self.engine.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Detector {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            engine,
            timeout: None,
        }
    }

    /// Bound each engine call
    ///
    /// The call runs on a worker thread; if it does not answer in time the
    /// image fails with [`PipelineError::OcrTimeout`] and the worker is left
    /// to finish on its own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Detect text in an already decoded image
    pub fn detect(&self, image: &DynamicImage, kind: FilterKind) -> Result<Vec<Detection>> {
        let filtered = apply_filter(image, kind);
        let gray = to_ocr_input(&filtered);

        let started = Instant::now();
        let raw = self.recognize(gray)?;
        debug!(
            engine = self.engine.name(),
            filter = %kind,
            detections = raw.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "OCR finished"
        );

        Ok(raw.into_iter().map(|r| tag(r, kind)).collect())
    }

    /// Load an image file and detect text in it
    ///
    /// Undecodable files fail with [`PipelineError::ImageLoad`]; an image
    /// without text succeeds with an empty list.
    pub fn detect_file(&self, path: &Path, kind: FilterKind) -> Result<Vec<Detection>> {
        let image = load_image(path)?;
        self.detect(&image, kind)
    }

    fn recognize(&self, gray: GrayImage) -> Result<Vec<RawDetection>> {
        let Some(timeout) = self.timeout else {
            return self.engine.recognize(&gray).map_err(PipelineError::Ocr);
        };

        let (tx, rx) = mpsc::channel();
        let engine = Arc::clone(&self.engine);
        thread::Builder::new()
            .name("ocr-worker".to_string())
            .spawn(move || {
                // The receiver may be gone after a timeout.
                let _ = tx.send(engine.recognize(&gray));
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(PipelineError::Ocr),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(engine = self.engine.name(), ?timeout, "OCR call timed out");
                Err(PipelineError::OcrTimeout(timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(PipelineError::Ocr(anyhow::anyhow!(
                "OCR worker stopped without a result"
            ))),
        }
    }
}

/// Wrap a raw engine result, keeping its confidence and polygon
fn tag(raw: RawDetection, kind: FilterKind) -> Detection {
    let confidence = if raw.confidence.is_nan() {
        warn!(text = %raw.text, "engine returned NaN confidence, using 0");
        0.0
    } else if !(0.0..=1.0).contains(&raw.confidence) {
        warn!(
            text = %raw.text,
            confidence = raw.confidence,
            "engine confidence outside [0, 1], clamping"
        );
        raw.confidence.clamp(0.0, 1.0)
    } else {
        raw.confidence
    };
    Detection::new(raw.text, confidence, raw.polygon, kind)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::Polygon;
    use image::{ImageBuffer, Luma, Rgb};
    use std::sync::Mutex;

    /// Engine returning a fixed script and remembering what it saw
    pub(crate) struct ScriptedEngine {
        pub results: Vec<RawDetection>,
        pub seen: Mutex<Vec<(u32, u32)>>,
    }

    impl ScriptedEngine {
        pub(crate) fn new(results: Vec<RawDetection>) -> Self {
            Self {
                results,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn recognize(&self, image: &GrayImage) -> anyhow::Result<Vec<RawDetection>> {
            self.seen.lock().unwrap().push(image.dimensions());
            Ok(self.results.clone())
        }
    }

    struct FailingEngine;

    impl OcrEngine for FailingEngine {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn recognize(&self, _image: &GrayImage) -> anyhow::Result<Vec<RawDetection>> {
            anyhow::bail!("model weights missing")
        }
    }

    struct SlowEngine;

    impl OcrEngine for SlowEngine {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn recognize(&self, _image: &GrayImage) -> anyhow::Result<Vec<RawDetection>> {
            thread::sleep(Duration::from_millis(500));
            Ok(Vec::new())
        }
    }

    pub(crate) fn raw(text: &str, confidence: f64) -> RawDetection {
        RawDetection {
            polygon: Polygon::from_rect(1, 2, 30, 10),
            text: text.to_string(),
            confidence,
        }
    }

    fn color_image() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(20, 10, Rgb([200u8, 100u8, 50u8])))
    }

    #[test]
    fn test_detect_tags_filter_and_keeps_values() {
        let engine = Arc::new(ScriptedEngine::new(vec![raw("STOP", 0.875), raw("AHEAD", 0.25)]));
        let detector = Detector::new(engine.clone());

        let detections = detector.detect(&color_image(), FilterKind::Closing).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].text(), "STOP");
        assert_eq!(detections[0].confidence(), 0.875);
        assert_eq!(detections[0].polygon(), &Polygon::from_rect(1, 2, 30, 10));
        assert!(detections
            .iter()
            .all(|d| d.source_filter() == FilterKind::Closing));
        assert_eq!(engine.seen.lock().unwrap().as_slice(), &[(20, 10)]);
    }

    #[test]
    fn test_detect_empty_result_is_success() {
        let detector = Detector::new(Arc::new(ScriptedEngine::new(Vec::new())));
        let image = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(4, 4, Luma([0u8])));
        assert!(detector.detect(&image, FilterKind::None).unwrap().is_empty());
    }

    #[test]
    fn test_detect_clamps_out_of_range_confidence() {
        let detector = Detector::new(Arc::new(ScriptedEngine::new(vec![
            raw("hi", 1.5),
            raw("lo", -0.5),
            raw("nan", f64::NAN),
        ])));
        let detections = detector.detect(&color_image(), FilterKind::None).unwrap();
        let confidences: Vec<f64> = detections.iter().map(|d| d.confidence()).collect();
        assert_eq!(confidences, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_detect_file_missing_is_load_error() {
        let detector = Detector::new(Arc::new(ScriptedEngine::new(Vec::new())));
        let result = detector.detect_file(Path::new("/nonexistent/sign.png"), FilterKind::None);
        assert!(matches!(result, Err(PipelineError::ImageLoad { .. })));
    }

    #[test]
    fn test_engine_failure_is_ocr_error() {
        let detector = Detector::new(Arc::new(FailingEngine));
        let err = detector.detect(&color_image(), FilterKind::None).unwrap_err();
        assert!(matches!(err, PipelineError::Ocr(_)));
        assert!(err.to_string().contains("model weights missing"));
    }

    #[test]
    fn test_engine_failure_through_worker_thread() {
        let detector = Detector::new(Arc::new(FailingEngine)).with_timeout(Duration::from_secs(5));
        let err = detector.detect(&color_image(), FilterKind::None).unwrap_err();
        assert!(matches!(err, PipelineError::Ocr(_)));
    }

    #[test]
    fn test_timeout_bounds_slow_engine() {
        let detector = Detector::new(Arc::new(SlowEngine)).with_timeout(Duration::from_millis(20));
        let err = detector.detect(&color_image(), FilterKind::None).unwrap_err();
        assert!(matches!(err, PipelineError::OcrTimeout(_)));
        assert!(err.is_per_image());
    }

    #[test]
    fn test_timeout_not_hit_by_fast_engine() {
        let detector = Detector::new(Arc::new(ScriptedEngine::new(vec![raw("ok", 0.5)])))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(detector.detect(&color_image(), FilterKind::None).unwrap().len(), 1);
    }
}
