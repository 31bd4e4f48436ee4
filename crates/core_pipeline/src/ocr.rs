//! OCR module
//!
//! Defines the boundary to the OCR engine and provides a Tesseract-backed
//! implementation (via leptess).

use crate::types::{Polygon, RawDetection};
use anyhow::Result;
use image::GrayImage;

/// Black-box text detector
///
/// Implementations receive a single-channel buffer and return detections in
/// their own order. An empty result means "no text found" and is not an
/// error. Engines are shared across threads, so they must be `Send + Sync`.
pub trait OcrEngine: Send + Sync {
    /// Short engine identifier, used in logs
    fn name(&self) -> &'static str;

    /// Detect text regions in an image
    fn recognize(&self, image: &GrayImage) -> Result<Vec<RawDetection>>;
}

/// Tesseract engine settings
#[derive(Debug, Clone)]
pub struct TesseractSettings {
    /// Directory holding `*.traineddata`; `None` uses Tesseract's default
    pub data_path: Option<String>,
    /// Tesseract language code(s), e.g. `eng` or `eng+deu`
    pub language: String,
}

impl Default for TesseractSettings {
    fn default() -> Self {
        Self {
            data_path: None,
            language: "eng".to_string(),
        }
    }
}

#[cfg(feature = "tesseract")]
pub use self::tesseract::TesseractEngine;

#[cfg(feature = "tesseract")]
mod tesseract {
    use super::{parse_tsv, OcrEngine, TesseractSettings};
    use crate::types::RawDetection;
    use anyhow::{anyhow, Context, Result};
    use image::GrayImage;
    use leptess::LepTess;
    use std::sync::Mutex;

    /// OCR engine backed by Tesseract
    ///
    /// The language data is loaded once, at construction. A Tesseract handle
    /// must not be used from two threads at once, so calls are serialized.
    pub struct TesseractEngine {
        handle: Mutex<Handle>,
    }

    /// Owned Tesseract handle
    struct Handle(LepTess);

    // SAFETY: the Tesseract API object has no thread affinity; it is only
    // reached through the engine's mutex, so it is never used concurrently.
    unsafe impl Send for Handle {}

    impl TesseractEngine {
        /// Create the engine, failing early if Tesseract cannot start
        pub fn new(settings: TesseractSettings) -> Result<Self> {
            let tesseract = open(&settings)?;
            Ok(Self {
                handle: Mutex::new(Handle(tesseract)),
            })
        }
    }

    fn open(settings: &TesseractSettings) -> Result<LepTess> {
        LepTess::new(settings.data_path.as_deref(), &settings.language).with_context(|| {
            format!(
                "Failed to initialize Tesseract with language '{}'. Is Tesseract installed?",
                settings.language
            )
        })
    }

    impl OcrEngine for TesseractEngine {
        fn name(&self) -> &'static str {
            "tesseract"
        }

        fn recognize(&self, image: &GrayImage) -> Result<Vec<RawDetection>> {
            // leptess requires image data in a standard format (PNG, JPEG, etc.)
            let mut png_bytes = Vec::new();
            let mut cursor = std::io::Cursor::new(&mut png_bytes);
            image
                .write_to(&mut cursor, image::ImageFormat::Png)
                .context("Failed to encode image as PNG")?;

            let mut handle = self
                .handle
                .lock()
                .map_err(|_| anyhow!("Tesseract handle poisoned by an earlier panic"))?;
            let tesseract = &mut handle.0;

            tesseract
                .set_image_from_mem(&png_bytes)
                .context("Failed to load image into Tesseract")?;

            let tsv = tesseract
                .get_tsv_text(0)
                .context("Failed to read Tesseract TSV output")?;

            Ok(parse_tsv(&tsv))
        }
    }
}

/// Word-level TSV record level
const TSV_WORD_LEVEL: &str = "5";

/// Line accumulator used while grouping TSV words
struct LineBuilder {
    key: (String, String, String, String),
    words: Vec<String>,
    confidences: Vec<f64>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl LineBuilder {
    fn finish(self) -> RawDetection {
        let confidence = if self.confidences.is_empty() {
            0.0
        } else {
            self.confidences.iter().sum::<f64>() / self.confidences.len() as f64
        };
        RawDetection {
            polygon: Polygon::from_rect(
                self.left,
                self.top,
                self.right - self.left,
                self.bottom - self.top,
            ),
            text: self.words.join(" "),
            confidence: (confidence / 100.0).clamp(0.0, 1.0),
        }
    }
}

/// Turn Tesseract TSV output into one detection per text line
///
/// Columns: `level page_num block_num par_num line_num word_num left top
/// width height conf text`. Only word rows with non-blank text are used;
/// words sharing page, block, paragraph and line are merged into a single
/// detection whose box is the union of the word boxes and whose confidence
/// is the mean word confidence scaled from percent to `[0, 1]`.
/// Malformed rows are ignored.
pub fn parse_tsv(tsv: &str) -> Vec<RawDetection> {
    let mut lines = Vec::new();
    let mut current: Option<LineBuilder> = None;

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != TSV_WORD_LEVEL {
            continue;
        }

        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }

        let numbers: Option<Vec<i32>> = cols[6..10].iter().map(|c| c.parse().ok()).collect();
        let (Some(numbers), Ok(conf)) = (numbers, cols[10].parse::<f64>()) else {
            continue;
        };
        let (left, top, width, height) = (numbers[0], numbers[1], numbers[2], numbers[3]);

        let key = (
            cols[1].to_string(),
            cols[2].to_string(),
            cols[3].to_string(),
            cols[4].to_string(),
        );

        if let Some(line) = current.as_mut().filter(|line| line.key == key) {
            line.left = line.left.min(left);
            line.top = line.top.min(top);
            line.right = line.right.max(left + width);
            line.bottom = line.bottom.max(top + height);
            line.words.push(text.to_string());
            if conf >= 0.0 {
                line.confidences.push(conf);
            }
            continue;
        }

        if let Some(done) = current.take() {
            lines.push(done.finish());
        }
        current = Some(LineBuilder {
            key,
            words: vec![text.to_string()],
            confidences: if conf >= 0.0 { vec![conf] } else { Vec::new() },
            left,
            top,
            right: left + width,
            bottom: top + height,
        });
    }

    if let Some(done) = current {
        lines.push(done.finish());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn tsv(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for row in rows {
            out.push('\n');
            out.push_str(row);
        }
        out
    }

    #[test]
    fn test_parse_tsv_groups_words_into_lines() {
        let input = tsv(&[
            "1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t",
            "4\t1\t1\t1\t1\t0\t166\t126\t282\t56\t-1\t",
            "5\t1\t1\t1\t1\t1\t166\t126\t120\t56\t96.0\tROAD",
            "5\t1\t1\t1\t1\t2\t300\t130\t148\t50\t90.0\tCLOSED",
            "5\t1\t1\t1\t2\t1\t170\t200\t100\t30\t50\tDETOUR",
        ]);

        let detections = parse_tsv(&input);
        assert_eq!(detections.len(), 2);

        assert_eq!(detections[0].text, "ROAD CLOSED");
        assert!((detections[0].confidence - 0.93).abs() < 1e-6);
        assert_eq!(detections[0].polygon.top_left(), Point::new(166, 126));
        assert_eq!(detections[0].polygon.bottom_right(), Point::new(448, 182));

        assert_eq!(detections[1].text, "DETOUR");
        assert!((detections[1].confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_parse_tsv_skips_blank_words_and_bad_rows() {
        let input = tsv(&[
            "5\t1\t1\t1\t1\t1\t10\t10\t5\t5\t95\t   ",
            "5\t1\t1\t1\t1\t2\tten\t10\t5\t5\t95\tbad",
            "5\t1\t1\t1",
            "5\t1\t1\t1\t1\t3\t20\t10\t5\t5\t80\tok",
        ]);

        let detections = parse_tsv(&input);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].text, "ok");
    }

    #[cfg(feature = "tesseract")]
    #[test]
    fn test_tesseract_engine_is_shareable() {
        fn assert_shareable<T: OcrEngine + Send + Sync + 'static>() {}
        assert_shareable::<TesseractEngine>();
    }

    #[test]
    fn test_parse_tsv_empty_output_is_no_text() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv(HEADER).is_empty());
    }

    #[test]
    fn test_parse_tsv_confidence_stays_in_unit_range() {
        let input = tsv(&["5\t1\t1\t1\t1\t1\t0\t0\t1\t1\t250\tloud"]);
        assert_eq!(parse_tsv(&input)[0].confidence, 1.0);
    }
}
