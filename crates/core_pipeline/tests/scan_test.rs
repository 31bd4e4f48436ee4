//! Batch scan tests against real files in a scratch directory

use anyhow::Result;
use core_pipeline::report::{diff_lines, extract_confidences};
use core_pipeline::scanner::list_images;
use core_pipeline::{
    average_confidence, BatchScanner, Detector, FilterKind, OcrEngine, Polygon, RawDetection,
    ScanProgress, ScanReport,
};
use image::{GrayImage, ImageBuffer, Rgb};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Engine that answers every image with the same two lines
struct SignEngine;

impl OcrEngine for SignEngine {
    fn name(&self) -> &'static str {
        "sign"
    }

    fn recognize(&self, _image: &GrayImage) -> Result<Vec<RawDetection>> {
        Ok(vec![
            RawDetection {
                polygon: Polygon::from_rect(166, 126, 282, 56),
                text: "ROAD CLOSED".to_string(),
                confidence: 0.75,
            },
            RawDetection {
                polygon: Polygon::from_rect(10, 10, 20, 20),
                text: "DETOUR".to_string(),
                confidence: 0.25,
            },
        ])
    }
}

/// Engine that reports a single faint line
struct FaintEngine;

impl OcrEngine for FaintEngine {
    fn name(&self) -> &'static str {
        "faint"
    }

    fn recognize(&self, _image: &GrayImage) -> Result<Vec<RawDetection>> {
        Ok(vec![RawDetection {
            polygon: Polygon::from_rect(0, 0, 8, 8),
            text: "exit".to_string(),
            confidence: 0.1,
        }])
    }
}

fn scanner() -> BatchScanner {
    BatchScanner::new(Detector::new(Arc::new(SignEngine)))
}

fn write_png(dir: &Path, name: &str) {
    let img = ImageBuffer::from_pixel(32, 16, Rgb([240u8, 240u8, 240u8]));
    img.save(dir.join(name)).unwrap();
}

#[test]
fn test_scan_skips_corrupt_image_and_continues() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "valid.png");
    fs::write(dir.path().join("corrupt.png"), b"this is not a png").unwrap();

    let mut sink = Vec::new();
    let report = scanner()
        .scan(dir.path(), FilterKind::None, &mut sink)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].filename, "valid.png");
    assert_eq!(report.skip_count(), 1);
    assert_eq!(report.skipped[0].filename, "corrupt.png");
    assert!(report.skipped[0].reason.contains("corrupt.png"));
}

#[test]
fn test_scan_ignores_other_extensions_and_directories() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "a.png");
    fs::write(dir.path().join("notes.txt"), b"Confidence: 0.99").unwrap();
    fs::write(dir.path().join("empty.jpg"), b"").unwrap();
    fs::create_dir(dir.path().join("folder.png")).unwrap();

    let mut progress: Vec<ScanProgress> = Vec::new();
    let report = scanner()
        .scan_with_progress(dir.path(), FilterKind::Sharpen, &mut Vec::new(), |p| {
            progress.push(*p)
        })
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].filename, "empty.jpg");

    assert_eq!(progress.len(), 2);
    assert_eq!(progress.last().unwrap().processed, 2);
    assert!(progress.iter().all(|p| p.total == 2));
    assert!(progress.iter().all(|p| p.filter == FilterKind::Sharpen));
}

#[test]
fn test_scan_sink_matches_report_text() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "one.png");
    write_png(dir.path(), "two.jpeg");

    let mut sink = Vec::new();
    let report = scanner()
        .scan(dir.path(), FilterKind::GaussianBlur, &mut sink)
        .unwrap();
    let streamed = String::from_utf8(sink).unwrap();

    assert_eq!(streamed, report.to_string());
    assert!(streamed.contains("Text: ROAD CLOSED, Confidence: 0.75\n"));
    for entry in &report.entries {
        assert!(streamed.contains(&format!("File: {}\n", entry.filename)));
        assert!(entry
            .detections
            .iter()
            .all(|d| d.source_filter() == FilterKind::GaussianBlur));
    }
}

#[test]
fn test_scan_empty_directory() {
    let dir = TempDir::new().unwrap();
    let mut sink = Vec::new();
    let report = scanner().scan(dir.path(), FilterKind::None, &mut sink).unwrap();
    assert!(report.entries.is_empty());
    assert!(sink.is_empty());
}

#[test]
fn test_scan_missing_directory_is_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    assert!(scanner().scan(&missing, FilterKind::None, &mut Vec::new()).is_err());
}

#[test]
fn test_report_round_trip_through_analysis() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "a.png");
    write_png(dir.path(), "b.png");

    let mut sink = Vec::new();
    let report = scanner().scan(dir.path(), FilterKind::None, &mut sink).unwrap();
    let text = String::from_utf8(sink).unwrap();

    let from_text = extract_confidences(&text);
    assert_eq!(from_text, report.confidences());
    assert_eq!(average_confidence(&from_text), Some(0.5));

    let json = serde_json::to_string(&report).unwrap();
    let back: ScanReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.confidences(), from_text);

    assert!(diff_lines(&text, &text).is_identical());
}

#[test]
fn test_entries_follow_directory_listing_order() {
    let dir = TempDir::new().unwrap();
    for name in ["delta.png", "alpha.jpg", "charlie.jpeg", "bravo.png"] {
        write_png(dir.path(), name);
    }
    fs::write(dir.path().join("echo.png"), b"garbage").unwrap();

    let listed: Vec<String> = list_images(dir.path())
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(listed.len(), 5);

    let report = scanner().scan(dir.path(), FilterKind::None, &mut Vec::new()).unwrap();
    let processed: Vec<&str> = report.entries.iter().map(|e| e.filename.as_str()).collect();
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.filename.as_str()).collect();
    assert_eq!(skipped, vec!["echo.png"]);

    let expected: Vec<&str> = listed
        .iter()
        .map(String::as_str)
        .filter(|name| *name != "echo.png")
        .collect();
    assert_eq!(processed, expected);
}

#[test]
fn test_structured_and_text_confidences_agree() {
    let dir = TempDir::new().unwrap();
    write_png(dir.path(), "faint.png");

    let mut sink = Vec::new();
    let report = BatchScanner::new(Detector::new(Arc::new(FaintEngine)))
        .scan(dir.path(), FilterKind::None, &mut sink)
        .unwrap();
    let text = String::from_utf8(sink).unwrap();

    assert!(text.contains("Confidence: 0.1\n"));
    assert_eq!(report.confidences(), vec![0.1]);
    assert_eq!(
        average_confidence(&report.confidences()),
        average_confidence(&extract_confidences(&text))
    );
    assert_eq!(average_confidence(&report.confidences()), Some(0.1));
}
