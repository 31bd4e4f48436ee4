//! CSV export of single-image detections and annotated previews

use crate::error::Result;
use crate::types::Detection;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::{Read, Write};

/// Header row of the CSV export
pub const CSV_HEADER: [&str; 2] = ["Text", "Confidence Level"];

/// Box color used by [`annotate`]
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Write detections as `Text,Confidence Level` rows
pub fn write_csv<W: Write>(detections: &[Detection], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for detection in detections {
        let confidence = detection.confidence().to_string();
        csv.write_record([detection.text(), confidence.as_str()])?;
    }
    csv.flush()?;
    Ok(())
}

/// Read the confidence column back from a CSV export
///
/// Rows whose second column is not a number are skipped.
pub fn read_csv_confidences<R: Read>(reader: R) -> Result<Vec<f64>> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut values = Vec::new();
    for record in csv.records() {
        let record = record?;
        if let Some(value) = record.get(1).and_then(|v| v.parse::<f64>().ok()) {
            values.push(value);
        }
    }
    Ok(values)
}

/// Copy of `image` with a rectangle drawn around every detection
///
/// The rectangle spans the polygon's top-left and bottom-right corners.
/// Degenerate boxes are skipped.
pub fn annotate(image: &DynamicImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.to_rgb8();
    for detection in detections {
        let top_left = detection.polygon().top_left();
        let bottom_right = detection.polygon().bottom_right();
        let width = bottom_right.x - top_left.x;
        let height = bottom_right.y - top_left.y;
        if width <= 0 || height <= 0 {
            continue;
        }
        let rect = Rect::at(top_left.x, top_left.y).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
    }
    canvas
}
