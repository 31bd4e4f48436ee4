//! Batch scanner
//!
//! Runs every image of a directory through the detection orchestrator and
//! accumulates a [`ScanReport`]. A file that cannot be processed is logged,
//! recorded as skipped and the scan moves on.

use crate::detect::Detector;
use crate::error::Result;
use crate::types::{FilterKind, ReportEntry, ScanProgress, ScanReport, SkippedFile};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// File extensions picked up by a scan (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// True if the path has one of the [`IMAGE_EXTENSIONS`]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Image files directly inside `dir`, in directory listing order
///
/// The order is whatever the file system returns; it is not sorted.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )
        .into());
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            images.push(entry.into_path());
        }
    }
    Ok(images)
}

/// Drives the orchestrator over a directory
pub struct BatchScanner {
    detector: Detector,
}

impl BatchScanner {
    pub fn new(detector: Detector) -> Self {
        Self { detector }
    }

    /// Scan a directory, streaming the text report to `sink`
    pub fn scan<W: Write>(&self, dir: &Path, kind: FilterKind, sink: &mut W) -> Result<ScanReport> {
        self.scan_with_progress(dir, kind, sink, |progress| info!("{progress}"))
    }

    /// Scan a directory, calling `on_progress` after every file
    ///
    /// Only listing the directory and writing to `sink` can fail the scan;
    /// per-image failures end up in [`ScanReport::skipped`].
    pub fn scan_with_progress<W, F>(
        &self,
        dir: &Path,
        kind: FilterKind,
        sink: &mut W,
        mut on_progress: F,
    ) -> Result<ScanReport>
    where
        W: Write,
        F: FnMut(&ScanProgress),
    {
        let images = list_images(dir)?;
        let total = images.len();
        info!(dir = %dir.display(), total, filter = %kind, "starting scan");

        let mut report = ScanReport::new(kind);
        for (index, path) in images.iter().enumerate() {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());

            match self.detector.detect_file(path, kind) {
                Ok(detections) => {
                    let entry = ReportEntry {
                        filename,
                        detections,
                    };
                    write!(sink, "{entry}")?;
                    report.entries.push(entry);
                }
                Err(e) if e.is_per_image() => {
                    warn!(file = %filename, error = %e, "skipping image");
                    report.skipped.push(SkippedFile {
                        filename,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }

            on_progress(&ScanProgress {
                processed: index + 1,
                total,
                filter: kind,
            });
        }
        sink.flush()?;

        info!(
            processed = report.entries.len(),
            skipped = report.skip_count(),
            detections = report.detection_count(),
            "scan complete"
        );
        Ok(report)
    }
}
