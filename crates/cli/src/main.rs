//! textscan CLI
//!
//! Command-line interface for the text detection pipeline: batch scans of
//! image folders, single-image detection, and analysis of scan reports.
//!
//! Copyright (c) 2025 Michael A Wright

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use core_pipeline::export::read_csv_confidences;
use core_pipeline::report::{diff_lines, extract_confidences};
use core_pipeline::{
    average_confidence, BatchScanner, FilterKind, PipelineConfig, ScanReport, Session,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

#[derive(Parser)]
#[command(name = "textscan")]
#[command(about = "Detect text in images: filter -> OCR -> report", long_about = None)]
#[command(version, long_version = env!("TEXTSCAN_LONG_VERSION"))]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every .jpg/.jpeg/.png in a folder and write a text report
    Scan {
        /// Folder containing images
        #[arg(short, long)]
        input: PathBuf,

        /// Text report to write
        #[arg(short, long)]
        output: PathBuf,

        /// Filter index (0-7) or name; unknown values mean no filter
        #[arg(short, long, default_value = "none")]
        filter: String,

        /// Also write the structured report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Detect text in a single image
    Detect {
        /// Image file
        #[arg(short, long)]
        image: PathBuf,

        /// Filter index (0-7) or name; unknown values mean no filter
        #[arg(short, long, default_value = "none")]
        filter: String,

        /// Keep detections with confidence above this value
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Export the kept detections as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Save a copy of the image with boxes around the kept detections
        #[arg(long)]
        annotate: Option<PathBuf>,
    },

    /// Average the confidence values of a report (.txt), export (.csv) or JSON report
    Average {
        /// Report file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Compare two reports line by line
    Diff {
        /// First report
        first: PathBuf,

        /// Second report
        second: PathBuf,
    },

    /// List the available filters
    Filters,
}

fn main() -> Result<()> {
    // Diagnostics go to stderr so reports printed on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!(
        version = built_info::PKG_VERSION,
        target = built_info::TARGET,
        profile = built_info::PROFILE,
        "textscan starting"
    );

    let cli = Cli::parse();
    let config = PipelineConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            input,
            output,
            filter,
            json,
        } => run_scan(&config, &input, &output, &filter, json.as_deref()),
        Commands::Detect {
            image,
            filter,
            threshold,
            csv,
            annotate,
        } => run_detect(
            &config,
            &image,
            &filter,
            threshold.unwrap_or(config.detect.threshold),
            csv.as_deref(),
            annotate.as_deref(),
        ),
        Commands::Average { input } => {
            let values = confidences_from_file(&input)?;
            match average_confidence(&values) {
                Some(average) => println!("Average confidence value: {average}"),
                None => println!("No confidence values found in {}.", input.display()),
            }
            Ok(())
        }
        Commands::Diff { first, second } => {
            let first_text = std::fs::read_to_string(&first)
                .with_context(|| format!("Failed to read {}", first.display()))?;
            let second_text = std::fs::read_to_string(&second)
                .with_context(|| format!("Failed to read {}", second.display()))?;
            print!("{}", diff_lines(&first_text, &second_text));
            println!("Comparison completed.");
            Ok(())
        }
        Commands::Filters => {
            for kind in FilterKind::ALL {
                println!("{} - {}", kind.index(), kind);
            }
            Ok(())
        }
    }
}

fn run_scan(
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
    filter: &str,
    json: Option<&Path>,
) -> Result<()> {
    let kind = FilterKind::parse_lenient(filter);
    let scanner = BatchScanner::new(config.detector()?);

    let file = File::create(output)
        .with_context(|| format!("Failed to create report {}", output.display()))?;
    let mut sink = BufWriter::new(file);
    let report = scanner
        .scan(input, kind, &mut sink)
        .with_context(|| format!("Scan of {} failed", input.display()))?;

    if let Some(json) = json {
        let file = File::create(json)
            .with_context(|| format!("Failed to create {}", json.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)
            .context("Failed to write JSON report")?;
        info!(path = %json.display(), "JSON report written");
    }

    println!(
        "Success! {} image(s) scanned, {} skipped, report written to {}",
        report.entries.len(),
        report.skip_count(),
        output.display()
    );
    Ok(())
}

fn run_detect(
    config: &PipelineConfig,
    image: &Path,
    filter: &str,
    threshold: f64,
    csv: Option<&Path>,
    annotate: Option<&Path>,
) -> Result<()> {
    let mut session = Session::new(config.detector()?);
    session.load(image)?;
    session.apply_filter(FilterKind::parse_lenient(filter))?;
    session.set_threshold(threshold);

    let kept = session.detect()?;
    info!(
        kept = kept.len(),
        total = session.all_detections().len(),
        threshold,
        "detection finished"
    );
    for detection in &kept {
        println!(
            "Text: {}, Confidence: {}",
            detection.text(),
            detection.confidence()
        );
    }

    if let Some(path) = csv {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        session.export_csv(BufWriter::new(file))?;
        println!("Text data saved to {}", path.display());
    }

    if let Some(path) = annotate {
        session
            .annotated()?
            .save(path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        println!("Annotated image saved to {}", path.display());
    }
    Ok(())
}

/// Confidence values from a JSON report, a CSV export or a text report
fn confidences_from_file(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("json") => {
            let report: ScanReport = serde_json::from_str(&text)
                .with_context(|| format!("{} is not a scan report", path.display()))?;
            Ok(report.confidences())
        }
        Some("csv") => {
            let values = read_csv_confidences(text.as_bytes())?;
            if values.is_empty() {
                Ok(extract_confidences(&text))
            } else {
                Ok(values)
            }
        }
        _ => Ok(extract_confidences(&text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::try_parse_from([
            "textscan", "scan", "-i", "photos", "-o", "out.txt", "-f", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Scan { filter, json, .. } => {
                assert_eq!(FilterKind::parse_lenient(&filter), FilterKind::Opening);
                assert!(json.is_none());
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_cli_parses_detect_with_global_config() {
        let cli = Cli::try_parse_from([
            "textscan",
            "detect",
            "--image",
            "sign.png",
            "--threshold",
            "0.25",
            "--config",
            "textscan.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("textscan.toml")));
        match cli.command {
            Commands::Detect { threshold, .. } => assert_eq!(threshold, Some(0.25)),
            _ => panic!("expected detect"),
        }
    }

    #[test]
    fn test_confidences_from_text_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        fs::write(&path, "File: a.png\nText: x, Confidence: 0.5\n\n").unwrap();
        assert_eq!(confidences_from_file(&path).unwrap(), vec![0.5]);
    }

    #[test]
    fn test_confidences_from_csv_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.csv");
        fs::write(&path, "Text,Confidence Level\nROAD,0.75\nSTOP,0.25\n").unwrap();
        assert_eq!(confidences_from_file(&path).unwrap(), vec![0.75, 0.25]);
    }

    #[test]
    fn test_confidences_from_labelled_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labelled.csv");
        fs::write(&path, "\"Text: a, Confidence: 0.5\"\n").unwrap();
        assert_eq!(confidences_from_file(&path).unwrap(), vec![0.5]);
    }

    #[test]
    fn test_confidences_from_json_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let report = ScanReport::new(FilterKind::None);
        fs::write(&path, serde_json::to_string(&report).unwrap()).unwrap();
        assert!(confidences_from_file(&path).unwrap().is_empty());
    }

    #[test]
    fn test_confidences_from_missing_file() {
        assert!(confidences_from_file(Path::new("/nonexistent/report.txt")).is_err());
    }
}
