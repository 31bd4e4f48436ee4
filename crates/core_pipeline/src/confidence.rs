//! Confidence thresholding and aggregation

use crate::types::Detection;

/// Keep detections with `confidence > threshold`, in input order
///
/// The threshold is used as given: at or above 1 nothing survives, below 0
/// everything does.
pub fn filter_by_confidence(detections: &[Detection], threshold: f64) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.confidence() > threshold)
        .cloned()
        .collect()
}

/// Arithmetic mean, or `None` when there is nothing to average
pub fn average_confidence(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
