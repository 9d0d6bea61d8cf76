//! Destination for engine performance reports.

use crate::protocol::PerformanceReport;

pub trait TelemetrySink: Send + Sync {
    fn record_performance(&self, report: &PerformanceReport);
}

/// Writes every report to the log at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn record_performance(&self, report: &PerformanceReport) {
        let words_per_second = if report.total_inference_seconds > 0.0 {
            report.total_translated_words as f64 / report.total_inference_seconds
        } else {
            0.0
        };
        log::info!(
            "telemetry: {}-{} translated {} words in {} requests ({:.3}s, {:.1} words/s)",
            report.source_language,
            report.target_language,
            report.total_translated_words,
            report.total_completed_requests,
            report.total_inference_seconds,
            words_per_second
        );
    }
}
