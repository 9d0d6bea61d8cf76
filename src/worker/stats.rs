//! Per-session performance counters.

use std::time::Duration;

use serde_json::Value;

use crate::protocol::{InferenceRequest, LanguagePair, PerformanceReport};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    inference_time: Duration,
    translated_words: u64,
    completed_requests: u64,
}

impl EngineStats {
    /// Record one completed request.
    pub fn record(&mut self, elapsed: Duration, words: u64) {
        self.inference_time += elapsed;
        self.translated_words += words;
        self.completed_requests += 1;
    }

    pub fn completed_requests(&self) -> u64 {
        self.completed_requests
    }

    pub fn report(&self, language_pair: &LanguagePair) -> PerformanceReport {
        PerformanceReport {
            source_language: language_pair.source_language.clone(),
            target_language: language_pair.target_language.clone(),
            total_inference_seconds: self.inference_time.as_secs_f64(),
            total_translated_words: self.translated_words,
            total_completed_requests: self.completed_requests,
        }
    }
}

/// Whitespace-separated words across the string values of a request: the
/// whole request when it is a string, otherwise its `args` array.
pub fn count_words(request: &InferenceRequest) -> u64 {
    fn words(value: &Value) -> u64 {
        value
            .as_str()
            .map(|text| text.split_whitespace().count() as u64)
            .unwrap_or(0)
    }

    match &request.0 {
        Value::String(_) => words(&request.0),
        other => other
            .get("args")
            .and_then(Value::as_array)
            .map(|args| args.iter().map(words).sum())
            .unwrap_or(0),
    }
}
