//! Result records produced by the harness.
//!
//! One record per (source, sample, strategy) triple, kept in the order the
//! harness enumerated them. Downstream code selects rows by filtering on
//! `strategy_name` and `parallelism`, never by position.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::BenchResult;
use crate::search::{parse_worker_count, Parallelism, SearchStrategy, SerialScanner};

/// A single timed measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// File name of the source the sample was taken from
    pub source_label: String,
    /// Length of the sample prefix in bytes
    pub sample_size_bytes: u64,
    /// Strategy name, e.g. `ParallelCPU-4Threads`
    pub strategy_name: String,
    /// `1` for serial, the worker count for parallel, `GPU_Cores` for the device
    pub parallelism: String,
    pub occurrence_count: u64,
    /// Wall-clock time of the `search` call, truncated to whole milliseconds
    pub duration_ms: u64,
    /// Sample size as a percentage of the full source, e.g. 25 for the 0.25 sample.
    /// Not part of the CSV table, so records read back from CSV leave it unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_percent: Option<u32>,
    /// Set when the search failed; `occurrence_count` is then 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    /// Builds the record for one `search` call on `strategy`
    pub fn new(
        source_label: &str,
        sample_size_bytes: usize,
        strategy: &dyn SearchStrategy,
        outcome: &BenchResult<u64>,
        elapsed: Duration,
    ) -> Self {
        let (occurrence_count, error) = match outcome {
            Ok(count) => (*count, None),
            Err(e) => (0, Some(e.to_string())),
        };
        Self {
            source_label: source_label.to_string(),
            sample_size_bytes: sample_size_bytes as u64,
            strategy_name: strategy.name().to_string(),
            parallelism: strategy.parallelism().to_string(),
            occurrence_count,
            duration_ms: elapsed.as_millis() as u64,
            sample_percent: None,
            error,
        }
    }

    pub fn with_sample_percent(mut self, percent: u32) -> Self {
        self.sample_percent = Some(percent);
        self
    }

    pub fn is_serial(&self) -> bool {
        self.strategy_name == SerialScanner::NAME
    }

    pub fn is_parallel_cpu(&self) -> bool {
        self.strategy_name.contains("ParallelCPU")
    }

    pub fn is_device(&self) -> bool {
        self.strategy_name.contains("GPU")
    }

    /// Worker count parsed from the `threads` column, falling back to the
    /// count embedded in a parallel strategy's name. `None` for device rows.
    pub fn worker_count(&self) -> Option<usize> {
        if self.parallelism == Parallelism::DEVICE_LABEL {
            return None;
        }
        self.parallelism
            .parse()
            .ok()
            .or_else(|| parse_worker_count(&self.strategy_name))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BenchError;

    #[test]
    fn test_record_from_success() {
        let record = ResultRecord::new(
            "Dracula.txt",
            1000,
            &SerialScanner::new(),
            &Ok(42),
            Duration::from_micros(3_999),
        );
        assert_eq!(record.source_label, "Dracula.txt");
        assert_eq!(record.sample_size_bytes, 1000);
        assert_eq!(record.strategy_name, "SerialCPU");
        assert_eq!(record.parallelism, "1");
        assert_eq!(record.occurrence_count, 42);
        assert_eq!(record.duration_ms, 3); // truncated, not rounded
        assert_eq!(record.sample_percent, None);
        assert_eq!(record.clone().with_sample_percent(25).sample_percent, Some(25));
        assert!(record.is_ok());
        assert!(record.is_serial());
    }

    #[test]
    fn test_record_from_failure() {
        let record = ResultRecord::new(
            "Dracula.txt",
            1000,
            &SerialScanner::new(),
            &Err(BenchError::execution_fault("SerialCPU", "boom")),
            Duration::ZERO,
        );
        assert_eq!(record.occurrence_count, 0);
        assert_eq!(
            record.error.as_deref(),
            Some("Execution fault in SerialCPU: boom")
        );
        assert!(!record.is_ok());
    }

    #[test]
    fn test_classification() {
        let mut record = ResultRecord {
            source_label: "a".to_string(),
            sample_size_bytes: 1,
            strategy_name: "ParallelCPU-6Threads".to_string(),
            parallelism: "6".to_string(),
            occurrence_count: 0,
            duration_ms: 0,
            sample_percent: None,
            error: None,
        };
        assert!(record.is_parallel_cpu());
        assert!(!record.is_serial());
        assert_eq!(record.worker_count(), Some(6));

        record.strategy_name = "ParallelGPU".to_string();
        record.parallelism = "GPU_Cores".to_string();
        assert!(record.is_device());
        assert!(!record.is_serial());
        assert_eq!(record.worker_count(), None);
    }

    #[test]
    fn test_error_field_omitted_when_absent() {
        let record = ResultRecord::new(
            "a.txt",
            4,
            &SerialScanner::new(),
            &Ok(3),
            Duration::ZERO,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("error"));
        assert!(!json.contains("sample_percent"));
        let back: ResultRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
