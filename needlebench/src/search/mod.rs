//! Exact byte-substring counting strategies.
//!
//! Every strategy answers the same question: how many start offsets `i` in `[0, n - m]`
//! satisfy `haystack[i..i + m] == pattern`. Overlapping occurrences count separately,
//! so `"aa"` occurs three times in `"aaaa"`.
//!
//! # Strategies
//!
//! 1. **[`SerialScanner`]**: one thread, one window at a time. This is the ground truth
//!    every other strategy is checked against.
//! 2. **[`ParallelScanner`]**: a dedicated Rayon pool of `k` threads filters the candidate
//!    range as a parallel iterator and sums the partial counts:
//!    ```rust,ignore
//!    pool.install(|| (0..=n - m).into_par_iter().filter(|&i| is_match(i)).count())
//!    ```
//! 3. **[`DeviceScanner`]**: one OpenCL work item per candidate, each bumping a shared
//!    counter with `atomic_inc` on a hit.
//!
//! # Lifecycle
//!
//! Strategies that own a backend (the thread pool, the OpenCL context) keep it until
//! [`SearchStrategy::release`] is called. After that, `search` fails with
//! [`BenchError::Released`](crate::BenchError::Released) instead of returning a count.
//! The harness calls `release` exactly once per strategy, after the whole matrix ran.
pub mod device;
pub mod parallel;
pub mod serial;

#[cfg(feature = "opencl")]
mod opencl;

use std::fmt;

use crate::errors::{BenchError, BenchResult};

pub use device::DeviceScanner;
pub use parallel::ParallelScanner;
pub use serial::SerialScanner;

/// Degree of parallelism a strategy runs with, as written to the `threads` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parallelism {
    Serial,
    Threads(usize),
    Device,
}

impl Parallelism {
    /// Label used for device rows, where a thread count has no meaning
    pub const DEVICE_LABEL: &'static str = "GPU_Cores";

    /// Worker count for CPU strategies, `None` for the device
    pub fn worker_count(&self) -> Option<usize> {
        match self {
            Parallelism::Serial => Some(1),
            Parallelism::Threads(k) => Some(*k),
            Parallelism::Device => None,
        }
    }
}

impl fmt::Display for Parallelism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parallelism::Serial => write!(f, "1"),
            Parallelism::Threads(k) => write!(f, "{}", k),
            Parallelism::Device => write!(f, "{}", Self::DEVICE_LABEL),
        }
    }
}

/// Common contract of every search backend.
///
/// Calls on one instance are never concurrent; the harness drives the matrix on a
/// single thread. Implementations must not mutate either input.
pub trait SearchStrategy {
    /// Counts occurrences of `pattern` in `haystack`, overlaps included
    fn search(&self, haystack: &[u8], pattern: &[u8]) -> BenchResult<u64>;

    /// Stable display name, e.g. `ParallelCPU-4Threads`
    fn name(&self) -> &str;

    fn parallelism(&self) -> Parallelism;

    /// Frees backend resources. Called once by the harness during draining.
    fn release(&mut self) -> BenchResult<()>;
}

/// Returns true when `pattern` starts at `start` in `haystack`.
///
/// Stops at the first mismatching byte. The caller guarantees
/// `start + pattern.len() <= haystack.len()`.
#[inline]
pub(crate) fn matches_at(haystack: &[u8], pattern: &[u8], start: usize) -> bool {
    let window = &haystack[start..start + pattern.len()];
    window.iter().zip(pattern).all(|(h, p)| h == p)
}

/// Rejects the empty pattern, which would otherwise match at all `n + 1` offsets.
///
/// Every [`SearchStrategy::search`] calls this before touching its backend, so all
/// strategies fail the same way.
pub(crate) fn check_pattern(pattern: &[u8]) -> BenchResult<()> {
    if pattern.is_empty() {
        return Err(BenchError::invalid_pattern("pattern must not be empty"));
    }
    Ok(())
}

/// Number of candidate start offsets, `n - m + 1`, or 0 when the pattern is
/// empty or longer than the haystack
#[inline]
pub(crate) fn candidate_count(haystack_len: usize, pattern_len: usize) -> usize {
    if pattern_len == 0 || pattern_len > haystack_len {
        0
    } else {
        haystack_len - pattern_len + 1
    }
}

/// Extracts the worker count embedded in a strategy name such as `ParallelCPU-6Threads`
pub fn parse_worker_count(name: &str) -> Option<usize> {
    let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_labels() {
        assert_eq!(Parallelism::Serial.to_string(), "1");
        assert_eq!(Parallelism::Threads(12).to_string(), "12");
        assert_eq!(Parallelism::Device.to_string(), "GPU_Cores");
        assert_eq!(Parallelism::Device.worker_count(), None);
        assert_eq!(Parallelism::Threads(3).worker_count(), Some(3));
    }

    #[test]
    fn test_matches_at_stops_on_mismatch() {
        let haystack = b"the other them";
        assert!(matches_at(haystack, b"the", 0));
        assert!(!matches_at(haystack, b"the", 1));
        assert!(matches_at(haystack, b"the", 6));
        assert!(matches_at(haystack, b"the", 10));
    }

    #[test]
    fn test_candidate_count() {
        assert_eq!(candidate_count(4, 2), 3);
        assert_eq!(candidate_count(3, 3), 1);
        assert_eq!(candidate_count(2, 3), 0);
        assert_eq!(candidate_count(0, 1), 0);
        assert_eq!(candidate_count(3, 0), 0);
    }

    #[test]
    fn test_check_pattern() {
        assert!(check_pattern(b"the").is_ok());
        assert!(matches!(
            check_pattern(b""),
            Err(BenchError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_parse_worker_count() {
        assert_eq!(parse_worker_count("ParallelCPU-16Threads"), Some(16));
        assert_eq!(parse_worker_count("ParallelCPU-1Threads"), Some(1));
        assert_eq!(parse_worker_count("SerialCPU"), None);
    }
}
