use super::{candidate_count, check_pattern, matches_at, Parallelism, SearchStrategy};
use crate::errors::BenchResult;

/// Single-threaded reference scanner
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialScanner;

impl SerialScanner {
    pub const NAME: &'static str = "SerialCPU";

    pub fn new() -> Self {
        Self
    }

    /// Counts occurrences without going through the strategy contract; an empty
    /// pattern counts 0
    pub fn count(haystack: &[u8], pattern: &[u8]) -> u64 {
        let mut count = 0;
        for start in 0..candidate_count(haystack.len(), pattern.len()) {
            if matches_at(haystack, pattern, start) {
                count += 1;
            }
        }
        count
    }
}

impl SearchStrategy for SerialScanner {
    fn search(&self, haystack: &[u8], pattern: &[u8]) -> BenchResult<u64> {
        check_pattern(pattern)?;
        Ok(Self::count(haystack, pattern))
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn parallelism(&self) -> Parallelism {
        Parallelism::Serial
    }

    fn release(&mut self) -> BenchResult<()> {
        Ok(())
    }
}
