//! Derived summaries over a finished record list.
//!
//! Records are grouped into cells, one per sample of a source, in the order the
//! harness produced them. Within a cell rows are selected by strategy name, never
//! by position, so the views work for any number of worker rungs or sources.
use crate::results::ResultRecord;

/// Serial vs. fastest parallel vs. device, for one source at one sample rank
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow<'a> {
    /// 0 for the first sample of a source, 1 for the next, ...
    pub sample_rank: usize,
    pub source_label: &'a str,
    pub sample_size_bytes: u64,
    /// Sample size as a rounded percentage of the full source
    pub percent: u32,
    pub serial: Option<&'a ResultRecord>,
    pub best_parallel: Option<&'a ResultRecord>,
    pub device: Option<&'a ResultRecord>,
}

/// Parallel timings by worker count for the largest source at one sample rank
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingSeries<'a> {
    pub sample_rank: usize,
    pub source_label: &'a str,
    pub sample_size_bytes: u64,
    /// `(workers, duration_ms)`, ascending by workers
    pub points: Vec<(usize, u64)>,
}

/// One (source, sample) cell whose successful strategies disagree on the count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disagreement<'a> {
    pub source_label: &'a str,
    pub sample_size_bytes: u64,
    /// `(strategy_name, occurrence_count)` of every successful record in the cell
    pub counts: Vec<(&'a str, u64)>,
}

/// The records of one sample of one source
struct Cell<'a> {
    source_label: &'a str,
    sample_size_bytes: u64,
    records: Vec<&'a ResultRecord>,
}

impl<'a> Cell<'a> {
    fn percent(&self, largest_size: u64) -> u32 {
        self.records
            .iter()
            .find_map(|r| r.sample_percent)
            .unwrap_or_else(|| percent_of(self.sample_size_bytes, largest_size))
    }
}

/// Splits records into per-source cells in enumeration order.
///
/// A new cell starts when the sample size changes or when a strategy shows up a
/// second time, so two fractions that round to the same length stay separate.
/// Returns the cells of each source, sources in first-appearance order.
fn cells_by_source(records: &[ResultRecord]) -> Vec<Vec<Cell<'_>>> {
    let mut sources: Vec<Vec<Cell<'_>>> = Vec::new();
    for r in records {
        let index = match sources
            .iter()
            .position(|cells| cells.first().is_some_and(|c| c.source_label == r.source_label))
        {
            Some(index) => index,
            None => {
                sources.push(Vec::new());
                sources.len() - 1
            }
        };
        let cells = &mut sources[index];

        let same_cell = cells.last().is_some_and(|cell| {
            cell.sample_size_bytes == r.sample_size_bytes
                && cell.records.iter().all(|x| x.strategy_name != r.strategy_name)
        });
        match cells.last_mut() {
            Some(cell) if same_cell => cell.records.push(r),
            _ => cells.push(Cell {
                source_label: &r.source_label,
                sample_size_bytes: r.sample_size_bytes,
                records: vec![r],
            }),
        }
    }
    sources
}

fn percent_of(size: u64, largest: u64) -> u32 {
    if largest == 0 {
        100
    } else {
        ((size as f64 / largest as f64) * 100.0).round() as u32
    }
}

fn largest_size(cells: &[Cell<'_>]) -> u64 {
    cells.iter().map(|c| c.sample_size_bytes).max().unwrap_or(0)
}

/// Builds the serial/parallel/device comparison, grouped by sample rank first
/// and by source (in run order) second.
///
/// The parallel column holds the fastest successful parallel record of the cell.
/// The percentage comes from the records; rows read back from CSV fall back to
/// the size relative to the source's largest sample.
pub fn comparison_view(records: &[ResultRecord]) -> Vec<ComparisonRow<'_>> {
    let sources = cells_by_source(records);
    let ranks = sources.iter().map(Vec::len).max().unwrap_or(0);

    let mut rows = Vec::new();
    for rank in 0..ranks {
        for cells in &sources {
            let Some(cell) = cells.get(rank) else {
                continue;
            };
            let rows_of = || cell.records.iter().copied();

            rows.push(ComparisonRow {
                sample_rank: rank,
                source_label: cell.source_label,
                sample_size_bytes: cell.sample_size_bytes,
                percent: cell.percent(largest_size(cells)),
                serial: rows_of().find(|r| r.is_serial()),
                best_parallel: rows_of()
                    .filter(|r| r.is_parallel_cpu() && r.is_ok())
                    .min_by_key(|r| r.duration_ms),
                device: rows_of().find(|r| r.is_device()),
            });
        }
    }
    rows
}

/// Builds one scaling series per sample rank, using the source whose sample at
/// that rank is largest.
pub fn scaling_view(records: &[ResultRecord]) -> Vec<ScalingSeries<'_>> {
    let sources = cells_by_source(records);
    let ranks = sources.iter().map(Vec::len).max().unwrap_or(0);

    let mut series = Vec::new();
    for rank in 0..ranks {
        // Strict comparison keeps the earliest source on ties
        let mut largest: Option<&Cell<'_>> = None;
        for cell in sources.iter().filter_map(|cells| cells.get(rank)) {
            if largest.map_or(true, |best| cell.sample_size_bytes > best.sample_size_bytes) {
                largest = Some(cell);
            }
        }
        let Some(cell) = largest else {
            continue;
        };

        let mut points: Vec<(usize, u64)> = cell
            .records
            .iter()
            .filter(|r| r.is_parallel_cpu() && r.is_ok())
            .filter_map(|r| r.worker_count().map(|w| (w, r.duration_ms)))
            .collect();
        points.sort_by_key(|&(workers, _)| workers);

        series.push(ScalingSeries {
            sample_rank: rank,
            source_label: cell.source_label,
            sample_size_bytes: cell.sample_size_bytes,
            points,
        });
    }
    series
}

/// Cells where the successful strategies reported different counts
pub fn agreement_violations(records: &[ResultRecord]) -> Vec<Disagreement<'_>> {
    let mut violations = Vec::new();
    for cell in cells_by_source(records).iter().flatten() {
        let counts: Vec<(&str, u64)> = cell
            .records
            .iter()
            .copied()
            .filter(|r| r.is_ok())
            .map(|r| (r.strategy_name.as_str(), r.occurrence_count))
            .collect();
        let disagree = counts
            .first()
            .is_some_and(|&(_, first)| counts.iter().any(|&(_, c)| c != first));
        if disagree {
            violations.push(Disagreement {
                source_label: cell.source_label,
                sample_size_bytes: cell.sample_size_bytes,
                counts,
            });
        }
    }
    violations
}
