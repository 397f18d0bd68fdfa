pub mod config;
pub mod errors;
pub mod harness;
pub mod metrics;
pub mod report;
pub mod results;
pub mod search;
pub mod source;

pub use config::{BenchConfig, CliOverrides};
pub use errors::{BenchError, BenchResult};
pub use harness::{build_strategies, worker_rungs, Harness, HarnessState};
pub use metrics::{RunMetrics, RunStats};
pub use report::{load_report, read_csv_report, save_report, write_report, ReportFormat};
pub use results::ResultRecord;
pub use search::{DeviceScanner, Parallelism, ParallelScanner, SearchStrategy, SerialScanner};
pub use source::{InputSource, Sample};
