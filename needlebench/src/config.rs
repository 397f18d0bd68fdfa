use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::errors::{BenchError, BenchResult};
use crate::report::ReportFormat;

/// Configuration for a benchmark run.
///
/// # Configuration Locations
///
/// Loaded from, in order of precedence:
/// 1. Custom config file specified via `--config` flag
/// 2. Local `.needlebench.yaml` in the current directory
/// 3. Global `$HOME/.config/needlebench/config.yaml`
///
/// # Configuration Format
///
/// ```yaml
/// # Byte pattern to count (taken as the raw bytes of the string)
/// pattern: "the"
///
/// # Input files, each read once in full
/// sources:
///   - "res/DonQuixote.txt"
///   - "res/Dracula.txt"
///
/// # Prefix fractions of every source to measure, strictly ascending
/// sample_fractions: [0.10, 0.50, 1.00]
///
/// # Worker counts for the parallel scanner; derived from the core count when absent
/// thread_rungs: [1, 2, 4, 8]
///
/// # Run the OpenCL scanner when a GPU is available
/// device: true
///
/// # Pause before each timed call, in milliseconds
/// settle_ms: 0
///
/// # Report file and format (csv, json, yaml)
/// output: "res/results.csv"
/// format: csv
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "info"
/// ```
///
/// Command-line arguments take precedence over file values, see [`BenchConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// The pattern to count
    pub pattern: String,

    /// Input files to benchmark
    pub sources: Vec<PathBuf>,

    /// Sample sizes as fractions of each source, e.g. `0.1` for the first 10%
    pub sample_fractions: Vec<f64>,

    /// Explicit worker-count rungs. When `None`, rungs are derived from
    /// `hardware_threads` with [`crate::harness::worker_rungs`].
    pub thread_rungs: Option<Vec<NonZeroUsize>>,

    /// Overrides the detected number of hardware threads
    pub hardware_threads: Option<NonZeroUsize>,

    /// Whether to attempt the GPU strategy at all
    pub device: bool,

    /// Quiescence pause before each timed search call
    pub settle_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Where to save the result table; nothing is written when `None`
    pub output: Option<PathBuf>,

    pub format: ReportFormat,
}

pub const DEFAULT_PATTERN: &str = "the";
pub const DEFAULT_SAMPLE_FRACTIONS: [f64; 3] = [0.10, 0.50, 1.00];

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            sources: Vec::new(),
            sample_fractions: DEFAULT_SAMPLE_FRACTIONS.to_vec(),
            thread_rungs: None,
            hardware_threads: None,
            device: true,
            settle_ms: 0,
            log_level: default_log_level(),
            output: None,
            format: ReportFormat::Csv,
        }
    }
}

impl BenchConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from a specific file on top of the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("needlebench/config.yaml")),
            Some(PathBuf::from(".needlebench.yaml")),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        // An explicitly requested file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder.build()?.try_deserialize()
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(pattern) = cli.pattern {
            self.pattern = pattern;
        }
        if !cli.sources.is_empty() {
            self.sources = cli.sources;
        }
        if let Some(fractions) = cli.sample_fractions {
            self.sample_fractions = fractions;
        }
        if cli.thread_rungs.is_some() {
            self.thread_rungs = cli.thread_rungs;
        }
        if cli.hardware_threads.is_some() {
            self.hardware_threads = cli.hardware_threads;
        }
        if cli.no_device {
            self.device = false;
        }
        if let Some(settle_ms) = cli.settle_ms {
            self.settle_ms = settle_ms;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        if cli.output.is_some() {
            self.output = cli.output;
        }
        if let Some(format) = cli.format {
            self.format = format;
        }
        self
    }

    /// Pattern bytes as searched
    pub fn pattern_bytes(&self) -> &[u8] {
        self.pattern.as_bytes()
    }

    /// Detected or overridden hardware parallelism
    pub fn hardware_threads(&self) -> usize {
        self.hardware_threads
            .map(NonZeroUsize::get)
            .unwrap_or_else(num_cpus::get)
    }

    /// Rejects configurations that would produce meaningless measurements
    pub fn validate(&self) -> BenchResult<()> {
        if self.pattern.is_empty() {
            return Err(BenchError::invalid_pattern("pattern must not be empty"));
        }

        if self.sample_fractions.is_empty() {
            return Err(BenchError::config_error(
                "sample_fractions must not be empty",
            ));
        }
        for &fraction in &self.sample_fractions {
            if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
                return Err(BenchError::config_error(format!(
                    "sample fraction {} is outside (0, 1]",
                    fraction
                )));
            }
        }
        if self.sample_fractions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(BenchError::config_error(
                "sample_fractions must be strictly ascending",
            ));
        }

        if let Some(rungs) = &self.thread_rungs {
            if rungs.is_empty() {
                return Err(BenchError::config_error("thread_rungs must not be empty"));
            }
        }

        Ok(())
    }
}

/// Values given on the command line; `None` means "keep the file value"
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub pattern: Option<String>,
    pub sources: Vec<PathBuf>,
    pub sample_fractions: Option<Vec<f64>>,
    pub thread_rungs: Option<Vec<NonZeroUsize>>,
    pub hardware_threads: Option<NonZeroUsize>,
    pub no_device: bool,
    pub settle_ms: Option<u64>,
    pub log_level: Option<String>,
    pub output: Option<PathBuf>,
    pub format: Option<ReportFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let config_content = r#"
            pattern: "whale"
            sources: ["res/MobyDick.txt"]
            sample_fractions: [0.25, 1.0]
            thread_rungs: [1, 3]
            device: false
            settle_ms: 5
            log_level: "debug"
            format: json
        "#;

        let mut file = File::create(&config_path).unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = BenchConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.pattern, "whale");
        assert_eq!(config.sources, vec![PathBuf::from("res/MobyDick.txt")]);
        assert_eq!(config.sample_fractions, vec![0.25, 1.0]);
        assert_eq!(config.thread_rungs, Some(vec![nz(1), nz(3)]));
        assert!(!config.device);
        assert_eq!(config.settle_ms, 5);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.format, ReportFormat::Json);
        assert_eq!(config.output, None);
    }

    #[test]
    fn test_default_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "sources: [\"a.txt\"]\n").unwrap();

        let config = BenchConfig::load_from(Some(&config_path)).unwrap();
        assert_eq!(config.pattern, "the");
        assert_eq!(config.sample_fractions, vec![0.10, 0.50, 1.00]);
        assert_eq!(config.thread_rungs, None);
        assert!(config.device);
        assert_eq!(config.settle_ms, 0);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.format, ReportFormat::Csv);
        assert_eq!(config.hardware_threads(), num_cpus::get());
    }

    #[test]
    fn test_merge_with_cli() {
        let file_config = BenchConfig {
            pattern: "the".to_string(),
            sources: vec![PathBuf::from("a.txt")],
            thread_rungs: Some(vec![nz(1), nz(2)]),
            output: Some(PathBuf::from("file.csv")),
            ..BenchConfig::default()
        };

        let cli = CliOverrides {
            pattern: Some("and".to_string()),
            sources: vec![],
            sample_fractions: Some(vec![0.5, 1.0]),
            hardware_threads: Some(nz(6)),
            no_device: true,
            format: Some(ReportFormat::Yaml),
            ..CliOverrides::default()
        };

        let merged = file_config.merge_with_cli(cli);
        assert_eq!(merged.pattern, "and"); // CLI value
        assert_eq!(merged.sources, vec![PathBuf::from("a.txt")]); // File value (CLI empty)
        assert_eq!(merged.sample_fractions, vec![0.5, 1.0]); // CLI value
        assert_eq!(merged.thread_rungs, Some(vec![nz(1), nz(2)])); // File value
        assert_eq!(merged.hardware_threads(), 6); // CLI value
        assert!(!merged.device); // CLI value
        assert_eq!(merged.output, Some(PathBuf::from("file.csv"))); // File value
        assert_eq!(merged.format, ReportFormat::Yaml); // CLI value
    }

    #[test]
    fn test_validate_rejects_empty_pattern() {
        let config = BenchConfig {
            pattern: String::new(),
            ..BenchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_validate_fractions() {
        let bad = [
            vec![],
            vec![0.0, 1.0],
            vec![0.5, 1.5],
            vec![0.5, 0.1],
            vec![0.5, 0.5],
            vec![f64::NAN],
        ];
        for fractions in bad {
            let config = BenchConfig {
                sample_fractions: fractions.clone(),
                ..BenchConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(BenchError::ConfigError(_))),
                "fractions {:?} should be rejected",
                fractions
            );
        }

        assert!(BenchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_rungs() {
        let config = BenchConfig {
            thread_rungs: Some(vec![]),
            ..BenchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(BenchError::ConfigError(_))
        ));
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "sample_fractions: \"lots\"\nthread_rungs: [0]\n",
        )
        .unwrap();

        let result = BenchConfig::load_from(Some(&config_path));
        assert!(result.is_err(), "Expected error loading invalid config");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = BenchConfig::load_from(Some(Path::new("nonexistent.yaml")));
        assert!(result.is_err());
    }
}
