//! Persistence of result records.
//!
//! The CSV layout is the table consumers expect:
//!
//! ```text
//! source,sample_size_bytes,strategy,threads,occurrences,duration_ms
//! Dracula.txt,16530,SerialCPU,1,171,0
//! Dracula.txt,16530,ParallelCPU-4Threads,4,171,1
//! Dracula.txt,16530,ParallelGPU,GPU_Cores,171,12
//! ```
//!
//! An `error` column is appended only when at least one record carries an error,
//! so error-free tables keep exactly six columns.
pub mod views;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::errors::{BenchError, BenchResult};
use crate::results::ResultRecord;

const CSV_HEADER: &str = "source,sample_size_bytes,strategy,threads,occurrences,duration_ms";

/// On-disk format of a saved report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Csv,
    Json,
    Yaml,
}

impl ReportFormat {
    /// Guesses the format from a file extension, defaulting to CSV
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for ReportFormat {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            "yaml" | "yml" => Ok(ReportFormat::Yaml),
            other => Err(BenchError::config_error(format!(
                "unknown report format '{}' (expected csv, json or yaml)",
                other
            ))),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
            ReportFormat::Yaml => "yaml",
        };
        f.write_str(name)
    }
}

/// Writes `records` to `writer` in `format`
pub fn write_report<W: Write>(
    records: &[ResultRecord],
    format: ReportFormat,
    mut writer: W,
) -> BenchResult<()> {
    match format {
        ReportFormat::Csv => write_csv(records, &mut writer)?,
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, records)?;
            writeln!(writer)?;
        }
        ReportFormat::Yaml => serde_yaml::to_writer(&mut writer, records)?,
    }
    writer.flush()?;
    Ok(())
}

/// Creates (or truncates) `path` and writes the report to it
pub fn save_report(records: &[ResultRecord], format: ReportFormat, path: &Path) -> BenchResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    write_report(records, format, BufWriter::new(file))?;
    info!("Results saved to {} ({} records)", path.display(), records.len());
    Ok(())
}

/// Reads a saved report, inferring the format from the extension
pub fn load_report(path: &Path) -> BenchResult<Vec<ResultRecord>> {
    let file = File::open(path).map_err(|e| BenchError::from_io(path, e))?;
    let reader = BufReader::new(file);
    match ReportFormat::from_path(path) {
        ReportFormat::Csv => read_csv_report(reader),
        ReportFormat::Json => Ok(serde_json::from_reader(reader)?),
        ReportFormat::Yaml => Ok(serde_yaml::from_reader(reader)?),
    }
}

fn write_csv<W: Write>(records: &[ResultRecord], writer: &mut W) -> BenchResult<()> {
    let with_errors = records.iter().any(|r| r.error.is_some());

    write!(writer, "{}", CSV_HEADER)?;
    if with_errors {
        write!(writer, ",error")?;
    }
    writeln!(writer)?;

    for r in records {
        write!(
            writer,
            "{},{},{},{},{},{}",
            csv_field(&r.source_label),
            r.sample_size_bytes,
            csv_field(&r.strategy_name),
            csv_field(&r.parallelism),
            r.occurrence_count,
            r.duration_ms
        )?;
        if with_errors {
            write!(writer, ",{}", csv_field(r.error.as_deref().unwrap_or("")))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Splits one CSV line, honouring double-quoted fields
fn split_csv_line(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if field.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            (c, _) => field.push(c),
        }
    }
    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}

/// Parses a CSV report written by [`write_report`]
pub fn read_csv_report<R: Read>(reader: R) -> BenchResult<Vec<ResultRecord>> {
    let mut lines = BufReader::new(reader).lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Ok(Vec::new()),
    };
    let columns = split_csv_line(header.trim_end()).map_err(|e| BenchError::malformed_report(1, e))?;
    let expected = match columns.len() {
        6 => 6,
        7 if columns[6] == "error" => 7,
        n => {
            return Err(BenchError::malformed_report(
                1,
                format!("expected 6 or 7 columns, found {}", n),
            ))
        }
    };

    let mut records = Vec::new();
    for (index, line) in lines.enumerate() {
        let line_no = index + 2;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_csv_line(line.trim_end_matches(['\r', '\n']))
            .map_err(|e| BenchError::malformed_report(line_no, e))?;
        if fields.len() != expected {
            return Err(BenchError::malformed_report(
                line_no,
                format!("expected {} fields, found {}", expected, fields.len()),
            ));
        }

        let number = |i: usize, name: &str| -> BenchResult<u64> {
            fields[i].trim().parse().map_err(|_| {
                BenchError::malformed_report(line_no, format!("{} '{}' is not a number", name, fields[i]))
            })
        };

        records.push(ResultRecord {
            source_label: fields[0].clone(),
            sample_size_bytes: number(1, "sample_size_bytes")?,
            strategy_name: fields[2].clone(),
            parallelism: fields[3].clone(),
            occurrence_count: number(4, "occurrences")?,
            duration_ms: number(5, "duration_ms")?,
            sample_percent: None,
            error: fields.get(6).filter(|e| !e.is_empty()).cloned(),
        });
    }
    Ok(records)
}
