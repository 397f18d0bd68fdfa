use anyhow::Result;
use needlebench::{
    report, BenchConfig, BenchError, DeviceScanner, Harness, HarnessState, InputSource,
    ParallelScanner, ReportFormat, SearchStrategy, SerialScanner,
};
use std::fs::File;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn nz(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn cpu_config(rungs: &[usize]) -> BenchConfig {
    BenchConfig {
        thread_rungs: Some(rungs.iter().copied().map(nz).collect()),
        device: false,
        ..BenchConfig::default()
    }
}

fn write_source(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut file = File::create(&path)?;
    file.write_all(content)?;
    Ok(path)
}

/// Every strategy this machine can run, serial first
fn available_strategies() -> Result<Vec<Box<dyn SearchStrategy>>> {
    let mut strategies: Vec<Box<dyn SearchStrategy>> = vec![Box::new(SerialScanner::new())];
    for k in [1, 2, 3, 4, 8] {
        strategies.push(Box::new(ParallelScanner::new(nz(k))?));
    }
    if let Ok(device) = DeviceScanner::new() {
        strategies.push(Box::new(device));
    }
    Ok(strategies)
}

#[test]
fn test_all_strategies_agree() -> Result<()> {
    let haystack = "the ".repeat(42).into_bytes();
    let strategies = available_strategies()?;

    for strategy in &strategies {
        assert_eq!(strategy.search(&haystack, b"the")?, 42, "{}", strategy.name());
        assert_eq!(strategy.search(b"aaaa", b"aa")?, 3, "{}", strategy.name());
        assert_eq!(strategy.search(b"ab", b"abc")?, 0, "{}", strategy.name());
        assert_eq!(strategy.search(b"", b"the")?, 0, "{}", strategy.name());
    }
    Ok(())
}

#[test]
fn test_every_strategy_rejects_empty_pattern() -> Result<()> {
    for strategy in available_strategies()? {
        for haystack in [&b"abc"[..], &b""[..]] {
            assert!(
                matches!(strategy.search(haystack, b""), Err(BenchError::InvalidPattern(_))),
                "{} accepted an empty pattern",
                strategy.name()
            );
        }
    }
    Ok(())
}

#[test]
fn test_agreement_on_irregular_text() -> Result<()> {
    // Matches straddle every partition boundary the pool could choose
    let haystack: Vec<u8> = (0..250_007u32)
        .map(|i| if i % 7 == 0 || i % 11 == 0 { b'a' } else { b'b' })
        .collect();
    let expected = SerialScanner::count(&haystack, b"ab");
    assert!(expected > 0);

    for strategy in available_strategies()? {
        assert_eq!(strategy.search(&haystack, b"ab")?, expected, "{}", strategy.name());
    }
    Ok(())
}

#[test]
fn test_released_strategies_fail() -> Result<()> {
    let mut parallel = ParallelScanner::new(nz(2))?;
    parallel.release()?;
    assert!(matches!(parallel.search(b"aaaa", b"aa"), Err(BenchError::Released(_))));
    assert!(matches!(parallel.release(), Err(BenchError::Released(_))));

    if let Ok(mut device) = DeviceScanner::new() {
        device.release()?;
        assert!(device.is_released());
        assert!(matches!(device.search(b"aaaa", b"aa"), Err(BenchError::Released(_))));
    }
    Ok(())
}

#[test]
fn test_harness_end_to_end_over_files() -> Result<()> {
    let dir = tempdir()?;
    let text = "the cat and the hat and the bat ".repeat(200);
    let present = write_source(dir.path(), "Hats.txt", text.as_bytes())?;
    let missing = dir.path().join("Missing.txt");

    let mut harness = Harness::new(cpu_config(&[1, 2, 4]))?;
    let mut seen = 0;
    let records = harness
        .run_files(&[missing, present], |_| seen += 1)?
        .to_vec();

    assert_eq!(harness.state(), HarnessState::Done);
    assert_eq!(records.len(), 3 * 4);
    assert_eq!(seen, records.len());
    assert!(records.iter().all(|r| r.source_label == "Hats.txt" && r.is_ok()));

    let full: Vec<_> = records
        .iter()
        .filter(|r| r.sample_size_bytes == text.len() as u64)
        .collect();
    assert_eq!(full.len(), 4);
    assert!(full.iter().all(|r| r.occurrence_count == 600));

    let stats = harness.metrics().get_stats();
    assert_eq!(stats.sources_loaded, 1);
    assert_eq!(stats.sources_skipped, 1);
    assert_eq!(stats.releases, 4);
    Ok(())
}

#[test]
fn test_report_round_trip_through_file() -> Result<()> {
    let dir = tempdir()?;
    let sources = vec![
        InputSource::from_bytes("a, b.txt", "the ".repeat(42).into_bytes()),
        InputSource::from_bytes("c.txt", b"aaaa".to_vec()),
    ];

    let mut harness = Harness::new(cpu_config(&[1, 2]))?;
    let records = harness.run_sources(&sources)?.to_vec();

    let path = dir.path().join("results.csv");
    report::save_report(&records, ReportFormat::Csv, &path)?;
    let text = std::fs::read_to_string(&path)?;
    assert!(text.starts_with("source,sample_size_bytes,strategy,threads,occurrences,duration_ms\n"));
    assert!(text.contains("\"a, b.txt\",168,SerialCPU,1,42,"));

    // The CSV table has no percentage column
    let loaded = report::load_report(&path)?;
    let without_percent: Vec<_> = records
        .iter()
        .cloned()
        .map(|mut r| {
            r.sample_percent = None;
            r
        })
        .collect();
    assert_eq!(loaded, without_percent);

    let json_path = dir.path().join("results.json");
    report::save_report(&records, ReportFormat::Json, &json_path)?;
    let from_json = report::load_report(&json_path)?;
    assert_eq!(from_json, records);
    let percents: Vec<u32> = report::views::comparison_view(&from_json)
        .iter()
        .map(|r| r.percent)
        .collect();
    assert_eq!(percents, [10, 50, 100, 10, 50, 100]);

    let rows = report::views::comparison_view(&loaded);
    assert_eq!(rows.len(), 6);
    assert_eq!(rows[0].percent, 10);
    assert!(rows.iter().all(|r| r.serial.is_some() && r.best_parallel.is_some()));
    assert!(report::views::agreement_violations(&loaded).is_empty());
    Ok(())
}

#[test]
fn test_invalid_configuration_is_rejected_before_running() {
    let bad_fractions = BenchConfig {
        sample_fractions: vec![0.5, 0.1],
        ..cpu_config(&[1])
    };
    assert!(matches!(
        Harness::new(bad_fractions),
        Err(BenchError::ConfigError(_))
    ));

    let empty_pattern = BenchConfig {
        pattern: String::new(),
        ..cpu_config(&[1])
    };
    assert!(matches!(
        Harness::new(empty_pattern),
        Err(BenchError::InvalidPattern(_))
    ));
}
