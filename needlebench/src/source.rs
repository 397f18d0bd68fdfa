//! Input sources and the sample prefixes taken from them.
//!
//! A source is read exactly once. Samples are borrowed prefixes of that one
//! buffer, so the 10% sample is by construction a byte-exact prefix of the 50%
//! sample, which is a prefix of the full source.
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Deref;
use std::path::Path;
use tracing::{debug, trace};

use crate::errors::{BenchError, BenchResult};

const BUFFER_CAPACITY: usize = 65536;
/// Files at or above this size are memory-mapped instead of copied
pub(crate) const MMAP_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB

/// Backing storage of a loaded source
pub enum SourceBytes {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl Deref for SourceBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SourceBytes::Owned(bytes) => bytes.as_slice(),
            SourceBytes::Mapped(mmap) => &mmap[..],
        }
    }
}

impl std::fmt::Debug for SourceBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            SourceBytes::Owned(_) => "Owned",
            SourceBytes::Mapped(_) => "Mapped",
        };
        write!(f, "{}({} bytes)", kind, self.len())
    }
}

/// A named, immutable byte buffer
#[derive(Debug)]
pub struct InputSource {
    label: String,
    bytes: SourceBytes,
}

impl InputSource {
    /// Wraps an in-memory buffer
    pub fn from_bytes(label: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            bytes: SourceBytes::Owned(bytes.into()),
        }
    }

    /// Reads a file in full; the label is its file name
    pub fn load(path: &Path) -> BenchResult<Self> {
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let file = File::open(path).map_err(|e| BenchError::from_io(path, e))?;
        let size = file
            .metadata()
            .map_err(|e| BenchError::from_io(path, e))?
            .len();

        let bytes = if size >= MMAP_THRESHOLD {
            trace!("Memory-mapping {} ({} bytes)", path.display(), size);
            // The mapping is read-only and the benchmark never writes to its inputs
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| BenchError::from_io(path, e))?;
            SourceBytes::Mapped(mmap)
        } else {
            let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
            let mut buf = Vec::with_capacity(size as usize);
            reader
                .read_to_end(&mut buf)
                .map_err(|e| BenchError::from_io(path, e))?;
            SourceBytes::Owned(buf)
        };

        debug!("Loaded {} ({} bytes, {:?})", label, bytes.len(), bytes);
        Ok(Self { label, bytes })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Nested prefixes for each fraction, in the order given
    pub fn samples<'a>(&'a self, fractions: &'a [f64]) -> impl Iterator<Item = Sample<'a>> + 'a {
        fractions.iter().map(move |&fraction| Sample {
            fraction,
            bytes: &self.bytes()[..sample_len(self.len(), fraction)],
        })
    }
}

/// A prefix of a source buffer
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub fraction: f64,
    pub bytes: &'a [u8],
}

impl Sample<'_> {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whole-number percentage, e.g. 10 for 0.10
    pub fn percent(&self) -> u32 {
        (self.fraction * 100.0).round() as u32
    }
}

/// `floor(full_len * fraction)`, clamped to `full_len`
pub fn sample_len(full_len: usize, fraction: f64) -> usize {
    let len = (full_len as f64 * fraction).floor();
    if len <= 0.0 {
        0
    } else {
        (len as usize).min(full_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_sample_len() {
        assert_eq!(sample_len(1000, 0.10), 100);
        assert_eq!(sample_len(1000, 0.50), 500);
        assert_eq!(sample_len(1000, 1.00), 1000);
        assert_eq!(sample_len(388_208, 0.10), 38_820);
        assert_eq!(sample_len(7, 0.5), 3);
        assert_eq!(sample_len(0, 0.5), 0);
    }

    #[test]
    fn test_samples_are_nested_prefixes() {
        let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let source = InputSource::from_bytes("numbers.bin", content.clone());
        let fractions = [0.10, 0.50, 1.00];
        let samples: Vec<_> = source.samples(&fractions).collect();

        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].len(), 100);
        assert_eq!(samples[1].len(), 500);
        assert_eq!(samples[2].len(), 1000);
        assert_eq!(samples[0].percent(), 10);
        for pair in samples.windows(2) {
            assert!(pair[1].bytes.starts_with(pair[0].bytes));
        }
        assert_eq!(samples[2].bytes, &content[..]);
    }

    #[test]
    fn test_load_small_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("Dracula.txt");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"the count of the castle").unwrap();

        let source = InputSource::load(&path).unwrap();
        assert_eq!(source.label(), "Dracula.txt");
        assert_eq!(source.bytes(), b"the count of the castle");
        assert!(matches!(source.bytes, SourceBytes::Owned(_)));
    }

    #[test]
    fn test_load_large_file_is_mapped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.txt");
        let chunk = vec![b'x'; 1024 * 1024];
        let mut file = File::create(&path).unwrap();
        for _ in 0..(MMAP_THRESHOLD / chunk.len() as u64) {
            file.write_all(&chunk).unwrap();
        }
        drop(file);

        let source = InputSource::load(&path).unwrap();
        assert!(matches!(source.bytes, SourceBytes::Mapped(_)));
        assert_eq!(source.len() as u64, MMAP_THRESHOLD);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = InputSource::load(&dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, BenchError::SourceNotFound(_)));
        assert!(err.is_source_unavailable());
    }
}
