use std::fmt;
use tracing::{debug, info};

use super::{check_pattern, Parallelism, SearchStrategy};
use crate::errors::{BenchError, BenchResult};

#[cfg(feature = "opencl")]
use super::opencl::OpenClBackend as Backend;
#[cfg(not(feature = "opencl"))]
use unsupported::Backend;

/// Offloads the scan to the first GPU found through OpenCL.
///
/// Construction fails with [`BenchError::DeviceUnavailable`] when there is no OpenCL
/// runtime, no GPU, the kernel does not build, or the crate was compiled without the
/// `opencl` feature. Callers are expected to carry on without this strategy.
pub struct DeviceScanner {
    backend: Option<Backend>,
    device_name: String,
}

impl DeviceScanner {
    pub const NAME: &'static str = "ParallelGPU";

    pub fn new() -> BenchResult<Self> {
        let backend = Backend::open()?;
        let device_name = backend.device_name().to_string();
        info!("Using OpenCL device: {}", device_name);
        Ok(Self {
            backend: Some(backend),
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_released(&self) -> bool {
        self.backend.is_none()
    }
}

impl fmt::Debug for DeviceScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceScanner")
            .field("device_name", &self.device_name)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

impl SearchStrategy for DeviceScanner {
    fn search(&self, haystack: &[u8], pattern: &[u8]) -> BenchResult<u64> {
        check_pattern(pattern)?;
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| BenchError::released(Self::NAME))?;

        // An empty buffer cannot be allocated on the device, and there is
        // nothing to launch for it anyway
        if haystack.is_empty() {
            return Ok(0);
        }

        backend.count(haystack, pattern)
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn parallelism(&self) -> Parallelism {
        Parallelism::Device
    }

    fn release(&mut self) -> BenchResult<()> {
        let backend = self
            .backend
            .take()
            .ok_or_else(|| BenchError::released(Self::NAME))?;
        backend.close()?;
        debug!("Released OpenCL resources for {}", self.device_name);
        Ok(())
    }
}

#[cfg(not(feature = "opencl"))]
mod unsupported {
    use std::convert::Infallible;

    use crate::errors::{BenchError, BenchResult};

    /// Stand-in backend for builds without the `opencl` feature; it can never be opened.
    pub(super) struct Backend {
        never: Infallible,
    }

    impl Backend {
        pub(super) fn open() -> BenchResult<Self> {
            Err(BenchError::device_unavailable(
                "built without the `opencl` feature",
            ))
        }

        pub(super) fn device_name(&self) -> &str {
            match self.never {}
        }

        pub(super) fn count(&self, _haystack: &[u8], _pattern: &[u8]) -> BenchResult<u64> {
            match self.never {}
        }

        pub(super) fn close(self) -> BenchResult<()> {
            match self.never {}
        }
    }
}
