//! OpenCL backend for [`DeviceScanner`](super::DeviceScanner).
//!
//! Only compiled with the `opencl` feature:
//! ```bash
//! cargo build --features opencl
//! ```
//!
//! The context, queue, program and kernel live as long as the backend. Device
//! buffers do not: every call allocates its own haystack, pattern and counter
//! buffers and drops them before returning, on the error paths too.
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{Device, CL_DEVICE_TYPE_GPU};
use opencl3::error_codes::ClError;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE};
use opencl3::platform::get_platforms;
use opencl3::program::Program;
use opencl3::types::{cl_uint, cl_ulong, CL_BLOCKING};
use std::ptr;
use tracing::trace;

use crate::errors::{BenchError, BenchResult};

const COUNT_MATCHES_SOURCE: &str = include_str!("../../kernels/count_matches.cl");
const KERNEL_NAME: &str = "count_matches";

fn unavailable(step: &'static str) -> impl Fn(ClError) -> BenchError {
    move |e| BenchError::device_unavailable(format!("{}: {}", step, e))
}

fn failed(step: &'static str) -> impl Fn(ClError) -> BenchError {
    move |e| BenchError::device(format!("{}: {}", step, e))
}

/// Fields drop in declaration order: kernel, program, queue, then context.
pub(super) struct OpenClBackend {
    kernel: Kernel,
    _program: Program,
    queue: CommandQueue,
    context: Context,
    device_name: String,
}

impl OpenClBackend {
    /// Picks the first GPU of the first platform and compiles the match kernel
    pub(super) fn open() -> BenchResult<Self> {
        let platform = get_platforms()
            .map_err(unavailable("querying OpenCL platforms"))?
            .into_iter()
            .next()
            .ok_or_else(|| BenchError::device_unavailable("no OpenCL platform found"))?;

        let device_id = platform
            .get_devices(CL_DEVICE_TYPE_GPU)
            .map_err(unavailable("querying GPU devices"))?
            .into_iter()
            .next()
            .ok_or_else(|| BenchError::device_unavailable("platform has no GPU device"))?;

        let device = Device::new(device_id);
        let device_name = device.name().unwrap_or_default().trim().to_string();

        let context = Context::from_device(&device).map_err(unavailable("creating context"))?;

        // OpenCL 1.2 entry point; macOS does not ship the 2.0 one
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, 0)
            .map_err(unavailable("creating command queue"))?;

        let program = Program::create_and_build_from_source(&context, COUNT_MATCHES_SOURCE, "")
            .map_err(|log| BenchError::device_unavailable(format!("building kernel: {}", log)))?;

        let kernel = Kernel::create(&program, KERNEL_NAME).map_err(unavailable("creating kernel"))?;

        Ok(Self {
            kernel,
            _program: program,
            queue,
            context,
            device_name,
        })
    }

    pub(super) fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Counts matches with one work item per haystack byte.
    ///
    /// `haystack` and `pattern` must both be non-empty; zero-sized buffers are
    /// invalid in OpenCL.
    pub(super) fn count(&self, haystack: &[u8], pattern: &[u8]) -> BenchResult<u64> {
        let text_len = haystack.len();
        let pattern_len = pattern.len();

        let mut text_buf = unsafe {
            Buffer::<u8>::create(&self.context, CL_MEM_READ_ONLY, text_len, ptr::null_mut())
                .map_err(failed("allocating haystack buffer"))?
        };
        let mut pattern_buf = unsafe {
            Buffer::<u8>::create(&self.context, CL_MEM_READ_ONLY, pattern_len, ptr::null_mut())
                .map_err(failed("allocating pattern buffer"))?
        };
        let mut result_buf = unsafe {
            Buffer::<cl_uint>::create(&self.context, CL_MEM_READ_WRITE, 1, ptr::null_mut())
                .map_err(failed("allocating counter buffer"))?
        };

        let zero: [cl_uint; 1] = [0];
        unsafe {
            self.queue
                .enqueue_write_buffer(&mut text_buf, CL_BLOCKING, 0, haystack, &[])
                .map_err(failed("uploading haystack"))?
                .wait()
                .map_err(failed("uploading haystack"))?;
            self.queue
                .enqueue_write_buffer(&mut pattern_buf, CL_BLOCKING, 0, pattern, &[])
                .map_err(failed("uploading pattern"))?
                .wait()
                .map_err(failed("uploading pattern"))?;
            self.queue
                .enqueue_write_buffer(&mut result_buf, CL_BLOCKING, 0, &zero, &[])
                .map_err(failed("resetting counter"))?
                .wait()
                .map_err(failed("resetting counter"))?;
        }
        trace!("Uploaded {} haystack bytes to {}", text_len, self.device_name);

        let text_len_arg = text_len as cl_ulong;
        let pattern_len_arg = pattern_len as cl_ulong;
        let kernel_event = unsafe {
            ExecuteKernel::new(&self.kernel)
                .set_arg(&text_buf)
                .set_arg(&text_len_arg)
                .set_arg(&pattern_buf)
                .set_arg(&pattern_len_arg)
                .set_arg(&result_buf)
                .set_global_work_size(text_len)
                .enqueue_nd_range(&self.queue)
                .map_err(failed("launching kernel"))?
        };
        kernel_event.wait().map_err(failed("running kernel"))?;

        let mut result: [cl_uint; 1] = [0];
        let read_event = unsafe {
            self.queue
                .enqueue_read_buffer(&result_buf, CL_BLOCKING, 0, &mut result, &[])
                .map_err(failed("reading counter"))?
        };
        read_event.wait().map_err(failed("reading counter"))?;

        Ok(u64::from(result[0]))
    }

    /// Waits for outstanding commands, then releases every OpenCL object
    pub(super) fn close(self) -> BenchResult<()> {
        self.queue.finish().map_err(failed("draining command queue"))?;
        Ok(())
    }
}
