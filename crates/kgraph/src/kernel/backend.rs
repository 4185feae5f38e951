//! The seam to the opaque accelerator kernel backend.

use crate::error::BackendResult;
use crate::tensor::{DeviceBuffer, TensorDesc};

use super::OpDescriptor;

/// Everything the backend needs to compile one finalized node.
#[derive(Debug, Clone, Copy)]
pub struct KernelRequest<'a> {
    pub node: &'a str,
    pub op: &'a OpDescriptor,
    /// Input descriptors as the kernel sees them (post-view).
    pub inputs: &'a [TensorDesc],
    pub outputs: &'a [TensorDesc],
}

/// A device-executable kernel plus its per-invocation tiling data.
#[derive(Debug, Clone)]
pub struct CompiledKernel<K> {
    pub handle: K,
    pub tiling: Vec<u8>,
    /// Kernel-private scratch the launch needs, carved from the workspace.
    pub scratch_bytes: usize,
}

impl<K> CompiledKernel<K> {
    pub fn new(handle: K, tiling: Vec<u8>) -> Self {
        Self {
            handle,
            tiling,
            scratch_bytes: 0,
        }
    }

    pub fn with_scratch(mut self, bytes: usize) -> Self {
        self.scratch_bytes = bytes;
        self
    }
}

/// A tensor bound to device memory for one launch.
#[derive(Debug, Clone, Copy)]
pub struct BoundTensor<'a> {
    pub desc: &'a TensorDesc,
    pub buffer: DeviceBuffer,
}

#[derive(Debug, Clone, Copy)]
pub struct LaunchArgs<'a> {
    pub node: &'a str,
    pub inputs: &'a [BoundTensor<'a>],
    pub outputs: &'a [BoundTensor<'a>],
    pub tiling: &'a [u8],
    pub scratch: Option<DeviceBuffer>,
}

/// Compiles and launches primitive kernels on one device queue.
///
/// Launches are submitted in node order; the engine relies on the queue to
/// execute them in submission order.
pub trait KernelBackend {
    type Kernel;

    fn backend_name(&self) -> &str;

    fn compile(&self, request: &KernelRequest<'_>) -> BackendResult<CompiledKernel<Self::Kernel>>;

    fn launch(&self, kernel: &Self::Kernel, args: &LaunchArgs<'_>) -> BackendResult<()>;
}
