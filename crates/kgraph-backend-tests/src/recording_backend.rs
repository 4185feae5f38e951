use std::collections::HashMap;
use std::sync::Mutex;

use kgraph::kernel::{CompiledKernel, KernelRequest, LaunchArgs};
use kgraph::{BackendError, BackendResult, DeviceBuffer, KernelBackend, OpDescriptor, PrimitiveKind, TensorDesc};

/// What the engine asked the backend to compile.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileRecord {
    pub node: String,
    pub op: OpDescriptor,
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
}

/// One launch with the buffers it was bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRecord {
    pub node: String,
    pub kind: PrimitiveKind,
    pub input_descs: Vec<TensorDesc>,
    pub inputs: Vec<DeviceBuffer>,
    pub outputs: Vec<DeviceBuffer>,
    pub tiling: Vec<u8>,
    pub scratch: Option<DeviceBuffer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedKernel {
    pub node: String,
    pub kind: PrimitiveKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Fault {
    CompileNode(String),
    ExhaustKind(PrimitiveKind),
    LaunchNode(String),
}

/// Test-only kernel backend that records every compile and launch.
///
/// Faults can be armed at any time, also through a shared `Arc`.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    compiles: Mutex<Vec<CompileRecord>>,
    launches: Mutex<Vec<LaunchRecord>>,
    faults: Mutex<Vec<Fault>>,
    scratch: Mutex<HashMap<PrimitiveKind, usize>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests `bytes` of kernel scratch for every kernel of `kind`.
    pub fn with_scratch(self, kind: PrimitiveKind, bytes: usize) -> Self {
        self.scratch
            .lock()
            .expect("backend mutex poisoned")
            .insert(kind, bytes);
        self
    }

    pub fn fail_compile(&self, node: &str) {
        self.arm(Fault::CompileNode(node.to_string()));
    }

    /// Every compile of `kind` reports exhausted device resources.
    pub fn exhaust_on(&self, kind: PrimitiveKind) {
        self.arm(Fault::ExhaustKind(kind));
    }

    pub fn fail_launch(&self, node: &str) {
        self.arm(Fault::LaunchNode(node.to_string()));
    }

    pub fn clear_faults(&self) {
        self.faults.lock().expect("backend mutex poisoned").clear();
    }

    fn arm(&self, fault: Fault) {
        self.faults.lock().expect("backend mutex poisoned").push(fault);
    }

    fn armed(&self, fault: &Fault) -> bool {
        self.faults
            .lock()
            .expect("backend mutex poisoned")
            .contains(fault)
    }

    pub fn compiles(&self) -> Vec<CompileRecord> {
        self.compiles.lock().expect("backend mutex poisoned").clone()
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().expect("backend mutex poisoned").clone()
    }

    /// Node names in launch order.
    pub fn launch_order(&self) -> Vec<String> {
        self.launches()
            .into_iter()
            .map(|record| record.node)
            .collect()
    }

    pub fn compile_count(&self) -> usize {
        self.compiles.lock().expect("backend mutex poisoned").len()
    }

    pub fn clear(&self) {
        self.compiles.lock().expect("backend mutex poisoned").clear();
        self.launches.lock().expect("backend mutex poisoned").clear();
    }
}

impl KernelBackend for RecordingBackend {
    type Kernel = RecordedKernel;

    fn backend_name(&self) -> &str {
        "recording"
    }

    fn compile(&self, request: &KernelRequest<'_>) -> BackendResult<CompiledKernel<RecordedKernel>> {
        let kind = request.op.kind();
        if self.armed(&Fault::CompileNode(request.node.to_string())) {
            return Err(BackendError::unsupported(
                kind,
                format!("injected compile failure for `{}`", request.node),
            ));
        }
        if self.armed(&Fault::ExhaustKind(kind)) {
            return Err(BackendError::exhausted(format!(
                "no tiling fits `{}` for {kind}",
                request.node
            )));
        }
        self.compiles
            .lock()
            .expect("backend mutex poisoned")
            .push(CompileRecord {
                node: request.node.to_string(),
                op: request.op.clone(),
                inputs: request.inputs.to_vec(),
                outputs: request.outputs.to_vec(),
            });
        let scratch = self
            .scratch
            .lock()
            .expect("backend mutex poisoned")
            .get(&kind)
            .copied()
            .unwrap_or(0);
        let tiling = format!("{:?}", request.op).into_bytes();
        let kernel = RecordedKernel {
            node: request.node.to_string(),
            kind,
        };
        Ok(CompiledKernel::new(kernel, tiling).with_scratch(scratch))
    }

    fn launch(&self, kernel: &RecordedKernel, args: &LaunchArgs<'_>) -> BackendResult<()> {
        if self.armed(&Fault::LaunchNode(args.node.to_string())) {
            return Err(BackendError::execution(format!(
                "injected launch failure for `{}`",
                args.node
            )));
        }
        self.launches
            .lock()
            .expect("backend mutex poisoned")
            .push(LaunchRecord {
                node: kernel.node.clone(),
                kind: kernel.kind,
                input_descs: args.inputs.iter().map(|bound| bound.desc.clone()).collect(),
                inputs: args.inputs.iter().map(|bound| bound.buffer).collect(),
                outputs: args.outputs.iter().map(|bound| bound.buffer).collect(),
                tiling: args.tiling.to_vec(),
                scratch: args.scratch,
            });
        Ok(())
    }
}
