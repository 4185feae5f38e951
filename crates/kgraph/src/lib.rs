//! Kernel-graph lowering, workspace planning and execution for accelerator operators.
//!
//! An [`Operator`] lowers itself into a [`KernelGraph`] of primitive kernels.
//! The [`Runner`] resolves that graph against concrete shapes (views, then
//! finalize callbacks), packs the intermediates into one shared workspace and
//! dispatches every node to a [`KernelBackend`] in order.

pub mod error;
pub mod graph;
pub mod kernel;
pub mod ops;
pub mod options;
pub mod plan;
pub mod runner;
pub mod tensor;
mod env;

pub use error::{
    BackendError, BackendResult, ConfigError, FinalizeError, GraphError, NodeLabel, RunnerError,
    RunnerResult,
};
pub use graph::{GraphBuilder, KernelGraph, TensorRef, ViewFn};
pub use kernel::{HardwareProfile, KernelBackend, OpDescriptor, PrimitiveKind};
pub use ops::Operator;
pub use options::RunnerOptions;
pub use plan::WorkspaceLayout;
pub use runner::{PlanDump, Runner, RunnerState, ShapeSignature};
pub use tensor::{DType, DeviceBuffer, Layout, Shape, TensorDesc, TensorValue, VariantPack};
