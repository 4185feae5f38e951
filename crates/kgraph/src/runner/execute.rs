use tracing::debug;

use crate::error::{RunnerError, RunnerResult};
use crate::graph::TensorRef;
use crate::kernel::{BoundTensor, KernelBackend, LaunchArgs};
use crate::tensor::{DeviceAddress, DeviceBuffer, TensorDesc, VariantPack};

use super::plan::Plan;
use super::ShapeSignature;

/// Rejects a pack the plan was not built for, before anything is launched.
pub(crate) fn validate_bindings<S, K>(
    plan: &Plan<S, K>,
    pack: &VariantPack,
    workspace: DeviceBuffer,
) -> RunnerResult<()> {
    for (what, expected, actual) in [
        ("execute inputs", plan.signature.inputs.len(), pack.inputs.len()),
        ("execute outputs", plan.signature.outputs.len(), pack.outputs.len()),
    ] {
        if expected != actual {
            return Err(RunnerError::Arity {
                what,
                expected,
                actual,
            });
        }
    }
    if let Some(detail) = plan.signature.diff(&ShapeSignature::of(pack)) {
        return Err(RunnerError::SignatureMismatch { detail });
    }
    let bound = pack
        .inputs
        .iter()
        .enumerate()
        .map(|(i, value)| (TensorRef::Input(i), value))
        .chain(
            pack.outputs
                .iter()
                .enumerate()
                .map(|(i, value)| (TensorRef::Output(i), value)),
        );
    for (tensor, value) in bound {
        let required = value.desc.storage_bytes().unwrap_or(usize::MAX);
        if value.buffer.len < required {
            return Err(RunnerError::BufferTooSmall {
                what: format!("{tensor} `{}`", plan.tensor_name(tensor)),
                required,
                actual: value.buffer.len,
            });
        }
    }
    if workspace.len < plan.layout.total_bytes {
        return Err(RunnerError::BufferTooSmall {
            what: "workspace".to_string(),
            required: plan.layout.total_bytes,
            actual: workspace.len,
        });
    }
    // Every slot and the scratch region end at or below `total_bytes`.
    if workspace.addr.offset(plan.layout.total_bytes).is_none() {
        return Err(RunnerError::AddressOverflow {
            what: "workspace".to_string(),
            base: workspace.addr.0,
            bytes: plan.layout.total_bytes,
        });
    }
    Ok(())
}

fn workspace_offset(
    workspace: DeviceBuffer,
    bytes: usize,
    what: impl FnOnce() -> String,
) -> RunnerResult<DeviceAddress> {
    workspace
        .addr
        .offset(bytes)
        .ok_or_else(|| RunnerError::AddressOverflow {
            what: what(),
            base: workspace.addr.0,
            bytes,
        })
}

fn bind<S, K>(
    plan: &Plan<S, K>,
    pack: &VariantPack,
    workspace: DeviceBuffer,
    tensor: TensorRef,
) -> RunnerResult<DeviceBuffer> {
    let buffer = match tensor {
        TensorRef::Input(i) => pack.inputs[i].buffer,
        TensorRef::Output(i) => pack.outputs[i].buffer,
        TensorRef::Internal(i) => match plan.layout.slot(i) {
            Some(slot) => DeviceBuffer {
                addr: workspace_offset(workspace, slot.offset, || {
                    format!("{tensor} `{}`", plan.tensor_name(tensor))
                })?,
                len: slot.bytes,
            },
            None => DeviceBuffer {
                addr: workspace.addr,
                len: 0,
            },
        },
    };
    Ok(buffer)
}

fn bind_all<'a, S, K>(
    plan: &Plan<S, K>,
    pack: &VariantPack,
    workspace: DeviceBuffer,
    tensors: &[TensorRef],
    descs: &'a [TensorDesc],
) -> RunnerResult<Vec<BoundTensor<'a>>> {
    tensors
        .iter()
        .zip(descs)
        .map(|(&tensor, desc)| {
            Ok(BoundTensor {
                desc,
                buffer: bind(plan, pack, workspace, tensor)?,
            })
        })
        .collect()
}

/// Launches every node in plan order. Stops at the first backend failure.
pub(crate) fn dispatch<S, B>(
    backend: &B,
    plan: &Plan<S, B::Kernel>,
    pack: &VariantPack,
    workspace: DeviceBuffer,
) -> RunnerResult<()>
where
    B: KernelBackend,
{
    let scratch_base = workspace_offset(workspace, plan.layout.scratch_offset, || {
        "kernel scratch".to_string()
    })?;
    for node in &plan.nodes {
        let inputs = bind_all(plan, pack, workspace, &node.inputs, &node.resolved.inputs)?;
        let outputs = bind_all(plan, pack, workspace, &node.outputs, &node.resolved.outputs)?;
        let scratch = (node.kernel.scratch_bytes > 0).then(|| DeviceBuffer {
            addr: scratch_base,
            len: node.kernel.scratch_bytes,
        });
        let args = LaunchArgs {
            node: &node.label.name,
            inputs: &inputs,
            outputs: &outputs,
            tiling: &node.kernel.tiling,
            scratch,
        };
        backend
            .launch(&node.kernel.handle, &args)
            .map_err(|source| RunnerError::Launch {
                node: node.label.clone(),
                source,
            })?;
        debug!(node = %node.label, "launched");
    }
    Ok(())
}
