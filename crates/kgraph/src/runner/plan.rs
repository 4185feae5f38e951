//! Everything setup produces for one shape signature.

use tracing::debug;

use crate::error::{GraphError, NodeLabel, RunnerError, RunnerResult};
use crate::graph::{resolve_graph, validate_graph, ResolvedNode, TensorRef};
use crate::kernel::{CompiledKernel, HardwareProfile, KernelBackend, KernelRequest, OpDescriptor};
use crate::ops::Operator;
use crate::options::RunnerOptions;
use crate::plan::{compute_liveness, plan_workspace, LiveInterval, WorkspaceLayout};
use crate::tensor::TensorDesc;

use super::ShapeSignature;

/// A finalized node with its compiled kernel.
#[derive(Debug)]
pub struct PlannedNode<K> {
    pub label: NodeLabel,
    pub op: OpDescriptor,
    pub inputs: Vec<TensorRef>,
    pub outputs: Vec<TensorRef>,
    pub resolved: ResolvedNode,
    pub kernel: CompiledKernel<K>,
}

/// Finalized graph, workspace layout and kernels for one signature.
///
/// Immutable once built; execute only reads it.
#[derive(Debug)]
pub struct Plan<S, K> {
    pub signature: ShapeSignature,
    pub graph_name: String,
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    pub internal_names: Vec<String>,
    pub internals: Vec<TensorDesc>,
    pub liveness: Vec<Option<LiveInterval>>,
    pub layout: WorkspaceLayout,
    pub nodes: Vec<PlannedNode<K>>,
    /// Scratch context as the last finalize callback left it.
    pub scratch: S,
}

impl<S, K> Plan<S, K> {
    pub fn tensor_name(&self, tensor: TensorRef) -> &str {
        let name = match tensor {
            TensorRef::Input(i) => self.input_names.get(i),
            TensorRef::Output(i) => self.output_names.get(i),
            TensorRef::Internal(i) => self.internal_names.get(i),
        };
        name.map_or("?", String::as_str)
    }
}

pub(crate) fn build_plan<O, B>(
    operator: &O,
    backend: &B,
    profile: &HardwareProfile,
    options: &RunnerOptions,
    signature: ShapeSignature,
) -> RunnerResult<Plan<O::Scratch, B::Kernel>>
where
    O: Operator,
    B: KernelBackend,
{
    let mut graph = operator.build_graph(profile, &signature.inputs)?;
    // Graphs need not come from `GraphBuilder::build`.
    validate_graph(&graph)?;
    let mut scratch = O::Scratch::default();
    let resolved = resolve_graph(
        &mut graph,
        profile,
        &signature.inputs,
        &signature.outputs,
        &mut scratch,
    )?;

    let liveness = compute_liveness(graph.internals.len(), graph.node_io());
    let sizes = resolved
        .internals
        .iter()
        .enumerate()
        .map(|(slot, desc)| {
            desc.storage_bytes().ok_or(GraphError::SizeOverflow {
                tensor: TensorRef::Internal(slot),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let layout = plan_workspace(
        &sizes,
        &liveness,
        graph.nodes.len(),
        options.workspace_alignment,
    )?;

    let mut nodes = Vec::with_capacity(graph.nodes.len());
    let mut kernel_scratch = 0usize;
    for ((index, node), resolved_node) in graph.nodes.into_iter().enumerate().zip(resolved.nodes) {
        let label = NodeLabel::new(index, node.name.as_str());
        let request = KernelRequest {
            node: &node.name,
            op: &node.op,
            inputs: &resolved_node.inputs,
            outputs: &resolved_node.outputs,
        };
        let kernel = backend
            .compile(&request)
            .map_err(|source| RunnerError::Compile {
                node: label.clone(),
                source,
            })?;
        debug!(
            node = %label,
            tiling_bytes = kernel.tiling.len(),
            scratch_bytes = kernel.scratch_bytes,
            "compiled kernel"
        );
        kernel_scratch = kernel_scratch.max(kernel.scratch_bytes);
        nodes.push(PlannedNode {
            label,
            op: node.op,
            inputs: node.inputs,
            outputs: node.outputs,
            resolved: resolved_node,
            kernel,
        });
    }
    let layout = layout.with_kernel_scratch(kernel_scratch, options.workspace_alignment)?;

    Ok(Plan {
        signature,
        graph_name: graph.name,
        input_names: graph.inputs,
        output_names: graph.outputs,
        internal_names: graph.internals,
        internals: resolved.internals,
        liveness,
        layout,
        nodes,
        scratch,
    })
}
