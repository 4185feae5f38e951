//! Setup-time shape resolution: views, legality, finalize, output inference.

use tracing::debug;

use crate::error::{FinalizeError, GraphError, NodeLabel, RunnerResult};
use crate::kernel::HardwareProfile;
use crate::tensor::{Shape, TensorDesc};

use super::{FinalizeCtx, KernelGraph, TensorRef};

/// Descriptors a node's kernel sees, after views were applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNode {
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGraph {
    pub nodes: Vec<ResolvedNode>,
    /// Inferred descriptor of every internal tensor.
    pub internals: Vec<TensorDesc>,
}

/// Walks the nodes in order, resolving every operand against the bound
/// descriptors.
///
/// For each node the input views run first, then the capability check, then
/// the finalize callback, then output inference. A finalize callback
/// therefore only ever observes post-view shapes of its own inputs and the
/// scratch state left by earlier nodes.
pub fn resolve_graph<S: 'static>(
    graph: &mut KernelGraph<S>,
    profile: &HardwareProfile,
    inputs: &[TensorDesc],
    outputs: &[TensorDesc],
    scratch: &mut S,
) -> RunnerResult<ResolvedGraph> {
    if graph.inputs.len() != inputs.len() {
        return Err(GraphError::Arity {
            what: "graph inputs",
            expected: graph.inputs.len(),
            actual: inputs.len(),
        }
        .into());
    }
    if graph.outputs.len() != outputs.len() {
        return Err(GraphError::Arity {
            what: "graph outputs",
            expected: graph.outputs.len(),
            actual: outputs.len(),
        }
        .into());
    }

    let mut internals: Vec<Option<TensorDesc>> = vec![None; graph.internals.len()];
    let mut produced_outputs: Vec<Option<TensorDesc>> = vec![None; outputs.len()];
    let mut resolved_nodes = Vec::with_capacity(graph.nodes.len());

    for (index, node) in graph.nodes.iter_mut().enumerate() {
        let label = NodeLabel::new(index, node.name.as_str());

        let mut node_inputs = Vec::with_capacity(node.inputs.len());
        for (slot, &tensor) in node.inputs.iter().enumerate() {
            let base = match tensor {
                TensorRef::Input(i) => inputs.get(i),
                TensorRef::Output(i) => produced_outputs.get(i).and_then(Option::as_ref),
                TensorRef::Internal(i) => internals.get(i).and_then(Option::as_ref),
            }
            .ok_or_else(|| GraphError::ReadBeforeWrite {
                node: label.clone(),
                tensor,
            })?;
            let desc = match node.views.get(slot).and_then(Option::as_ref) {
                Some(view) => {
                    let dims = view.apply(base.dims(), scratch).map_err(|reason| {
                        GraphError::ViewFailed {
                            node: label.clone(),
                            input: slot,
                            reason,
                        }
                    })?;
                    let after = Shape::new(dims);
                    if after.checked_num_elements() != base.shape.checked_num_elements() {
                        return Err(GraphError::ViewElementMismatch {
                            node: label,
                            input: slot,
                            before: base.shape.clone(),
                            after,
                        }
                        .into());
                    }
                    base.with_shape(after)
                }
                None => base.clone(),
            };
            node_inputs.push(desc);
        }

        let kind = node.op.kind();
        if let Some(primary) = node_inputs.first() {
            if !profile.supports(kind, primary.layout) {
                return Err(GraphError::UnsupportedLayout {
                    node: label,
                    kind,
                    layout: primary.layout,
                    profile: profile.name.clone(),
                }
                .into());
            }
        }

        if let Some(finalize) = node.finalize.as_ref() {
            let mut ctx = FinalizeCtx {
                node: node.name.as_str(),
                inputs: &node_inputs,
                op: &mut node.op,
                scratch: &mut *scratch,
            };
            finalize.call(&mut ctx).map_err(|reason| FinalizeError {
                node: label.clone(),
                reason,
            })?;
            debug!(node = %label, op = ?node.op, "finalized");
        }

        let inferred = node
            .op
            .infer_outputs(&node_inputs)
            .map_err(|reason| GraphError::ShapeInference {
                node: label.clone(),
                reason,
            })?;
        if inferred.len() != node.outputs.len() {
            return Err(GraphError::ShapeInference {
                node: label,
                reason: format!(
                    "{kind} produces {} outputs but the node declares {}",
                    inferred.len(),
                    node.outputs.len()
                ),
            }
            .into());
        }

        for (&tensor, desc) in node.outputs.iter().zip(&inferred) {
            match tensor {
                TensorRef::Internal(i) => {
                    if desc.storage_bytes().is_none() {
                        return Err(GraphError::SizeOverflow { tensor }.into());
                    }
                    let entry = internals.get_mut(i).ok_or_else(|| GraphError::UnknownTensor {
                        node: label.clone(),
                        tensor,
                    })?;
                    *entry = Some(desc.clone());
                }
                TensorRef::Output(i) => {
                    let bound = outputs.get(i).ok_or_else(|| GraphError::UnknownTensor {
                        node: label.clone(),
                        tensor,
                    })?;
                    let compatible = bound.dtype == desc.dtype
                        && bound.layout == desc.layout
                        && bound.shape.checked_num_elements() == desc.shape.checked_num_elements();
                    if !compatible {
                        return Err(GraphError::OutputMismatch {
                            node: label,
                            tensor,
                            inferred: desc.clone(),
                            bound: bound.clone(),
                        }
                        .into());
                    }
                    if let Some(entry) = produced_outputs.get_mut(i) {
                        *entry = Some(desc.clone());
                    }
                }
                TensorRef::Input(_) => {
                    return Err(GraphError::WritesInput {
                        node: label,
                        tensor,
                    }
                    .into())
                }
            }
        }

        resolved_nodes.push(ResolvedNode {
            inputs: node_inputs,
            outputs: inferred,
        });
    }

    let internals = internals
        .into_iter()
        .enumerate()
        .map(|(slot, desc)| {
            desc.ok_or_else(|| GraphError::NeverProduced {
                tensor: TensorRef::Internal(slot),
                name: graph.internals[slot].clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedGraph {
        nodes: resolved_nodes,
        internals,
    })
}
