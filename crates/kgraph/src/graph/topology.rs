use crate::error::{GraphError, NodeLabel};

use super::{KernelGraph, TensorRef};

fn producer_label<S>(graph: &KernelGraph<S>, index: usize) -> NodeLabel {
    NodeLabel::new(index, graph.nodes[index].name.as_str())
}

/// Checks that every operand resolves, internals and outputs are written
/// exactly once, and no node reads a tensor before it is produced.
pub fn validate_graph<S>(graph: &KernelGraph<S>) -> Result<(), GraphError> {
    let mut internal_producer: Vec<Option<usize>> = vec![None; graph.internals.len()];
    let mut output_producer: Vec<Option<usize>> = vec![None; graph.outputs.len()];

    for (index, node) in graph.nodes.iter().enumerate() {
        let label = NodeLabel::new(index, node.name.as_str());
        let expected = node.op.input_arity();
        if node.inputs.len() != expected {
            return Err(GraphError::OperandCount {
                node: label,
                kind: node.op.kind(),
                expected,
                actual: node.inputs.len(),
            });
        }
        if !node.views.is_empty() && node.views.len() != node.inputs.len() {
            return Err(GraphError::ViewSlotMismatch {
                node: label,
                views: node.views.len(),
                inputs: node.inputs.len(),
            });
        }

        for &tensor in &node.inputs {
            let producer = match tensor {
                TensorRef::Input(slot) if slot < graph.inputs.len() => continue,
                TensorRef::Input(_) => None,
                TensorRef::Output(slot) => output_producer.get(slot),
                TensorRef::Internal(slot) => internal_producer.get(slot),
            };
            match producer {
                None => {
                    return Err(GraphError::UnknownTensor {
                        node: label,
                        tensor,
                    })
                }
                Some(None) => {
                    return Err(GraphError::ReadBeforeWrite {
                        node: label,
                        tensor,
                    })
                }
                Some(Some(_)) => {}
            }
        }

        for &tensor in &node.outputs {
            let slot = match tensor {
                TensorRef::Input(_) => {
                    return Err(GraphError::WritesInput {
                        node: label,
                        tensor,
                    })
                }
                TensorRef::Output(slot) => output_producer.get_mut(slot),
                TensorRef::Internal(slot) => internal_producer.get_mut(slot),
            };
            match slot {
                None => {
                    return Err(GraphError::UnknownTensor {
                        node: label,
                        tensor,
                    })
                }
                Some(Some(first)) => {
                    return Err(GraphError::MultipleProducers {
                        tensor,
                        first: producer_label(graph, *first),
                        second: label,
                    })
                }
                Some(entry) => *entry = Some(index),
            }
        }
    }

    let unproduced = internal_producer
        .iter()
        .enumerate()
        .map(|(slot, producer)| (TensorRef::Internal(slot), producer))
        .chain(
            output_producer
                .iter()
                .enumerate()
                .map(|(slot, producer)| (TensorRef::Output(slot), producer)),
        )
        .find(|(_, producer)| producer.is_none());
    if let Some((tensor, _)) = unproduced {
        return Err(GraphError::NeverProduced {
            tensor,
            name: graph.tensor_name(tensor).unwrap_or_default().to_string(),
        });
    }
    Ok(())
}
