//! Diagnostic snapshot of a finalized plan.

use std::fmt;

use serde::Serialize;

use crate::graph::TensorRef;
use crate::kernel::OpDescriptor;
use crate::plan::{LiveInterval, WorkspaceSlot};
use crate::tensor::TensorDesc;

use super::plan::Plan;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDump {
    pub operator: String,
    pub graph: String,
    pub backend: String,
    pub signature: String,
    pub fingerprint: String,
    pub nodes: Vec<NodeDump>,
    pub internals: Vec<InternalDump>,
    pub workspace: WorkspaceDump,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDump {
    pub index: usize,
    pub name: String,
    pub op: OpDescriptor,
    /// `name: desc` of every input as the kernel sees it.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub tiling_bytes: usize,
    pub scratch_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InternalDump {
    pub index: usize,
    pub name: String,
    pub desc: String,
    pub live: Option<LiveInterval>,
    pub slot: Option<WorkspaceSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkspaceDump {
    pub tensor_bytes: usize,
    pub scratch_offset: usize,
    pub scratch_bytes: usize,
    pub total_bytes: usize,
    pub naive_bytes: usize,
    pub bytes_saved: usize,
}

impl PlanDump {
    pub(crate) fn capture<S, K>(operator: &str, backend: &str, plan: &Plan<S, K>) -> Self {
        let nodes = plan
            .nodes
            .iter()
            .map(|node| {
                let describe = |tensors: &[TensorRef], descs: &[TensorDesc]| {
                    tensors
                        .iter()
                        .zip(descs)
                        .map(|(&tensor, desc)| format!("{}: {desc}", plan.tensor_name(tensor)))
                        .collect::<Vec<_>>()
                };
                NodeDump {
                    index: node.label.index,
                    name: node.label.name.clone(),
                    op: node.op.clone(),
                    inputs: describe(&node.inputs, &node.resolved.inputs),
                    outputs: describe(&node.outputs, &node.resolved.outputs),
                    tiling_bytes: node.kernel.tiling.len(),
                    scratch_bytes: node.kernel.scratch_bytes,
                }
            })
            .collect();
        let internals = plan
            .internals
            .iter()
            .enumerate()
            .map(|(index, desc)| InternalDump {
                index,
                name: plan.internal_names.get(index).cloned().unwrap_or_default(),
                desc: desc.to_string(),
                live: plan.liveness.get(index).copied().flatten(),
                slot: plan.layout.slot(index),
            })
            .collect();
        let layout = &plan.layout;
        Self {
            operator: operator.to_string(),
            graph: plan.graph_name.clone(),
            backend: backend.to_string(),
            signature: plan.signature.to_string(),
            fingerprint: format!("{:016x}", plan.signature.fingerprint()),
            nodes,
            internals,
            workspace: WorkspaceDump {
                tensor_bytes: layout.tensor_bytes,
                scratch_offset: layout.scratch_offset,
                scratch_bytes: layout.scratch_bytes,
                total_bytes: layout.total_bytes,
                naive_bytes: layout.naive_bytes,
                bytes_saved: layout.bytes_saved(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for PlanDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "plan {} for {} on {} [{}]",
            self.graph, self.operator, self.backend, self.fingerprint
        )?;
        writeln!(f, "  signature {}", self.signature)?;
        for node in &self.nodes {
            writeln!(f, "  #{:<3} {:<16} {:?}", node.index, node.name, node.op)?;
            for input in &node.inputs {
                writeln!(f, "         in  {input}")?;
            }
            for output in &node.outputs {
                writeln!(f, "         out {output}")?;
            }
        }
        for internal in &self.internals {
            let live = match internal.live {
                Some(live) => format!("{}..={}", live.producer, live.death),
                None => "-".to_string(),
            };
            let slot = match internal.slot {
                Some(slot) => format!("@{}+{}", slot.offset, slot.bytes),
                None => "unallocated".to_string(),
            };
            writeln!(
                f,
                "  %{:<3} {:<16} {:<28} live {:<8} {}",
                internal.index, internal.name, internal.desc, live, slot
            )?;
        }
        let ws = &self.workspace;
        write!(
            f,
            "  workspace {} bytes (tensors {}, kernel scratch {} @{}, saved {} of {})",
            ws.total_bytes,
            ws.tensor_bytes,
            ws.scratch_bytes,
            ws.scratch_offset,
            ws.bytes_saved,
            ws.naive_bytes
        )
    }
}
