//! Kernel graphs: ordered primitive nodes over input, output and internal tensors.
//!
//! A graph is built once per shape signature by an operator's builder
//! strategy. Node order is the execution order; builders append nodes in
//! dependency order and [`GraphBuilder::build`] rejects anything else.

mod builder;
mod finalize;
mod resolve;
mod topology;
mod view;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kernel::OpDescriptor;

pub use builder::{GraphBuilder, NodeBuilder};
pub use finalize::{FinalizeCtx, FinalizeFn};
pub use resolve::{resolve_graph, ResolvedGraph, ResolvedNode};
pub use topology::validate_graph;
pub use view::ViewFn;

/// Where a node operand lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TensorRef {
    /// Caller-bound input slot.
    Input(usize),
    /// Caller-bound output slot.
    Output(usize),
    /// Workspace-backed intermediate.
    Internal(usize),
}

impl fmt::Display for TensorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorRef::Input(index) => write!(f, "input#{index}"),
            TensorRef::Output(index) => write!(f, "output#{index}"),
            TensorRef::Internal(index) => write!(f, "internal#{index}"),
        }
    }
}

/// One primitive dispatch.
pub struct KernelGraphNode<S> {
    pub name: String,
    pub op: OpDescriptor,
    pub inputs: Vec<TensorRef>,
    pub outputs: Vec<TensorRef>,
    /// Either empty or one slot per input.
    pub views: Vec<Option<ViewFn<S>>>,
    pub finalize: Option<FinalizeFn<S>>,
}

impl<S> KernelGraphNode<S> {
    pub fn view(&self, input: usize) -> Option<&ViewFn<S>> {
        self.views.get(input).and_then(Option::as_ref)
    }
}

impl<S> fmt::Debug for KernelGraphNode<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelGraphNode")
            .field("name", &self.name)
            .field("op", &self.op)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("views", &self.views.iter().filter(|v| v.is_some()).count())
            .field("finalize", &self.finalize.is_some())
            .finish()
    }
}

/// Node list plus the names of every declared tensor.
///
/// `S` is the per-setup scratch context shared by the graph's view and
/// finalize callbacks.
#[derive(Debug)]
pub struct KernelGraph<S> {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub internals: Vec<String>,
    pub nodes: Vec<KernelGraphNode<S>>,
}

impl<S> KernelGraph<S> {
    pub fn tensor_name(&self, tensor: TensorRef) -> Option<&str> {
        let names = match tensor {
            TensorRef::Input(_) => &self.inputs,
            TensorRef::Output(_) => &self.outputs,
            TensorRef::Internal(_) => &self.internals,
        };
        let index = match tensor {
            TensorRef::Input(index) | TensorRef::Output(index) | TensorRef::Internal(index) => {
                index
            }
        };
        names.get(index).map(String::as_str)
    }

    /// `(inputs, outputs)` of every node in execution order.
    pub fn node_io(&self) -> impl Iterator<Item = (&[TensorRef], &[TensorRef])> + '_ {
        self.nodes
            .iter()
            .map(|node| (node.inputs.as_slice(), node.outputs.as_slice()))
    }
}
