use crate::error::GraphError;
use crate::kernel::OpDescriptor;

use super::{validate_graph, FinalizeFn, KernelGraph, KernelGraphNode, TensorRef, ViewFn};

/// Declares tensor slots and appends nodes in execution order.
pub struct GraphBuilder<S> {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    internals: Vec<String>,
    nodes: Vec<KernelGraphNode<S>>,
}

impl<S: 'static> GraphBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            internals: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn input(&mut self, name: impl Into<String>) -> TensorRef {
        self.inputs.push(name.into());
        TensorRef::Input(self.inputs.len() - 1)
    }

    pub fn output(&mut self, name: impl Into<String>) -> TensorRef {
        self.outputs.push(name.into());
        TensorRef::Output(self.outputs.len() - 1)
    }

    pub fn internal(&mut self, name: impl Into<String>) -> TensorRef {
        self.internals.push(name.into());
        TensorRef::Internal(self.internals.len() - 1)
    }

    pub fn node(&mut self, name: impl Into<String>, op: OpDescriptor) -> NodeBuilder<'_, S> {
        NodeBuilder {
            graph: self,
            node: KernelGraphNode {
                name: name.into(),
                op,
                inputs: Vec::new(),
                outputs: Vec::new(),
                views: Vec::new(),
                finalize: None,
            },
        }
    }

    /// Validates wiring and order, then hands out the graph.
    pub fn build(self) -> Result<KernelGraph<S>, GraphError> {
        let graph = KernelGraph {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            internals: self.internals,
            nodes: self.nodes,
        };
        validate_graph(&graph)?;
        Ok(graph)
    }
}

/// Wires one node; nothing is recorded until [`NodeBuilder::push`].
pub struct NodeBuilder<'g, S> {
    graph: &'g mut GraphBuilder<S>,
    node: KernelGraphNode<S>,
}

impl<'g, S: 'static> NodeBuilder<'g, S> {
    pub fn input(mut self, tensor: TensorRef) -> Self {
        self.node.inputs.push(tensor);
        self.node.views.push(None);
        self
    }

    /// Adds an input seen through `view`.
    pub fn input_view(mut self, tensor: TensorRef, view: ViewFn<S>) -> Self {
        self.node.inputs.push(tensor);
        self.node.views.push(Some(view));
        self
    }

    pub fn output(mut self, tensor: TensorRef) -> Self {
        self.node.outputs.push(tensor);
        self
    }

    pub fn finalize(mut self, finalize: FinalizeFn<S>) -> Self {
        self.node.finalize = Some(finalize);
        self
    }

    /// Appends the node and returns its index.
    pub fn push(mut self) -> usize {
        if self.node.views.iter().all(Option::is_none) {
            self.node.views.clear();
        }
        self.graph.nodes.push(self.node);
        self.graph.nodes.len() - 1
    }
}
