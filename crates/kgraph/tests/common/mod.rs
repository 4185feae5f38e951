#![allow(dead_code)]

use std::fmt;
use std::sync::Arc;

use kgraph::{ConfigError, GraphError, HardwareProfile, KernelGraph, Operator, TensorDesc};
use kgraph_backend_tests::RecordingBackend;

type BuildFn<S> =
    dyn Fn(&HardwareProfile, &[TensorDesc]) -> Result<KernelGraph<S>, GraphError> + Send + Sync;

/// Operator whose graph comes from a closure, for wiring ad-hoc graphs.
pub struct FnOperator<S> {
    name: String,
    inputs: usize,
    outputs: usize,
    build: Arc<BuildFn<S>>,
}

impl<S> FnOperator<S> {
    pub fn new<F>(name: &str, inputs: usize, outputs: usize, build: F) -> Self
    where
        F: Fn(&HardwareProfile, &[TensorDesc]) -> Result<KernelGraph<S>, GraphError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            inputs,
            outputs,
            build: Arc::new(build),
        }
    }
}

impl<S: Default + fmt::Debug + Send + 'static> Operator for FnOperator<S> {
    type Scratch = S;

    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        self.inputs
    }

    fn output_count(&self) -> usize {
        self.outputs
    }

    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn build_graph(
        &self,
        profile: &HardwareProfile,
        inputs: &[TensorDesc],
    ) -> Result<KernelGraph<S>, GraphError> {
        (self.build)(profile, inputs)
    }
}

pub fn recording() -> Arc<RecordingBackend> {
    Arc::new(RecordingBackend::new())
}
