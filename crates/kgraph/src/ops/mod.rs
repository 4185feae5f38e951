//! Reference operators and their lowering strategies.
//!
//! Each operator validates its static parameters at init and builds one of
//! several equivalent kernel graphs per shape signature. Which graph is built
//! depends only on the [`HardwareProfile`] and the observed input layouts.

mod attention;
mod linear;
mod rms_norm;

use std::fmt;

use crate::error::{ConfigError, GraphError};
use crate::graph::KernelGraph;
use crate::kernel::HardwareProfile;
use crate::tensor::TensorDesc;

pub use attention::{AttentionOperation, AttentionParams, AttentionScratch, AttentionStrategy};
pub use linear::{LinearOperation, LinearParams, LinearScratch, LinearStrategy};
pub use rms_norm::{RmsNormOperation, RmsNormParams, RmsNormScratch};

/// A high-level operator the runner can lower, plan and execute.
pub trait Operator {
    /// Side-channel state shared by the graph's views and finalize callbacks.
    /// A fresh value is created for every setup.
    type Scratch: Default + fmt::Debug + Send + 'static;

    fn name(&self) -> &str;

    fn input_count(&self) -> usize;

    fn output_count(&self) -> usize;

    /// Checks shape-independent parameters.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Builds the kernel graph for the given input descriptors.
    fn build_graph(
        &self,
        profile: &HardwareProfile,
        inputs: &[TensorDesc],
    ) -> Result<KernelGraph<Self::Scratch>, GraphError>;
}

fn input_at<'a>(
    operator: &str,
    inputs: &'a [TensorDesc],
    index: usize,
) -> Result<&'a TensorDesc, GraphError> {
    inputs.get(index).ok_or_else(|| GraphError::NoLegalLowering {
        operator: operator.to_string(),
        reason: format!("input {index} is not bound"),
    })
}
