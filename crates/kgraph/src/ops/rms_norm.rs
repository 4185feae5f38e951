use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GraphError};
use crate::graph::{FinalizeCtx, FinalizeFn, GraphBuilder, KernelGraph, ViewFn};
use crate::kernel::{ElementwiseKind, HardwareProfile, OpDescriptor};
use crate::tensor::TensorDesc;

use super::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmsNormParams {
    pub hidden: usize,
    pub epsilon: f32,
    /// Adds a residual input to `x` before normalizing.
    pub has_residual: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RmsNormScratch {
    /// Row count after folding every leading axis.
    pub rows: usize,
}

/// `y = rms_norm(x (+ residual)) * gamma` over the last axis.
#[derive(Debug, Clone)]
pub struct RmsNormOperation {
    name: String,
    params: RmsNormParams,
}

impl RmsNormOperation {
    pub fn new(name: impl Into<String>, params: RmsNormParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

impl Operator for RmsNormOperation {
    type Scratch = RmsNormScratch;

    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        if self.params.has_residual {
            3
        } else {
            2
        }
    }

    fn output_count(&self) -> usize {
        1
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.params.hidden == 0 {
            return Err(ConfigError::param(&self.name, "hidden", "must be non-zero"));
        }
        if !(self.params.epsilon.is_finite() && self.params.epsilon > 0.0) {
            return Err(ConfigError::param(
                &self.name,
                "epsilon",
                format!("must be finite and positive, got {}", self.params.epsilon),
            ));
        }
        Ok(())
    }

    fn build_graph(
        &self,
        _profile: &HardwareProfile,
        _inputs: &[TensorDesc],
    ) -> Result<KernelGraph<RmsNormScratch>, GraphError> {
        let hidden = self.params.hidden;
        let mut graph = GraphBuilder::new(format!("{}/rms_norm", self.name));
        let x = graph.input("x");
        let gamma = graph.input("gamma");
        let residual = self.params.has_residual.then(|| graph.input("residual"));
        let y = graph.output("y");

        let normed_input = match residual {
            Some(residual) => {
                let summed = graph.internal("summed");
                graph
                    .node("residual_add", OpDescriptor::Elementwise(ElementwiseKind::Add))
                    .input(x)
                    .input(residual)
                    .output(summed)
                    .push();
                summed
            }
            None => x,
        };

        let fold = ViewFn::fold_to_matrix().capturing(|dims: &[usize], scratch: &mut RmsNormScratch| {
            scratch.rows = dims[..dims.len().saturating_sub(1)].iter().product();
            Ok(())
        });
        graph
            .node(
                "rms_norm",
                OpDescriptor::RmsNorm {
                    epsilon: self.params.epsilon,
                },
            )
            .input_view(normed_input, fold)
            .input(gamma)
            .output(y)
            .finalize(FinalizeFn::new(
                move |ctx: &mut FinalizeCtx<'_, RmsNormScratch>| {
                    let dims = ctx.input_dims(0, 2)?;
                    if dims[1] != hidden {
                        return Err(format!(
                            "normalized axis has {} elements, operator expects {hidden}",
                            dims[1]
                        ));
                    }
                    if dims[0] != ctx.scratch.rows {
                        return Err(format!(
                            "folded {} rows but the view captured {}",
                            dims[0], ctx.scratch.rows
                        ));
                    }
                    Ok(())
                },
            ))
            .push();
        graph.build()
    }
}
