use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, GraphError};
use crate::graph::{FinalizeCtx, FinalizeFn, GraphBuilder, KernelGraph, ViewFn};
use crate::kernel::{
    ElementwiseKind, HardwareProfile, MatMulDims, MatMulParams, OpDescriptor, PrimitiveKind,
    TransDataParams,
};
use crate::tensor::{Dims, Layout, TensorDesc};

use super::{input_at, Operator};

/// `y = x · weightᵀ (+ bias)` with `x: [.., in]`, `weight: [out, in]`, `bias: [out]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearParams {
    pub in_features: usize,
    pub out_features: usize,
    pub has_bias: bool,
}

/// Interchangeable lowerings of a linear layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearStrategy {
    /// One matmul over natural operands.
    Natural,
    /// Pack the operands, multiply in tiles, unpack the result.
    Packed,
}

impl LinearParams {
    /// Rejects finalized GEMM extents that contradict the configured features.
    fn check_extents(&self, k: usize, n: usize) -> Result<(), String> {
        if k != self.in_features {
            return Err(format!(
                "input has {k} features but the layer expects in_features={}",
                self.in_features
            ));
        }
        if n != self.out_features {
            return Err(format!(
                "weight yields {n} features but the layer expects out_features={}",
                self.out_features
            ));
        }
        Ok(())
    }
}

impl LinearStrategy {
    /// Natural when the matrix unit reads natural layout and the weight is
    /// not pre-packed, packed otherwise.
    pub fn select(
        profile: &HardwareProfile,
        input: &TensorDesc,
        weight: &TensorDesc,
    ) -> Option<LinearStrategy> {
        let natural_operands = input.layout == Layout::Natural && weight.layout == Layout::Natural;
        if natural_operands && profile.supports(PrimitiveKind::MatMul, Layout::Natural) {
            return Some(LinearStrategy::Natural);
        }
        let can_pack = profile.supports(PrimitiveKind::MatMul, Layout::Packed)
            && profile.supports(PrimitiveKind::TransData, Layout::Natural)
            && profile.supports(PrimitiveKind::TransData, Layout::Packed);
        if can_pack && input.layout == Layout::Natural {
            return Some(LinearStrategy::Packed);
        }
        None
    }
}

/// Shape facts the packed lowering passes from its first node to later ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearScratch {
    /// Dims of `x` before it was folded into a matrix.
    pub input_dims: Dims,
    pub m: usize,
    pub k: usize,
    pub n: usize,
}

#[derive(Debug, Clone)]
pub struct LinearOperation {
    name: String,
    params: LinearParams,
}

impl LinearOperation {
    pub fn new(name: impl Into<String>, params: LinearParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn params(&self) -> &LinearParams {
        &self.params
    }

    fn build_natural(&self) -> Result<KernelGraph<LinearScratch>, GraphError> {
        let params = self.params;
        let from_inputs = FinalizeFn::matmul_from_inputs();
        let mut graph = GraphBuilder::new(format!("{}/natural", self.name));
        let x = graph.input("x");
        let weight = graph.input("weight");
        let bias = self.params.has_bias.then(|| graph.input("bias"));
        let y = graph.output("y");

        let projected = if bias.is_some() {
            graph.internal("projected")
        } else {
            y
        };
        graph
            .node("matmul", OpDescriptor::MatMul(MatMulParams::new(false, true)))
            .input_view(x, ViewFn::fold_to_matrix())
            .input(weight)
            .output(projected)
            .finalize(FinalizeFn::new(
                move |ctx: &mut FinalizeCtx<'_, LinearScratch>| {
                    from_inputs.call(ctx)?;
                    match &*ctx.op {
                        OpDescriptor::MatMul(MatMulParams {
                            dims: Some(MatMulDims { k, n, .. }),
                            ..
                        }) => params.check_extents(*k, *n),
                        other => Err(format!("{} left without matmul dims", other.kind())),
                    }
                },
            ))
            .push();

        if let Some(bias) = bias {
            graph
                .node("bias_add", OpDescriptor::Elementwise(ElementwiseKind::Add))
                .input(projected)
                .input(bias)
                .output(y)
                .push();
        }
        graph.build()
    }

    fn build_packed(&self, weight_layout: Layout) -> Result<KernelGraph<LinearScratch>, GraphError> {
        let params = self.params;
        let out_features = params.out_features;
        let mut graph = GraphBuilder::new(format!("{}/packed", self.name));
        let x = graph.input("x");
        let weight = graph.input("weight");
        let bias = self.params.has_bias.then(|| graph.input("bias"));
        let y = graph.output("y");

        let x_packed = graph.internal("x_packed");
        let capture_input = ViewFn::fold_to_matrix().capturing(
            |dims: &[usize], scratch: &mut LinearScratch| {
                scratch.input_dims = Dims::from_slice(dims);
                Ok(())
            },
        );
        graph
            .node("pack_x", OpDescriptor::TransData(TransDataParams::to(Layout::Packed)))
            .input_view(x, capture_input)
            .output(x_packed)
            .push();

        let weight_packed = match weight_layout {
            Layout::Packed => weight,
            Layout::Natural => {
                let packed = graph.internal("weight_packed");
                graph
                    .node(
                        "pack_weight",
                        OpDescriptor::TransData(TransDataParams::to(Layout::Packed)),
                    )
                    .input(weight)
                    .output(packed)
                    .push();
                packed
            }
        };

        let y_packed = graph.internal("y_packed");
        graph
            .node("matmul", OpDescriptor::MatMul(MatMulParams::new(false, true)))
            .input(x_packed)
            .input(weight_packed)
            .output(y_packed)
            .finalize(FinalizeFn::new(
                move |ctx: &mut FinalizeCtx<'_, LinearScratch>| {
                    let (lead, k) = match ctx.scratch.input_dims.split_last() {
                        Some((&k, lead)) if !lead.is_empty() => (lead, k),
                        _ => {
                            return Err(format!(
                                "input dims {:?} were not captured as [.., in]",
                                ctx.scratch.input_dims
                            ))
                        }
                    };
                    params.check_extents(k, out_features)?;
                    let m = lead.iter().product();
                    ctx.scratch.m = m;
                    ctx.scratch.k = k;
                    ctx.scratch.n = out_features;
                    ctx.set_matmul_dims(m, k, out_features)
                },
            ))
            .push();

        let unpacked = if bias.is_some() {
            graph.internal("projected")
        } else {
            y
        };
        graph
            .node(
                "unpack_y",
                OpDescriptor::TransData(TransDataParams::to(Layout::Natural)),
            )
            .input(y_packed)
            .output(unpacked)
            .finalize(FinalizeFn::new(
                |ctx: &mut FinalizeCtx<'_, LinearScratch>| {
                    let crops = [ctx.scratch.m, ctx.scratch.n];
                    let params = ctx
                        .op
                        .trans_data_mut()
                        .ok_or("unpack node lost its layout-conversion descriptor")?;
                    params.crops = Some(crops);
                    Ok(())
                },
            ))
            .push();

        if let Some(bias) = bias {
            graph
                .node("bias_add", OpDescriptor::Elementwise(ElementwiseKind::Add))
                .input(unpacked)
                .input(bias)
                .output(y)
                .push();
        }
        graph.build()
    }
}

impl Operator for LinearOperation {
    type Scratch = LinearScratch;

    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        if self.params.has_bias {
            3
        } else {
            2
        }
    }

    fn output_count(&self) -> usize {
        1
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.params.in_features == 0 {
            return Err(ConfigError::param(&self.name, "in_features", "must be non-zero"));
        }
        if self.params.out_features == 0 {
            return Err(ConfigError::param(&self.name, "out_features", "must be non-zero"));
        }
        Ok(())
    }

    fn build_graph(
        &self,
        profile: &HardwareProfile,
        inputs: &[TensorDesc],
    ) -> Result<KernelGraph<LinearScratch>, GraphError> {
        let x = input_at(&self.name, inputs, 0)?;
        let weight = input_at(&self.name, inputs, 1)?;
        let strategy =
            LinearStrategy::select(profile, x, weight).ok_or_else(|| GraphError::NoLegalLowering {
                operator: self.name.clone(),
                reason: format!(
                    "profile `{}` has no matmul lowering for x {x} and weight {weight}",
                    profile.name
                ),
            })?;
        debug!(operator = %self.name, ?strategy, "selected linear lowering");
        match strategy {
            LinearStrategy::Natural => self.build_natural(),
            LinearStrategy::Packed => self.build_packed(weight.layout),
        }
    }
}
