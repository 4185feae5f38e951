use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, GraphError};
use crate::graph::{FinalizeCtx, FinalizeFn, GraphBuilder, KernelGraph, TensorRef, ViewFn};
use crate::kernel::{FusedAttentionParams, HardwareProfile, MatMulParams, OpDescriptor, PrimitiveKind};
use crate::tensor::{Dims, Layout, TensorDesc};

use super::{input_at, Operator};

/// Multi-head self attention over `q, k, v: [batch, seq, heads * head_dim]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttentionParams {
    pub heads: usize,
    pub head_dim: usize,
    /// Defaults to `1 / sqrt(head_dim)`.
    pub scale: Option<f32>,
}

impl AttentionParams {
    pub fn effective_scale(&self) -> f32 {
        self.scale
            .unwrap_or_else(|| 1.0 / (self.head_dim as f32).sqrt())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttentionStrategy {
    /// One fused kernel.
    Fused,
    /// Split heads, two batched matmuls around a softmax, merge heads.
    Decomposed,
}

impl AttentionStrategy {
    pub fn select(profile: &HardwareProfile, query: &TensorDesc) -> Option<AttentionStrategy> {
        if query.layout != Layout::Natural {
            return None;
        }
        if profile.supports(PrimitiveKind::FusedAttention, Layout::Natural) {
            return Some(AttentionStrategy::Fused);
        }
        let decomposable = [
            PrimitiveKind::Transpose,
            PrimitiveKind::MatMul,
            PrimitiveKind::Muls,
            PrimitiveKind::Softmax,
        ]
        .into_iter()
        .all(|kind| profile.supports(kind, Layout::Natural));
        decomposable.then_some(AttentionStrategy::Decomposed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttentionScratch {
    pub batch: usize,
    pub seq_len: usize,
}

#[derive(Debug, Clone)]
pub struct AttentionOperation {
    name: String,
    params: AttentionParams,
}

impl AttentionOperation {
    pub fn new(name: impl Into<String>, params: AttentionParams) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    fn build_fused(&self) -> Result<KernelGraph<AttentionScratch>, GraphError> {
        let mut graph = GraphBuilder::new(format!("{}/fused", self.name));
        let q = graph.input("q");
        let k = graph.input("k");
        let v = graph.input("v");
        let out = graph.output("out");
        let op = OpDescriptor::FusedAttention(FusedAttentionParams {
            heads: self.params.heads,
            head_dim: self.params.head_dim,
            scale: self.params.effective_scale(),
            seq_len: None,
        });
        graph
            .node("fused_attention", op)
            .input(q)
            .input(k)
            .input(v)
            .output(out)
            .finalize(FinalizeFn::new(
                |ctx: &mut FinalizeCtx<'_, AttentionScratch>| {
                    let dims = ctx.input_dims(0, 3)?;
                    let (batch, seq_len) = (dims[0], dims[1]);
                    ctx.scratch.batch = batch;
                    ctx.scratch.seq_len = seq_len;
                    let params = ctx
                        .op
                        .fused_attention_mut()
                        .ok_or("node lost its fused attention descriptor")?;
                    params.seq_len = Some(seq_len);
                    Ok(())
                },
            ))
            .push();
        graph.build()
    }

    fn build_decomposed(&self) -> Result<KernelGraph<AttentionScratch>, GraphError> {
        let AttentionParams {
            heads, head_dim, ..
        } = self.params;
        let mut graph = GraphBuilder::new(format!("{}/decomposed", self.name));
        let q = graph.input("q");
        let k = graph.input("k");
        let v = graph.input("v");
        let out = graph.output("out");

        // [b, s, h * d] -> [b, s, h, d] -> [b, h, s, d]
        let split_heads = move || {
            ViewFn::split_axis(2, head_dim).capturing(
                move |dims: &[usize], scratch: &mut AttentionScratch| {
                    let &[batch, seq_len, hidden] = dims else {
                        return Err(format!("expected [batch, seq, hidden], got {dims:?}"));
                    };
                    if heads.checked_mul(head_dim) != Some(hidden) {
                        return Err(format!(
                            "hidden size {hidden} != {heads} heads x {head_dim}"
                        ));
                    }
                    scratch.batch = batch;
                    scratch.seq_len = seq_len;
                    Ok(())
                },
            )
        };
        let mut heads_of = |source: TensorRef, label: &str| {
            let target = graph.internal(format!("{label}_heads"));
            graph
                .node(
                    format!("split_{label}"),
                    OpDescriptor::Transpose {
                        perm: vec![0, 2, 1, 3],
                    },
                )
                .input_view(source, split_heads())
                .output(target)
                .push();
            target
        };
        let q_heads = heads_of(q, "q");
        let k_heads = heads_of(k, "k");
        let v_heads = heads_of(v, "v");

        let scores = graph.internal("scores");
        graph
            .node("scores", OpDescriptor::MatMul(MatMulParams::new(false, true)))
            .input_view(q_heads, ViewFn::fold_leading(2))
            .input_view(k_heads, ViewFn::fold_leading(2))
            .output(scores)
            .finalize(FinalizeFn::matmul_from_inputs())
            .push();

        let scaled = graph.internal("scaled");
        graph
            .node(
                "scale",
                OpDescriptor::Muls {
                    scale: self.params.effective_scale(),
                },
            )
            .input(scores)
            .output(scaled)
            .push();

        let probs = graph.internal("probs");
        graph
            .node("softmax", OpDescriptor::Softmax { axis: -1 })
            .input(scaled)
            .output(probs)
            .push();

        let context = graph.internal("context");
        graph
            .node("context", OpDescriptor::MatMul(MatMulParams::new(false, false)))
            .input(probs)
            .input_view(v_heads, ViewFn::fold_leading(2))
            .output(context)
            .finalize(FinalizeFn::matmul_from_inputs())
            .push();

        // [b * h, s, d] -> [b, h, s, d] -> [b, s, h, d]
        let unfold_batch = ViewFn::new(|dims: &[usize], scratch: &mut AttentionScratch| {
            let batch = scratch.batch;
            match dims {
                [folded, rest @ ..] if batch > 0 && folded % batch == 0 => {
                    let mut out = Dims::new();
                    out.push(batch);
                    out.push(folded / batch);
                    out.extend_from_slice(rest);
                    Ok(out)
                }
                _ => Err(format!("cannot unfold batch {batch} from {dims:?}")),
            }
        });
        graph
            .node(
                "merge_heads",
                OpDescriptor::Transpose {
                    perm: vec![0, 2, 1, 3],
                },
            )
            .input_view(context, unfold_batch)
            .output(out)
            .push();
        graph.build()
    }
}

impl Operator for AttentionOperation {
    type Scratch = AttentionScratch;

    fn name(&self) -> &str {
        &self.name
    }

    fn input_count(&self) -> usize {
        3
    }

    fn output_count(&self) -> usize {
        1
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.params.heads == 0 {
            return Err(ConfigError::param(&self.name, "heads", "must be non-zero"));
        }
        if self.params.head_dim == 0 {
            return Err(ConfigError::param(&self.name, "head_dim", "must be non-zero"));
        }
        if self.params.heads.checked_mul(self.params.head_dim).is_none() {
            return Err(ConfigError::param(
                &self.name,
                "heads",
                format!(
                    "{} heads x {} overflows the hidden size",
                    self.params.heads, self.params.head_dim
                ),
            ));
        }
        if let Some(scale) = self.params.scale {
            if !scale.is_finite() || scale == 0.0 {
                return Err(ConfigError::param(
                    &self.name,
                    "scale",
                    format!("must be finite and non-zero, got {scale}"),
                ));
            }
        }
        Ok(())
    }

    fn build_graph(
        &self,
        profile: &HardwareProfile,
        inputs: &[TensorDesc],
    ) -> Result<KernelGraph<AttentionScratch>, GraphError> {
        let query = input_at(&self.name, inputs, 0)?;
        let strategy =
            AttentionStrategy::select(profile, query).ok_or_else(|| GraphError::NoLegalLowering {
                operator: self.name.clone(),
                reason: format!(
                    "profile `{}` offers neither fused nor decomposed attention for {query}",
                    profile.name
                ),
            })?;
        debug!(operator = %self.name, ?strategy, "selected attention lowering");
        match strategy {
            AttentionStrategy::Fused => self.build_fused(),
            AttentionStrategy::Decomposed => self.build_decomposed(),
        }
    }
}
