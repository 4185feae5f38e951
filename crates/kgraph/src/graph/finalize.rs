//! Late parameter derivation once a node's input shapes are resolved.

use std::fmt;
use std::sync::Arc;

use crate::kernel::{MatMulDims, OpDescriptor};
use crate::tensor::{Layout, TensorDesc};

/// What a finalize callback can see and change.
///
/// `inputs` are the node's resolved, post-view descriptors. The callback may
/// rewrite `op` and read or write the shared `scratch` context.
pub struct FinalizeCtx<'a, S> {
    pub node: &'a str,
    pub inputs: &'a [TensorDesc],
    pub op: &'a mut OpDescriptor,
    pub scratch: &'a mut S,
}

impl<'a, S> FinalizeCtx<'a, S> {
    pub fn input(&self, index: usize) -> Result<&'a TensorDesc, String> {
        self.inputs
            .get(index)
            .ok_or_else(|| format!("input {index} is missing"))
    }

    /// The dims of input `index`, which must have exactly `rank` axes.
    pub fn input_dims(&self, index: usize, rank: usize) -> Result<&'a [usize], String> {
        let desc = self.input(index)?;
        if desc.shape.rank() != rank {
            return Err(format!(
                "input {index} is {desc}, expected rank {rank}"
            ));
        }
        Ok(desc.dims())
    }

    /// Writes the GEMM extents onto a matmul descriptor.
    pub fn set_matmul_dims(&mut self, m: usize, k: usize, n: usize) -> Result<(), String> {
        let kind = self.op.kind();
        let params = self
            .op
            .matmul_mut()
            .ok_or_else(|| format!("{kind} is not a matmul"))?;
        params.dims = Some(MatMulDims { m, k, n });
        Ok(())
    }
}

type FinalizeBody<S> = dyn Fn(&mut FinalizeCtx<'_, S>) -> Result<(), String> + Send + Sync;

pub struct FinalizeFn<S>(Arc<FinalizeBody<S>>);

impl<S> Clone for FinalizeFn<S> {
    fn clone(&self) -> Self {
        FinalizeFn(Arc::clone(&self.0))
    }
}

impl<S> fmt::Debug for FinalizeFn<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FinalizeFn")
    }
}

impl<S: 'static> FinalizeFn<S> {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut FinalizeCtx<'_, S>) -> Result<(), String> + Send + Sync + 'static,
    {
        FinalizeFn(Arc::new(body))
    }

    pub fn call(&self, ctx: &mut FinalizeCtx<'_, S>) -> Result<(), String> {
        (self.0)(ctx)
    }

    /// Derives `m`, `k` and `n` from two natural operands, honouring the
    /// transpose flags already on the descriptor.
    pub fn matmul_from_inputs() -> Self {
        FinalizeFn::new(|ctx: &mut FinalizeCtx<'_, S>| {
            let (transpose_a, transpose_b) = match &*ctx.op {
                OpDescriptor::MatMul(params) => (params.transpose_a, params.transpose_b),
                other => return Err(format!("{} is not a matmul", other.kind())),
            };
            let lhs = ctx.input(0)?;
            let rhs = ctx.input(1)?;
            if lhs.layout != Layout::Natural || rhs.layout != Layout::Natural {
                return Err("packed operands hide their logical dims".to_string());
            }
            let (lhs_rows, lhs_cols) = trailing_matrix(lhs.dims())
                .ok_or_else(|| format!("lhs {lhs} has fewer than two axes"))?;
            let (rhs_rows, rhs_cols) = trailing_matrix(rhs.dims())
                .ok_or_else(|| format!("rhs {rhs} has fewer than two axes"))?;
            let (m, k) = if transpose_a {
                (lhs_cols, lhs_rows)
            } else {
                (lhs_rows, lhs_cols)
            };
            let (rhs_k, n) = if transpose_b {
                (rhs_cols, rhs_rows)
            } else {
                (rhs_rows, rhs_cols)
            };
            if k != rhs_k {
                return Err(format!(
                    "contraction sizes differ: lhs k={k}, rhs k={rhs_k}"
                ));
            }
            ctx.set_matmul_dims(m, k, n)
        })
    }
}

fn trailing_matrix(dims: &[usize]) -> Option<(usize, usize)> {
    match dims {
        [.., rows, cols] => Some((*rows, *cols)),
        _ => None,
    }
}
