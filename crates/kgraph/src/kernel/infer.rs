//! Output-shape inference for the bundled primitives.
//!
//! Inference runs on resolved inputs, after views and finalize callbacks, so
//! every runtime-dependent parameter must already be set on the descriptor.

use crate::tensor::layout::{batch_prefix, packed_dims, unpacked_dims};
use crate::tensor::shape::{normalize_axis, Dims};
use crate::tensor::{Layout, Shape, TensorDesc};

use super::{FusedAttentionParams, MatMulParams, OpDescriptor, TransDataParams};

impl OpDescriptor {
    /// Descriptors of the tensors this primitive produces for `inputs`.
    pub fn infer_outputs(&self, inputs: &[TensorDesc]) -> Result<Vec<TensorDesc>, String> {
        if inputs.len() != self.input_arity() {
            return Err(format!(
                "{} expects {} inputs, got {}",
                self.kind(),
                self.input_arity(),
                inputs.len()
            ));
        }
        let output = match self {
            OpDescriptor::TransData(params) => infer_trans_data(params, &inputs[0])?,
            OpDescriptor::MatMul(params) => infer_matmul(params, &inputs[0], &inputs[1])?,
            OpDescriptor::Elementwise(_) => infer_broadcast_binary(&inputs[0], &inputs[1])?,
            OpDescriptor::Muls { .. } => inputs[0].clone(),
            OpDescriptor::RmsNorm { .. } => infer_norm(&inputs[0], &inputs[1..])?,
            OpDescriptor::LayerNorm { .. } => infer_norm(&inputs[0], &inputs[1..])?,
            OpDescriptor::Softmax { axis } => {
                normalize_axis(*axis, inputs[0].shape.rank())
                    .ok_or_else(|| format!("softmax axis {axis} out of range for {}", inputs[0]))?;
                inputs[0].clone()
            }
            OpDescriptor::Transpose { perm } => infer_transpose(perm, &inputs[0])?,
            OpDescriptor::FusedAttention(params) => infer_attention(params, inputs)?,
        };
        Ok(vec![output])
    }
}

fn infer_trans_data(params: &TransDataParams, input: &TensorDesc) -> Result<TensorDesc, String> {
    if input.layout == params.target {
        return Err(format!(
            "input {input} is already in {} layout",
            params.target.as_str()
        ));
    }
    let dims = match params.target {
        Layout::Packed => packed_dims(input.dims()).ok_or_else(|| {
            format!("cannot pack {input}: rank below two or padded size overflows")
        })?,
        Layout::Natural => {
            let crops = params
                .crops
                .ok_or("unpack crops were not finalized")?;
            unpacked_dims(input.dims(), crops).ok_or_else(|| {
                format!("crops {crops:?} are inconsistent with packed dims {}", input.shape)
            })?
        }
    };
    Ok(TensorDesc::new(input.dtype, Shape::new(dims), params.target))
}

fn check_matrix(desc: &TensorDesc, rows: usize, cols: usize, which: &str) -> Result<(), String> {
    let dims = desc.dims();
    let matches = match desc.layout {
        Layout::Natural => {
            dims.len() >= 2 && dims[dims.len() - 2] == rows && dims[dims.len() - 1] == cols
        }
        Layout::Packed => match packed_dims(&[rows, cols]) {
            Some(expected) => dims.len() >= 3 && dims[dims.len() - 3..] == expected[..],
            None => false,
        },
    };
    if matches {
        Ok(())
    } else {
        Err(format!(
            "{which} operand {desc} does not hold a {rows}x{cols} matrix"
        ))
    }
}

fn infer_matmul(
    params: &MatMulParams,
    lhs: &TensorDesc,
    rhs: &TensorDesc,
) -> Result<TensorDesc, String> {
    let dims = params.dims.ok_or("matmul dims (m, k, n) were not finalized")?;
    if lhs.layout != rhs.layout {
        return Err(format!("operands mix layouts: {lhs} and {rhs}"));
    }
    if lhs.dtype != rhs.dtype {
        return Err(format!("operands mix dtypes: {lhs} and {rhs}"));
    }
    let (lhs_rows, lhs_cols) = if params.transpose_a {
        (dims.k, dims.m)
    } else {
        (dims.m, dims.k)
    };
    let (rhs_rows, rhs_cols) = if params.transpose_b {
        (dims.n, dims.k)
    } else {
        (dims.k, dims.n)
    };
    check_matrix(lhs, lhs_rows, lhs_cols, "lhs")?;
    check_matrix(rhs, rhs_rows, rhs_cols, "rhs")?;

    let lhs_batch = batch_prefix(lhs.dims(), lhs.layout);
    let rhs_batch = batch_prefix(rhs.dims(), rhs.layout);
    if !rhs_batch.is_empty() && rhs_batch != lhs_batch {
        return Err(format!(
            "batch dims differ: {lhs_batch:?} vs {rhs_batch:?}"
        ));
    }
    let mut logical: Dims = lhs_batch.iter().copied().collect();
    logical.push(dims.m);
    logical.push(dims.n);
    let out_dims = match lhs.layout {
        Layout::Natural => logical,
        Layout::Packed => packed_dims(&logical).ok_or("cannot pack matmul output")?,
    };
    Ok(TensorDesc::new(lhs.dtype, Shape::new(out_dims), lhs.layout))
}

fn infer_broadcast_binary(lhs: &TensorDesc, rhs: &TensorDesc) -> Result<TensorDesc, String> {
    if lhs.dtype != rhs.dtype || lhs.layout != rhs.layout {
        return Err(format!("operands disagree: {lhs} and {rhs}"));
    }
    let (lhs_dims, rhs_dims) = (lhs.dims(), rhs.dims());
    if rhs_dims.len() > lhs_dims.len() || !lhs_dims.ends_with(rhs_dims) {
        return Err(format!("{rhs} does not broadcast onto {lhs}"));
    }
    Ok(lhs.clone())
}

fn infer_norm(input: &TensorDesc, affine: &[TensorDesc]) -> Result<TensorDesc, String> {
    if input.layout != Layout::Natural {
        return Err(format!("normalization needs a natural input, got {input}"));
    }
    let hidden = input.shape.last().ok_or("normalization input is a scalar")?;
    for param in affine {
        if param.dims() != [hidden] {
            return Err(format!(
                "affine parameter {param} does not match hidden size {hidden}"
            ));
        }
    }
    Ok(input.clone())
}

fn infer_transpose(perm: &[usize], input: &TensorDesc) -> Result<TensorDesc, String> {
    let dims = input.dims();
    if input.layout != Layout::Natural {
        return Err(format!("transpose needs a natural input, got {input}"));
    }
    let mut seen = vec![false; dims.len()];
    if perm.len() != dims.len() {
        return Err(format!("permutation {perm:?} does not match rank of {input}"));
    }
    for &axis in perm {
        match seen.get_mut(axis) {
            Some(slot) if !*slot => *slot = true,
            _ => return Err(format!("{perm:?} is not a permutation")),
        }
    }
    let out: Dims = perm.iter().map(|&axis| dims[axis]).collect();
    Ok(input.with_shape(Shape::new(out)))
}

fn infer_attention(
    params: &FusedAttentionParams,
    inputs: &[TensorDesc],
) -> Result<TensorDesc, String> {
    let query = &inputs[0];
    if inputs.iter().any(|desc| desc != query) {
        return Err("query, key and value descriptors differ".to_string());
    }
    let &[_, seq, hidden] = query.dims() else {
        return Err(format!("attention expects [batch, seq, hidden], got {query}"));
    };
    if params.heads.checked_mul(params.head_dim) != Some(hidden) {
        return Err(format!(
            "hidden size {hidden} != {} heads x {}",
            params.heads, params.head_dim
        ));
    }
    match params.seq_len {
        Some(len) if len == seq => Ok(query.clone()),
        Some(len) => Err(format!("finalized seq_len {len} but query has {seq}")),
        None => Err("seq_len was not finalized".to_string()),
    }
}
