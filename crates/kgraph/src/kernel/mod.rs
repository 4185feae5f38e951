//! Primitive kernel descriptors.
//!
//! Every node carries an [`OpDescriptor`]: the primitive it dispatches plus its
//! static parameters. Parameters that depend on runtime shapes start out unset
//! and are filled in by the node's finalize callback during setup.

mod backend;
mod capability;
mod infer;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::Layout;

pub use backend::{BoundTensor, CompiledKernel, KernelBackend, KernelRequest, LaunchArgs};
pub use capability::{CapabilityTable, HardwareProfile, LayoutSupport};

/// Fieldless tag of an [`OpDescriptor`], used for capability lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimitiveKind {
    TransData,
    MatMul,
    Add,
    Mul,
    Muls,
    RmsNorm,
    LayerNorm,
    Softmax,
    Transpose,
    FusedAttention,
}

impl PrimitiveKind {
    pub const COUNT: usize = 10;

    pub const ALL: [PrimitiveKind; Self::COUNT] = [
        PrimitiveKind::TransData,
        PrimitiveKind::MatMul,
        PrimitiveKind::Add,
        PrimitiveKind::Mul,
        PrimitiveKind::Muls,
        PrimitiveKind::RmsNorm,
        PrimitiveKind::LayerNorm,
        PrimitiveKind::Softmax,
        PrimitiveKind::Transpose,
        PrimitiveKind::FusedAttention,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::TransData => "trans_data",
            PrimitiveKind::MatMul => "matmul",
            PrimitiveKind::Add => "add",
            PrimitiveKind::Mul => "mul",
            PrimitiveKind::Muls => "muls",
            PrimitiveKind::RmsNorm => "rms_norm",
            PrimitiveKind::LayerNorm => "layer_norm",
            PrimitiveKind::Softmax => "softmax",
            PrimitiveKind::Transpose => "transpose",
            PrimitiveKind::FusedAttention => "fused_attention",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Layout conversion between natural and packed storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransDataParams {
    pub target: Layout,
    /// Logical `[rows, cols]` to crop to when unpacking. Set during finalize.
    pub crops: Option<[usize; 2]>,
}

impl TransDataParams {
    pub fn to(target: Layout) -> Self {
        Self {
            target,
            crops: None,
        }
    }
}

/// The three GEMM extents, known only once runtime shapes are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatMulDims {
    pub m: usize,
    pub k: usize,
    pub n: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatMulParams {
    pub transpose_a: bool,
    pub transpose_b: bool,
    pub dims: Option<MatMulDims>,
}

impl MatMulParams {
    pub fn new(transpose_a: bool, transpose_b: bool) -> Self {
        Self {
            transpose_a,
            transpose_b,
            dims: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementwiseKind {
    Add,
    Mul,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusedAttentionParams {
    pub heads: usize,
    pub head_dim: usize,
    pub scale: f32,
    /// Sequence length of the current dispatch. Set during finalize.
    pub seq_len: Option<usize>,
}

/// One primitive operation and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpDescriptor {
    TransData(TransDataParams),
    MatMul(MatMulParams),
    Elementwise(ElementwiseKind),
    /// Multiply by a scalar.
    Muls { scale: f32 },
    RmsNorm { epsilon: f32 },
    LayerNorm { epsilon: f32 },
    Softmax { axis: isize },
    Transpose { perm: Vec<usize> },
    FusedAttention(FusedAttentionParams),
}

impl OpDescriptor {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            OpDescriptor::TransData(_) => PrimitiveKind::TransData,
            OpDescriptor::MatMul(_) => PrimitiveKind::MatMul,
            OpDescriptor::Elementwise(ElementwiseKind::Add) => PrimitiveKind::Add,
            OpDescriptor::Elementwise(ElementwiseKind::Mul) => PrimitiveKind::Mul,
            OpDescriptor::Muls { .. } => PrimitiveKind::Muls,
            OpDescriptor::RmsNorm { .. } => PrimitiveKind::RmsNorm,
            OpDescriptor::LayerNorm { .. } => PrimitiveKind::LayerNorm,
            OpDescriptor::Softmax { .. } => PrimitiveKind::Softmax,
            OpDescriptor::Transpose { .. } => PrimitiveKind::Transpose,
            OpDescriptor::FusedAttention(_) => PrimitiveKind::FusedAttention,
        }
    }

    /// Number of input tensors the primitive consumes.
    pub fn input_arity(&self) -> usize {
        match self {
            OpDescriptor::TransData(_)
            | OpDescriptor::Muls { .. }
            | OpDescriptor::Softmax { .. }
            | OpDescriptor::Transpose { .. } => 1,
            OpDescriptor::MatMul(_) | OpDescriptor::Elementwise(_) | OpDescriptor::RmsNorm { .. } => {
                2
            }
            OpDescriptor::LayerNorm { .. } | OpDescriptor::FusedAttention(_) => 3,
        }
    }

    pub fn matmul_mut(&mut self) -> Option<&mut MatMulParams> {
        match self {
            OpDescriptor::MatMul(params) => Some(params),
            _ => None,
        }
    }

    pub fn trans_data_mut(&mut self) -> Option<&mut TransDataParams> {
        match self {
            OpDescriptor::TransData(params) => Some(params),
            _ => None,
        }
    }

    pub fn fused_attention_mut(&mut self) -> Option<&mut FusedAttentionParams> {
        match self {
            OpDescriptor::FusedAttention(params) => Some(params),
            _ => None,
        }
    }
}
