//! Scalar element types understood by the kernel backends.

use serde::{Deserialize, Serialize};

/// Element type of a tensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum DType {
    /// 32-bit IEEE-754 float.
    F32,
    /// 16-bit IEEE-754 half precision.
    F16,
    /// bfloat16, the accumulation-friendly half type most accelerators prefer.
    BF16,
    /// Signed 8-bit integer, used for quantized weights.
    I8,
    /// Signed 32-bit integer, used for index tensors.
    I32,
}

impl DType {
    /// Number of bytes occupied by one element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 | DType::BF16 => 2,
            DType::I8 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::I8 => "i8",
            DType::I32 => "i32",
        }
    }
}
