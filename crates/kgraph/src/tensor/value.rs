//! Tensor descriptors and the device buffers bound to them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::dtype::DType;
use super::layout::Layout;
use super::shape::Shape;

/// Shape, element type and layout of one tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
    pub layout: Layout,
}

impl TensorDesc {
    pub fn new(dtype: DType, shape: impl Into<Shape>, layout: Layout) -> Self {
        Self {
            dtype,
            shape: shape.into(),
            layout,
        }
    }

    /// Row-major descriptor, the common case for activations.
    pub fn natural(dtype: DType, dims: impl Into<Shape>) -> Self {
        Self::new(dtype, dims, Layout::Natural)
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Bytes needed to hold the tensor, `None` on overflow.
    ///
    /// Packed dims already include tile padding so both layouts use the same formula.
    pub fn storage_bytes(&self) -> Option<usize> {
        self.shape
            .checked_num_elements()?
            .checked_mul(self.dtype.size_in_bytes())
    }

    pub fn with_shape(&self, shape: impl Into<Shape>) -> Self {
        Self {
            dtype: self.dtype,
            shape: shape.into(),
            layout: self.layout,
        }
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{} ({})", self.dtype, self.shape, self.layout.as_str())
    }
}

/// Opaque device address handed out by the kernel backend's allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress(pub u64);

impl DeviceAddress {
    /// `None` when the result would leave the 64-bit address space.
    pub fn offset(self, bytes: usize) -> Option<DeviceAddress> {
        let bytes = u64::try_from(bytes).ok()?;
        self.0.checked_add(bytes).map(DeviceAddress)
    }
}

/// A contiguous device allocation the engine borrows but never owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBuffer {
    pub addr: DeviceAddress,
    pub len: usize,
}

impl DeviceBuffer {
    pub fn new(addr: u64, len: usize) -> Self {
        Self {
            addr: DeviceAddress(addr),
            len,
        }
    }

    /// Zero-length buffer, valid for operators that need no workspace.
    pub fn empty() -> Self {
        Self::new(0, 0)
    }
}

/// A caller-owned tensor bound for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorValue {
    pub desc: TensorDesc,
    pub buffer: DeviceBuffer,
}

impl TensorValue {
    pub fn new(desc: TensorDesc, buffer: DeviceBuffer) -> Self {
        Self { desc, buffer }
    }
}

/// Concrete inputs and outputs bound to an operator's declared tensor slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantPack {
    pub inputs: Vec<TensorValue>,
    pub outputs: Vec<TensorValue>,
}

impl VariantPack {
    pub fn new(inputs: Vec<TensorValue>, outputs: Vec<TensorValue>) -> Self {
        Self { inputs, outputs }
    }

    pub fn input_descs(&self) -> Vec<TensorDesc> {
        self.inputs.iter().map(|value| value.desc.clone()).collect()
    }

    pub fn output_descs(&self) -> Vec<TensorDesc> {
        self.outputs.iter().map(|value| value.desc.clone()).collect()
    }
}
