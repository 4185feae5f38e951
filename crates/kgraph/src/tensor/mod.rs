//! Tensor metadata shared by graphs, planners and backends.
//!
//! The engine never owns tensor storage. Descriptors travel through the graph
//! while [`DeviceBuffer`]s are borrowed from the caller (inputs and outputs) or
//! carved out of the planned workspace (internal tensors).

pub mod dtype;
pub mod layout;
pub mod shape;
mod value;

pub use dtype::DType;
pub use layout::{Layout, PACKED_TILE};
pub use shape::{Dims, Shape};
pub use value::{DeviceAddress, DeviceBuffer, TensorDesc, TensorValue, VariantPack};
