//! Error taxonomy for init, setup and execute.
//!
//! Each failure category maps onto one type so callers can tell a bad operator
//! configuration from an illegal lowering, a finalize failure or a backend
//! rejection. Everything that involves a node carries its [`NodeLabel`].

use std::fmt;

use thiserror::Error;

use crate::graph::TensorRef;
use crate::kernel::PrimitiveKind;
use crate::runner::RunnerState;
use crate::tensor::{Layout, Shape, TensorDesc};

/// Identifies a node by position and builder-assigned name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabel {
    pub index: usize,
    pub name: String,
}

impl NodeLabel {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node #{} `{}`", self.index, self.name)
    }
}

/// Static operator parameters or runner options that contradict each other.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{operator}: invalid parameter `{param}`: {reason}")]
    InvalidParam {
        operator: String,
        param: &'static str,
        reason: String,
    },
    #[error("invalid runner option `{option}`: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub fn param(operator: &str, param: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParam {
            operator: operator.to_string(),
            param,
            reason: reason.into(),
        }
    }
}

/// Graph construction and legalization failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("{node} references unknown tensor {tensor}")]
    UnknownTensor { node: NodeLabel, tensor: TensorRef },
    #[error("{node} writes graph input {tensor}")]
    WritesInput { node: NodeLabel, tensor: TensorRef },
    #[error("{tensor} is produced by both {first} and {second}")]
    MultipleProducers {
        tensor: TensorRef,
        first: NodeLabel,
        second: NodeLabel,
    },
    #[error("{node} reads {tensor} before any node produces it")]
    ReadBeforeWrite { node: NodeLabel, tensor: TensorRef },
    #[error("{tensor} `{name}` is declared but never produced")]
    NeverProduced { tensor: TensorRef, name: String },
    #[error("{node}: {kind} takes {expected} inputs but the node wires {actual}")]
    OperandCount {
        node: NodeLabel,
        kind: PrimitiveKind,
        expected: usize,
        actual: usize,
    },
    #[error("{node} has {views} view slots for {inputs} inputs")]
    ViewSlotMismatch {
        node: NodeLabel,
        views: usize,
        inputs: usize,
    },
    #[error("{node} input {input}: view failed: {reason}")]
    ViewFailed {
        node: NodeLabel,
        input: usize,
        reason: String,
    },
    #[error("{node} input {input}: view changes element count ({before} -> {after})")]
    ViewElementMismatch {
        node: NodeLabel,
        input: usize,
        before: Shape,
        after: Shape,
    },
    #[error("{node}: cannot infer output shape: {reason}")]
    ShapeInference { node: NodeLabel, reason: String },
    #[error("{node} produces {inferred} for {tensor} but the caller bound {bound}")]
    OutputMismatch {
        node: NodeLabel,
        tensor: TensorRef,
        inferred: TensorDesc,
        bound: TensorDesc,
    },
    #[error("{node}: {kind} does not accept {} inputs on `{profile}`", .layout.as_str())]
    UnsupportedLayout {
        node: NodeLabel,
        kind: PrimitiveKind,
        layout: Layout,
        profile: String,
    },
    #[error("{operator}: no legal lowering: {reason}")]
    NoLegalLowering { operator: String, reason: String },
    #[error("{what}: expected {expected}, got {actual}")]
    Arity {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("byte size of {tensor} overflows")]
    SizeOverflow { tensor: TensorRef },
}

/// A shape-finalization callback could not derive its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{node}: shape finalization failed: {reason}")]
pub struct FinalizeError {
    pub node: NodeLabel,
    pub reason: String,
}

/// Errors surfaced by the external kernel backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{op} is not supported: {reason}")]
    Unsupported { op: PrimitiveKind, reason: String },
    #[error("backend resources exhausted: {message}")]
    ResourceExhausted { message: String },
    #[error("backend execution failure: {message}")]
    Execution { message: String },
}

impl BackendError {
    pub fn unsupported(op: PrimitiveKind, reason: impl Into<String>) -> Self {
        BackendError::Unsupported {
            op,
            reason: reason.into(),
        }
    }

    pub fn exhausted(message: impl Into<String>) -> Self {
        BackendError::ResourceExhausted {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Umbrella error returned by the runner lifecycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error("{node}: kernel compilation failed: {source}")]
    Compile {
        node: NodeLabel,
        #[source]
        source: BackendError,
    },
    #[error("{node}: kernel launch failed: {source}")]
    Launch {
        node: NodeLabel,
        #[source]
        source: BackendError,
    },
    #[error("`{op}` is not valid in state {state:?}")]
    InvalidState { op: &'static str, state: RunnerState },
    #[error("variant pack does not match the planned signature: {detail}")]
    SignatureMismatch { detail: String },
    #[error("{what}: expected {expected}, got {actual}")]
    Arity {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{what} at {base:#x} + {bytes} bytes overflows the address space")]
    AddressOverflow {
        what: String,
        base: u64,
        bytes: usize,
    },
    #[error("{what} holds {actual} bytes but {required} are required")]
    BufferTooSmall {
        what: String,
        required: usize,
        actual: usize,
    },
}

pub type RunnerResult<T> = Result<T, RunnerError>;
