//! Shared test support for kgraph: a recording kernel backend, pack fixtures
//! and a conformance suite for backend implementations.

pub mod conformance;
pub mod fixtures;
pub mod recording_backend;

pub use fixtures::{f32_desc, init_tracing, packed_desc, workspace, PackBuilder, WORKSPACE_BASE};
pub use recording_backend::{CompileRecord, LaunchRecord, RecordedKernel, RecordingBackend};
