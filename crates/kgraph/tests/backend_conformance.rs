use std::sync::Arc;

use kgraph_backend_tests::RecordingBackend;

kgraph_backend_tests::define_backend_tests!(recording_backend, || Arc::new(
    RecordingBackend::new()
));

kgraph_backend_tests::define_backend_tests!(recording_backend_with_scratch, || Arc::new(
    RecordingBackend::new().with_scratch(kgraph::PrimitiveKind::MatMul, 4096)
));
