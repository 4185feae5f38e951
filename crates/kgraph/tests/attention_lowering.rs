use std::sync::Arc;

use kgraph::kernel::{FusedAttentionParams, LayoutSupport};
use kgraph::ops::{AttentionOperation, AttentionParams, AttentionStrategy};
use kgraph::{
    ConfigError, GraphError, HardwareProfile, OpDescriptor, PrimitiveKind, Runner, RunnerError,
    VariantPack,
};
use kgraph_backend_tests::{f32_desc, init_tracing, workspace, PackBuilder, RecordingBackend};

fn attention(heads: usize, head_dim: usize) -> AttentionOperation {
    AttentionOperation::new(
        "attn",
        AttentionParams {
            heads,
            head_dim,
            scale: Some(0.25),
        },
    )
}

fn qkv_pack(dims: &[usize]) -> VariantPack {
    let desc = f32_desc(dims);
    PackBuilder::new()
        .input(desc.clone())
        .input(desc.clone())
        .input(desc.clone())
        .output(desc)
        .build()
}

fn decomposing_profile() -> HardwareProfile {
    HardwareProfile::datacenter().with(PrimitiveKind::FusedAttention, LayoutSupport::NONE)
}

#[test]
fn fused_lowering_finalizes_sequence_length() {
    init_tracing();
    let backend = Arc::new(RecordingBackend::new());
    let mut runner = Runner::new(
        attention(4, 16),
        Arc::clone(&backend),
        HardwareProfile::datacenter(),
    );
    runner.init().expect("init");
    runner.setup(&qkv_pack(&[2, 7, 64])).expect("setup");

    let compiles = backend.compiles();
    assert_eq!(compiles.len(), 1);
    assert_eq!(
        compiles[0].op,
        OpDescriptor::FusedAttention(FusedAttentionParams {
            heads: 4,
            head_dim: 16,
            scale: 0.25,
            seq_len: Some(7),
        })
    );
    assert_eq!(runner.get_workspace_size().expect("size"), 0);
    let scratch = &runner.active_plan().expect("plan").scratch;
    assert_eq!((scratch.batch, scratch.seq_len), (2, 7));
}

#[test]
fn decomposed_lowering_runs_every_step_in_order() {
    init_tracing();
    let backend = Arc::new(RecordingBackend::new());
    let mut runner = Runner::new(attention(4, 8), Arc::clone(&backend), decomposing_profile());
    runner.init().expect("init");
    let pack = qkv_pack(&[2, 6, 32]);
    runner.setup(&pack).expect("setup");
    let bytes = runner.get_workspace_size().expect("size");
    runner.execute(workspace(bytes), &pack).expect("execute");

    assert_eq!(
        backend.launch_order(),
        vec![
            "split_q",
            "split_k",
            "split_v",
            "scores",
            "scale",
            "softmax",
            "context",
            "merge_heads"
        ]
    );
    let launches = backend.launches();
    assert_eq!(launches[0].input_descs[0].dims(), &[2, 6, 4, 8]);
    assert_eq!(launches[3].input_descs[0].dims(), &[8, 6, 8]);
    assert_eq!(launches[7].input_descs[0].dims(), &[2, 4, 6, 8]);

    let compiles = backend.compiles();
    assert_eq!(compiles[3].outputs[0].dims(), &[8, 6, 6]);
    assert_eq!(compiles[6].outputs[0].dims(), &[8, 6, 8]);
}

#[test]
fn decomposed_workspace_reuses_score_buffers() {
    let mut runner = Runner::new(
        attention(4, 8),
        Arc::new(RecordingBackend::new()),
        decomposing_profile(),
    );
    runner.init().expect("init");
    runner.setup(&qkv_pack(&[2, 6, 32])).expect("setup");
    let layout = runner.workspace_layout().expect("layout");
    // Seven intermediates, never more than four alive at once.
    assert!(layout.total_bytes < layout.naive_bytes, "{layout:?}");
    let plan = runner.active_plan().expect("plan");
    assert_eq!(plan.internal_names.len(), 7);
}

#[test]
fn strategy_prefers_fused_when_available() {
    let q = f32_desc(&[1, 4, 8]);
    assert_eq!(
        AttentionStrategy::select(&HardwareProfile::datacenter(), &q),
        Some(AttentionStrategy::Fused)
    );
    assert_eq!(
        AttentionStrategy::select(&decomposing_profile(), &q),
        Some(AttentionStrategy::Decomposed)
    );
    assert_eq!(AttentionStrategy::select(&HardwareProfile::edge(), &q), None);
}

#[test]
fn edge_profile_has_no_attention_lowering() {
    let mut runner = Runner::new(
        attention(4, 8),
        Arc::new(RecordingBackend::new()),
        HardwareProfile::edge(),
    );
    runner.init().expect("init");
    let err = runner
        .setup(&qkv_pack(&[1, 4, 32]))
        .expect_err("edge lacks natural matmul and fused attention");
    assert!(
        matches!(err, RunnerError::Graph(GraphError::NoLegalLowering { .. })),
        "{err}"
    );
}

#[test]
fn hidden_size_mismatch_is_reported() {
    let mut fused = Runner::new(
        attention(4, 8),
        Arc::new(RecordingBackend::new()),
        HardwareProfile::datacenter(),
    );
    fused.init().expect("init");
    let err = fused
        .setup(&qkv_pack(&[1, 4, 48]))
        .expect_err("48 != 4 x 8");
    assert!(
        matches!(err, RunnerError::Graph(GraphError::ShapeInference { .. })),
        "{err}"
    );

    let mut decomposed = Runner::new(
        attention(4, 8),
        Arc::new(RecordingBackend::new()),
        decomposing_profile(),
    );
    decomposed.init().expect("init");
    let err = decomposed
        .setup(&qkv_pack(&[1, 4, 48]))
        .expect_err("48 != 4 x 8");
    match err {
        RunnerError::Graph(GraphError::ViewFailed { node, .. }) => {
            assert_eq!(node.name, "split_q")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn zero_heads_fail_init() {
    let mut runner = Runner::new(
        attention(0, 8),
        Arc::new(RecordingBackend::new()),
        HardwareProfile::datacenter(),
    );
    assert!(matches!(runner.init(), Err(RunnerError::Config(_))));
}

#[test]
fn overflowing_hidden_size_fails_init() {
    let mut runner = Runner::new(
        attention(usize::MAX / 2 + 1, 2),
        Arc::new(RecordingBackend::new()),
        HardwareProfile::datacenter(),
    );
    let err = runner.init().expect_err("heads x head_dim overflows");
    assert!(matches!(
        err,
        RunnerError::Config(ConfigError::InvalidParam { param: "heads", .. })
    ));
}
