mod common;

use kgraph::graph::{FinalizeCtx, FinalizeFn};
use kgraph::{GraphBuilder, GraphError, HardwareProfile, OpDescriptor, Runner, RunnerError, ViewFn};
use kgraph_backend_tests::{f32_desc, init_tracing, PackBuilder};

use common::{recording, FnOperator};

#[derive(Debug, Default)]
struct Seen {
    captured: Vec<usize>,
    finalized: Vec<Vec<usize>>,
}

fn record_input() -> FinalizeFn<Seen> {
    FinalizeFn::new(|ctx: &mut FinalizeCtx<'_, Seen>| {
        let dims = ctx.input(0)?.dims().to_vec();
        ctx.scratch.finalized.push(dims);
        Ok(())
    })
}

fn single_view_operator(view: fn() -> ViewFn<Seen>) -> FnOperator<Seen> {
    FnOperator::new("viewed", 1, 1, move |_, _| {
        let mut graph = GraphBuilder::new("viewed");
        let x = graph.input("x");
        let y = graph.output("y");
        graph
            .node("scale", OpDescriptor::Muls { scale: 2.0 })
            .input_view(x, view())
            .output(y)
            .finalize(record_input())
            .push();
        graph.build()
    })
}

#[test]
fn finalize_observes_folded_dims() {
    init_tracing();
    let operator = single_view_operator(|| {
        ViewFn::fold_leading(2).capturing(|dims: &[usize], seen: &mut Seen| {
            seen.captured = dims.to_vec();
            Ok(())
        })
    });
    let pack = PackBuilder::new()
        .input(f32_desc(&[2, 3, 4]))
        .output(f32_desc(&[6, 4]))
        .build();
    let mut runner = Runner::new(operator, recording(), HardwareProfile::datacenter());
    runner.init().expect("init");
    runner.setup(&pack).expect("setup");

    let scratch = &runner.active_plan().expect("plan").scratch;
    assert_eq!(scratch.captured, vec![2, 3, 4]);
    assert_eq!(scratch.finalized, vec![vec![6, 4]]);
}

#[test]
fn later_finalize_reads_state_left_by_earlier_nodes() {
    let operator = FnOperator::<Seen>::new("two", 1, 1, |_, _| {
        let mut graph = GraphBuilder::new("two");
        let x = graph.input("x");
        let y = graph.output("y");
        let mid = graph.internal("mid");
        let capture = ViewFn::fold_to_matrix().capturing(|dims: &[usize], seen: &mut Seen| {
            seen.captured = dims.to_vec();
            Ok(())
        });
        graph
            .node("first", OpDescriptor::Muls { scale: 1.0 })
            .input_view(x, capture)
            .output(mid)
            .finalize(record_input())
            .push();
        let restore = ViewFn::new(|_: &[usize], seen: &mut Seen| Ok(seen.captured.iter().copied().collect()));
        graph
            .node("second", OpDescriptor::Muls { scale: 1.0 })
            .input_view(mid, restore)
            .output(y)
            .finalize(record_input())
            .push();
        graph.build()
    });
    let pack = PackBuilder::new()
        .input(f32_desc(&[2, 5, 8]))
        .output(f32_desc(&[2, 5, 8]))
        .build();
    let mut runner = Runner::new(operator, recording(), HardwareProfile::datacenter());
    runner.init().expect("init");
    runner.setup(&pack).expect("setup");

    let scratch = &runner.active_plan().expect("plan").scratch;
    assert_eq!(scratch.finalized, vec![vec![10, 8], vec![2, 5, 8]]);
}

#[test]
fn uneven_split_fails_setup_with_node_context() {
    let operator = single_view_operator(|| ViewFn::split_axis(1, 5));
    let pack = PackBuilder::new()
        .input(f32_desc(&[2, 12]))
        .output(f32_desc(&[2, 12]))
        .build();
    let mut runner = Runner::new(operator, recording(), HardwareProfile::datacenter());
    runner.init().expect("init");
    let err = runner.setup(&pack).expect_err("split by 5 cannot work");
    match err {
        RunnerError::Graph(GraphError::ViewFailed { node, input, .. }) => {
            assert_eq!(node.name, "scale");
            assert_eq!(input, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn element_count_change_is_rejected() {
    let operator = single_view_operator(|| ViewFn::reshape([5, 5]));
    let pack = PackBuilder::new()
        .input(f32_desc(&[4, 6]))
        .output(f32_desc(&[4, 6]))
        .build();
    let mut runner = Runner::new(operator, recording(), HardwareProfile::datacenter());
    runner.init().expect("init");
    let err = runner.setup(&pack).expect_err("24 elements cannot become 25");
    assert!(
        matches!(err, RunnerError::Graph(GraphError::ViewElementMismatch { .. })),
        "{err}"
    );
    assert!(err.to_string().contains("[4, 6] -> [5, 5]"), "{err}");
}

#[test]
fn fold_and_split_round_trip() {
    let view = ViewFn::<()>::fold_leading(2).then(ViewFn::split_axis(0, 3));
    let out = view.apply(&[2, 3, 4], &mut ()).expect("view");
    assert_eq!(out.as_slice(), &[2, 3, 4]);
}
