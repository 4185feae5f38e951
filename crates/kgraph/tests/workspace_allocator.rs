mod common;

use kgraph::graph::TensorRef;
use kgraph::kernel::ElementwiseKind;
use kgraph::plan::{compute_liveness, plan_workspace, LiveInterval};
use kgraph::{GraphBuilder, HardwareProfile, OpDescriptor, Runner, RunnerOptions, VariantPack};
use kgraph_backend_tests::{f32_desc, init_tracing, PackBuilder, RecordingBackend};
use proptest::prelude::*;

use common::{recording, FnOperator};

fn scale() -> OpDescriptor {
    OpDescriptor::Muls { scale: 0.5 }
}

fn planned_runner(
    operator: FnOperator<()>,
    pack: &VariantPack,
) -> Runner<FnOperator<()>, RecordingBackend> {
    init_tracing();
    let mut runner = Runner::new(operator, recording(), HardwareProfile::datacenter());
    runner.init().expect("init");
    runner.setup(pack).expect("setup");
    runner
}

#[test]
fn single_node_without_internals_needs_no_workspace() {
    let operator = FnOperator::<()>::new("copy", 1, 1, |_, _| {
        let mut graph = GraphBuilder::new("copy");
        let x = graph.input("x");
        let y = graph.output("y");
        graph.node("scale", scale()).input(x).output(y).push();
        graph.build()
    });
    let pack = PackBuilder::new()
        .input(f32_desc(&[8, 16]))
        .output(f32_desc(&[8, 16]))
        .build();
    let runner = planned_runner(operator, &pack);
    assert_eq!(runner.get_workspace_size().expect("size"), 0);
}

#[test]
fn single_consumer_sets_death_index() {
    let operator = FnOperator::<()>::new("chain", 1, 1, |_, _| {
        let mut graph = GraphBuilder::new("chain");
        let x = graph.input("x");
        let y = graph.output("y");
        let t1 = graph.internal("t1");
        graph.node("a", scale()).input(x).output(t1).push();
        graph.node("b", scale()).input(t1).output(y).push();
        graph.build()
    });
    let pack = PackBuilder::new()
        .input(f32_desc(&[4, 4]))
        .output(f32_desc(&[4, 4]))
        .build();
    let runner = planned_runner(operator, &pack);
    let plan = runner.active_plan().expect("plan");
    assert_eq!(
        plan.liveness[0],
        Some(LiveInterval {
            producer: 0,
            death: 1
        })
    );
    assert_eq!(runner.get_workspace_size().expect("size"), 64);
}

#[test]
fn freed_ranges_are_reused_for_later_tensors() {
    let operator = FnOperator::<()>::new("reuse", 1, 2, |_, _| {
        let mut graph = GraphBuilder::new("reuse");
        let x = graph.input("x");
        let sum = graph.output("sum");
        let out = graph.output("out");
        let t1 = graph.internal("t1");
        let t2 = graph.internal("t2");
        let t3 = graph.internal("t3");
        graph.node("n0", scale()).input(x).output(t1).push();
        graph.node("n1", scale()).input(x).output(t2).push();
        graph
            .node("n2", OpDescriptor::Elementwise(ElementwiseKind::Add))
            .input(t1)
            .input(t2)
            .output(sum)
            .push();
        graph.node("n3", scale()).input(sum).output(t3).push();
        graph.node("n4", scale()).input(t3).output(out).push();
        graph.build()
    });
    let pack = PackBuilder::new()
        .input(f32_desc(&[4, 4]))
        .output(f32_desc(&[4, 4]))
        .output(f32_desc(&[4, 4]))
        .build();
    let runner = planned_runner(operator, &pack);
    let layout = runner.workspace_layout().expect("layout");
    assert_eq!(layout.total_bytes, 128);
    assert_eq!(layout.naive_bytes, 192);
    let t3 = layout.slot(2).expect("t3 slot");
    assert!(t3.offset < 128);
    assert_eq!(t3.offset, 0, "best fit picks the lowest offset of the merged range");
}

#[test]
fn alignment_option_rounds_slots() {
    let operator = FnOperator::<()>::new("chain", 1, 1, |_, _| {
        let mut graph = GraphBuilder::new("chain");
        let x = graph.input("x");
        let y = graph.output("y");
        let t1 = graph.internal("t1");
        graph.node("a", scale()).input(x).output(t1).push();
        graph.node("b", scale()).input(t1).output(y).push();
        graph.build()
    });
    let pack = PackBuilder::new()
        .input(f32_desc(&[3, 3]))
        .output(f32_desc(&[3, 3]))
        .build();
    let mut runner = Runner::new(operator, recording(), HardwareProfile::datacenter())
        .with_options(RunnerOptions::default().with_workspace_alignment(256));
    runner.init().expect("init");
    runner.setup(&pack).expect("setup");
    assert_eq!(runner.get_workspace_size().expect("size"), 256);
}

#[test]
fn liveness_from_node_io_matches_solver_input() {
    let nodes = vec![
        (vec![TensorRef::Input(0)], vec![TensorRef::Internal(0)]),
        (vec![TensorRef::Internal(0)], vec![TensorRef::Internal(1)]),
        (vec![TensorRef::Internal(1)], vec![TensorRef::Internal(2)]),
        (vec![TensorRef::Internal(2)], vec![TensorRef::Output(0)]),
    ];
    let liveness = compute_liveness(3, nodes.iter().map(|(i, o)| (i.as_slice(), o.as_slice())));
    let layout = plan_workspace(&[128, 64, 128], &liveness, nodes.len(), 64).expect("layout");
    // Neighbours overlap, internal#0 and internal#2 do not.
    assert!(!layout
        .slot(0)
        .expect("slot 0")
        .overlaps(&layout.slot(1).expect("slot 1")));
    assert!(!layout
        .slot(1)
        .expect("slot 1")
        .overlaps(&layout.slot(2).expect("slot 2")));
    assert_eq!(layout.total_bytes, 192);
}

fn arb_intervals() -> impl Strategy<Value = (usize, Vec<(usize, usize, usize)>)> {
    (1usize..12).prop_flat_map(|nodes| {
        let tensor = (0..nodes, 0usize..4096).prop_flat_map(move |(producer, bytes)| {
            (Just(producer), producer..nodes, Just(bytes))
        });
        (Just(nodes), prop::collection::vec(tensor, 0..16))
    })
}

fn split(tensors: &[(usize, usize, usize)]) -> (Vec<usize>, Vec<Option<LiveInterval>>) {
    let sizes = tensors.iter().map(|&(_, _, bytes)| bytes).collect();
    let liveness = tensors
        .iter()
        .map(|&(producer, death, _)| Some(LiveInterval { producer, death }))
        .collect();
    (sizes, liveness)
}

proptest! {
    #[test]
    fn live_tensors_never_share_bytes((nodes, tensors) in arb_intervals()) {
        let (sizes, liveness) = split(&tensors);
        let layout = plan_workspace(&sizes, &liveness, nodes, 64).expect("layout");
        for a in 0..tensors.len() {
            for b in (a + 1)..tensors.len() {
                let (Some(live_a), Some(live_b)) = (liveness[a], liveness[b]) else { continue };
                if !live_a.overlaps(&live_b) {
                    continue;
                }
                if let (Some(slot_a), Some(slot_b)) = (layout.slot(a), layout.slot(b)) {
                    prop_assert!(!slot_a.overlaps(&slot_b), "{a} {slot_a:?} vs {b} {slot_b:?}");
                }
            }
        }
        for slot in layout.slots.iter().flatten() {
            prop_assert!(slot.end() <= layout.tensor_bytes);
            prop_assert_eq!(slot.offset % 64, 0);
        }
    }

    #[test]
    fn solver_is_deterministic((nodes, tensors) in arb_intervals()) {
        let (sizes, liveness) = split(&tensors);
        let first = plan_workspace(&sizes, &liveness, nodes, 64).expect("layout");
        let second = plan_workspace(&sizes, &liveness, nodes, 64).expect("layout");
        prop_assert_eq!(first, second);
    }

    #[test]
    fn total_never_exceeds_naive_sum((nodes, tensors) in arb_intervals()) {
        let (sizes, liveness) = split(&tensors);
        let layout = plan_workspace(&sizes, &liveness, nodes, 64).expect("layout");
        let naive: usize = sizes.iter().map(|bytes| bytes.div_ceil(64) * 64).sum();
        prop_assert!(layout.total_bytes <= naive);
        prop_assert_eq!(layout.naive_bytes, naive);
    }

    #[test]
    fn disjoint_lifetimes_collapse_to_largest_tensor(sizes in prop::collection::vec(1usize..4096, 1..10)) {
        // One tensor per node, each dead before the next is produced.
        let liveness: Vec<_> = (0..sizes.len())
            .map(|node| Some(LiveInterval { producer: node, death: node }))
            .collect();
        let layout = plan_workspace(&sizes, &liveness, sizes.len(), 64).expect("layout");
        let largest = sizes.iter().map(|bytes| bytes.div_ceil(64) * 64).max().unwrap_or(0);
        prop_assert_eq!(layout.total_bytes, largest);
    }
}
