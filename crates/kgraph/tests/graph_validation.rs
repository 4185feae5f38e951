use kgraph::kernel::{ElementwiseKind, MatMulParams};
use kgraph::{GraphBuilder, GraphError, KernelGraph, OpDescriptor, TensorRef, ViewFn};

fn scale() -> OpDescriptor {
    OpDescriptor::Muls { scale: 1.0 }
}

fn build(wire: impl FnOnce(&mut GraphBuilder<()>)) -> Result<KernelGraph<()>, GraphError> {
    let mut graph = GraphBuilder::new("test");
    wire(&mut graph);
    graph.build()
}

#[test]
fn well_formed_graph_builds() {
    let graph = build(|g| {
        let x = g.input("x");
        let y = g.output("y");
        let t = g.internal("t");
        g.node("a", scale()).input(x).output(t).push();
        g.node("b", scale()).input(t).output(y).push();
    })
    .expect("valid graph");
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.tensor_name(TensorRef::Internal(0)), Some("t"));
    assert!(graph.nodes[0].views.is_empty());
}

#[test]
fn reading_before_production_is_rejected() {
    let err = build(|g| {
        let x = g.input("x");
        let y = g.output("y");
        let t = g.internal("t");
        g.node("early", scale()).input(t).output(y).push();
        g.node("late", scale()).input(x).output(t).push();
    })
    .expect_err("t read before written");
    match err {
        GraphError::ReadBeforeWrite { node, tensor } => {
            assert_eq!(node.index, 0);
            assert_eq!(tensor, TensorRef::Internal(0));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn second_producer_is_rejected() {
    let err = build(|g| {
        let x = g.input("x");
        let y = g.output("y");
        g.node("first", scale()).input(x).output(y).push();
        g.node("second", scale()).input(x).output(y).push();
    })
    .expect_err("y written twice");
    assert!(
        err.to_string()
            .contains("produced by both node #0 `first` and node #1 `second`"),
        "{err}"
    );
}

#[test]
fn writing_a_graph_input_is_rejected() {
    let err = build(|g| {
        let x = g.input("x");
        let y = g.output("y");
        g.node("clobber", scale()).input(x).output(x).push();
        g.node("ok", scale()).input(x).output(y).push();
    })
    .expect_err("input written");
    assert!(matches!(err, GraphError::WritesInput { .. }));
}

#[test]
fn declared_but_unproduced_internal_is_rejected() {
    let err = build(|g| {
        let x = g.input("x");
        let y = g.output("y");
        g.internal("orphan");
        g.node("a", scale()).input(x).output(y).push();
    })
    .expect_err("orphan never produced");
    match err {
        GraphError::NeverProduced { tensor, name } => {
            assert_eq!(tensor, TensorRef::Internal(0));
            assert_eq!(name, "orphan");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unproduced_output_is_rejected() {
    let err = build(|g| {
        let x = g.input("x");
        let t = g.internal("t");
        g.output("y");
        g.node("a", scale()).input(x).output(t).push();
    })
    .expect_err("output never produced");
    assert!(matches!(
        err,
        GraphError::NeverProduced {
            tensor: TensorRef::Output(0),
            ..
        }
    ));
}

#[test]
fn operand_count_must_match_primitive() {
    let err = build(|g| {
        let x = g.input("x");
        let y = g.output("y");
        g.node("add", OpDescriptor::Elementwise(ElementwiseKind::Add))
            .input(x)
            .output(y)
            .push();
    })
    .expect_err("add needs two inputs");
    assert!(matches!(
        err,
        GraphError::OperandCount {
            expected: 2,
            actual: 1,
            ..
        }
    ));
}

#[test]
fn unknown_tensor_is_rejected() {
    let err = build(|g| {
        let x = g.input("x");
        let y = g.output("y");
        g.node("mm", OpDescriptor::MatMul(MatMulParams::new(false, false)))
            .input(x)
            .input(TensorRef::Input(7))
            .output(y)
            .push();
    })
    .expect_err("input#7 does not exist");
    assert!(matches!(
        err,
        GraphError::UnknownTensor {
            tensor: TensorRef::Input(7),
            ..
        }
    ));
}

#[test]
fn view_slots_are_kept_per_input() {
    let graph = build(|g| {
        let x = g.input("x");
        let w = g.input("w");
        let y = g.output("y");
        g.node("mm", OpDescriptor::MatMul(MatMulParams::new(false, true)))
            .input_view(x, ViewFn::fold_to_matrix())
            .input(w)
            .output(y)
            .push();
    })
    .expect("valid graph");
    let node = &graph.nodes[0];
    assert!(node.view(0).is_some());
    assert!(node.view(1).is_none());
}

#[test]
fn outputs_may_feed_later_nodes() {
    build(|g| {
        let x = g.input("x");
        let first = g.output("first");
        let second = g.output("second");
        g.node("a", scale()).input(x).output(first).push();
        g.node("b", scale()).input(first).output(second).push();
    })
    .expect("outputs are readable once produced");
}
