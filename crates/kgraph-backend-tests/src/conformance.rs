//! Lifecycle checks any kernel backend must pass with the bundled operators.

use std::sync::Arc;

use kgraph::ops::{
    AttentionOperation, AttentionParams, LinearOperation, LinearParams, RmsNormOperation,
    RmsNormParams,
};
use kgraph::{HardwareProfile, KernelBackend, Operator, Runner, RunnerState, VariantPack};

use crate::fixtures::{f32_desc, workspace, PackBuilder};

fn run_once<O: Operator, B: KernelBackend>(
    operator: O,
    backend: Arc<B>,
    profile: HardwareProfile,
    pack: &VariantPack,
) -> usize {
    let mut runner = Runner::new(operator, backend, profile);
    runner.init().expect("init");
    runner.setup(pack).expect("setup");
    let bytes = runner.get_workspace_size().expect("workspace size");
    runner.execute(workspace(bytes), pack).expect("execute");
    assert_eq!(runner.state(), RunnerState::Ready);
    bytes
}

pub fn linear_with_bias_executes<B: KernelBackend>(backend: Arc<B>, profile: HardwareProfile) {
    let linear = LinearOperation::new(
        "proj",
        LinearParams {
            in_features: 32,
            out_features: 48,
            has_bias: true,
        },
    );
    let pack = PackBuilder::new()
        .input(f32_desc(&[2, 5, 32]))
        .input(f32_desc(&[48, 32]))
        .input(f32_desc(&[48]))
        .output(f32_desc(&[2, 5, 48]))
        .build();
    let bytes = run_once(linear, backend, profile, &pack);
    assert!(bytes > 0, "bias path keeps the projection in the workspace");
}

pub fn rms_norm_with_residual_executes<B: KernelBackend>(
    backend: Arc<B>,
    profile: HardwareProfile,
) {
    let norm = RmsNormOperation::new(
        "norm",
        RmsNormParams {
            hidden: 64,
            epsilon: 1e-6,
            has_residual: true,
        },
    );
    let pack = PackBuilder::new()
        .input(f32_desc(&[3, 7, 64]))
        .input(f32_desc(&[64]))
        .input(f32_desc(&[3, 7, 64]))
        .output(f32_desc(&[3, 7, 64]))
        .build();
    let bytes = run_once(norm, backend, profile, &pack);
    assert_eq!(bytes, 3 * 7 * 64 * 4);
}

pub fn attention_executes<B: KernelBackend>(backend: Arc<B>, profile: HardwareProfile) {
    let attention = AttentionOperation::new(
        "attn",
        AttentionParams {
            heads: 4,
            head_dim: 8,
            scale: None,
        },
    );
    let desc = f32_desc(&[2, 6, 32]);
    let pack = PackBuilder::new()
        .input(desc.clone())
        .input(desc.clone())
        .input(desc.clone())
        .output(desc)
        .build();
    run_once(attention, backend, profile, &pack);
}

/// Generates a test module running every conformance check against a backend.
///
/// `$backend_ctor` is called once per test and must return an `Arc` of the
/// backend under test.
#[macro_export]
macro_rules! define_backend_tests {
    ($module:ident, $backend_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            #[allow(unused_imports)]
            use super::*;
            use $crate::conformance;

            #[test]
            fn linear_with_bias_on_datacenter() {
                conformance::linear_with_bias_executes(
                    ($backend_ctor)(),
                    ::kgraph::HardwareProfile::datacenter(),
                );
            }

            #[test]
            fn linear_with_bias_on_edge() {
                conformance::linear_with_bias_executes(
                    ($backend_ctor)(),
                    ::kgraph::HardwareProfile::edge(),
                );
            }

            #[test]
            fn rms_norm_with_residual() {
                conformance::rms_norm_with_residual_executes(
                    ($backend_ctor)(),
                    ::kgraph::HardwareProfile::datacenter(),
                );
            }

            #[test]
            fn fused_attention() {
                conformance::attention_executes(
                    ($backend_ctor)(),
                    ::kgraph::HardwareProfile::datacenter(),
                );
            }

            #[test]
            fn decomposed_attention() {
                conformance::attention_executes(
                    ($backend_ctor)(),
                    ::kgraph::HardwareProfile::datacenter().with(
                        ::kgraph::PrimitiveKind::FusedAttention,
                        ::kgraph::kernel::LayoutSupport::NONE,
                    ),
                );
            }
        }
    };
}
