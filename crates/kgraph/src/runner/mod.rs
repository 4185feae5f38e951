//! The `init -> setup -> workspace size -> execute` lifecycle.
//!
//! A [`Runner`] owns one operator, a handle to the kernel backend and the
//! plans built for the shape signatures it has seen. Plans are immutable and
//! shared through `Arc`, so switching back to a cached signature is a lookup.
//! A runner is not meant for concurrent use; callers serialize setup and
//! execute or keep one runner per stream.

mod dump;
mod execute;
mod plan;
mod signature;

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tracing::{info, info_span, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::kernel::{HardwareProfile, KernelBackend};
use crate::ops::Operator;
use crate::options::RunnerOptions;
use crate::plan::WorkspaceLayout;
use crate::tensor::{DeviceBuffer, VariantPack};

pub use dump::{InternalDump, NodeDump, PlanDump, WorkspaceDump};
pub use plan::{Plan, PlannedNode};
pub use signature::ShapeSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerState {
    Uninitialized,
    Initialized,
    Planned,
    Ready,
}

type SharedPlan<O, B> = Arc<Plan<<O as Operator>::Scratch, <B as KernelBackend>::Kernel>>;

pub struct Runner<O: Operator, B: KernelBackend> {
    operator: O,
    backend: Arc<B>,
    profile: HardwareProfile,
    options: RunnerOptions,
    state: RunnerState,
    active: Option<SharedPlan<O, B>>,
    cache: Option<LruCache<ShapeSignature, SharedPlan<O, B>>>,
}

impl<O: Operator, B: KernelBackend> Runner<O, B> {
    pub fn new(operator: O, backend: Arc<B>, profile: HardwareProfile) -> Self {
        Self {
            operator,
            backend,
            profile,
            options: RunnerOptions::default(),
            state: RunnerState::Uninitialized,
            active: None,
            cache: None,
        }
    }

    /// Replaces the options. They are validated by [`Runner::init`].
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn operator(&self) -> &O {
        &self.operator
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.profile
    }

    /// Number of plans currently cached.
    pub fn cached_plans(&self) -> usize {
        self.cache.as_ref().map_or(0, LruCache::len)
    }

    /// Validates options and static operator parameters.
    pub fn init(&mut self) -> RunnerResult<()> {
        if self.state != RunnerState::Uninitialized {
            return Err(self.reject("init"));
        }
        self.options.validate()?;
        self.operator.validate()?;
        let capacity =
            NonZeroUsize::new(self.options.plan_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        self.cache = Some(LruCache::new(capacity));
        self.state = RunnerState::Initialized;
        info!(
            operator = self.operator.name(),
            backend = self.backend.backend_name(),
            profile = %self.profile.name,
            "runner initialized"
        );
        Ok(())
    }

    /// Plans `pack`'s shape signature, reusing a cached plan when one exists.
    ///
    /// On failure the active plan is dropped and the runner returns to
    /// `Initialized`; cached plans for other signatures stay valid.
    pub fn setup(&mut self, pack: &VariantPack) -> RunnerResult<()> {
        if self.state == RunnerState::Uninitialized {
            return Err(self.reject("setup"));
        }
        let signature = ShapeSignature::of(pack);
        let span = info_span!(
            "setup",
            operator = self.operator.name(),
            signature = %format_args!("{:016x}", signature.fingerprint())
        );
        let _guard = span.enter();

        match self.plan_for(signature) {
            Ok(plan) => {
                self.active = Some(plan);
                self.state = RunnerState::Planned;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "setup failed");
                self.active = None;
                self.state = RunnerState::Initialized;
                Err(err)
            }
        }
    }

    fn plan_for(&mut self, signature: ShapeSignature) -> RunnerResult<SharedPlan<O, B>> {
        self.check_arity(&signature)?;
        if let Some(active) = self.active.as_ref().filter(|p| p.signature == signature) {
            info!("signature unchanged, keeping plan");
            return Ok(Arc::clone(active));
        }
        if let Some(cached) = self.cache.as_mut().and_then(|cache| cache.get(&signature)) {
            info!("reusing cached plan");
            return Ok(Arc::clone(cached));
        }

        let plan = plan::build_plan(
            &self.operator,
            self.backend.as_ref(),
            &self.profile,
            &self.options,
            signature,
        )?;
        info!(
            graph = %plan.graph_name,
            nodes = plan.nodes.len(),
            workspace_bytes = plan.layout.total_bytes,
            bytes_saved = plan.layout.bytes_saved(),
            "built plan"
        );
        if self.options.dump_plans {
            let dump = PlanDump::capture(self.operator.name(), self.backend.backend_name(), &plan);
            info!("\n{dump}");
        }
        let plan = Arc::new(plan);
        if let Some(cache) = self.cache.as_mut() {
            cache.put(plan.signature.clone(), Arc::clone(&plan));
        }
        Ok(plan)
    }

    fn check_arity(&self, signature: &ShapeSignature) -> RunnerResult<()> {
        for (what, expected, actual) in [
            ("operator inputs", self.operator.input_count(), signature.inputs.len()),
            ("operator outputs", self.operator.output_count(), signature.outputs.len()),
        ] {
            if expected != actual {
                return Err(RunnerError::Arity {
                    what,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Bytes the caller must provide to [`Runner::execute`].
    pub fn get_workspace_size(&self) -> RunnerResult<usize> {
        self.planned("get_workspace_size")
            .map(|plan| plan.layout.total_bytes)
    }

    /// Binds buffers and launches every node in order.
    ///
    /// The pack must carry exactly the signature of the last setup; anything
    /// else is rejected before the first launch and leaves the plan untouched.
    pub fn execute(&mut self, workspace: DeviceBuffer, pack: &VariantPack) -> RunnerResult<()> {
        let plan = Arc::clone(self.planned("execute")?);
        let span = info_span!(
            "execute",
            operator = self.operator.name(),
            signature = %format_args!("{:016x}", plan.signature.fingerprint())
        );
        let _guard = span.enter();

        if let Err(err) = execute::validate_bindings(&*plan, pack, workspace) {
            warn!(error = %err, "execute rejected");
            return Err(err);
        }
        execute::dispatch(self.backend.as_ref(), &*plan, pack, workspace)?;
        self.state = RunnerState::Ready;
        info!(nodes = plan.nodes.len(), "executed");
        Ok(())
    }

    /// Layout of the active plan.
    pub fn workspace_layout(&self) -> Option<&WorkspaceLayout> {
        self.active.as_ref().map(|plan| &plan.layout)
    }

    pub fn active_plan(&self) -> Option<&Plan<O::Scratch, B::Kernel>> {
        self.active.as_deref()
    }

    /// Diagnostic dump of the active plan.
    pub fn dump(&self) -> Option<PlanDump> {
        self.active.as_ref().map(|plan| {
            PlanDump::capture(self.operator.name(), self.backend.backend_name(), &**plan)
        })
    }

    fn planned(&self, op: &'static str) -> RunnerResult<&SharedPlan<O, B>> {
        match (&self.active, self.state) {
            (Some(plan), RunnerState::Planned | RunnerState::Ready) => Ok(plan),
            _ => Err(self.reject(op)),
        }
    }

    fn reject(&self, op: &'static str) -> RunnerError {
        warn!(op, state = ?self.state, "call rejected in current state");
        RunnerError::InvalidState {
            op,
            state: self.state,
        }
    }
}
