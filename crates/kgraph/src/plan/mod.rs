//! Liveness analysis and workspace planning for internal tensors.

mod liveness;
mod workspace;

pub use liveness::{compute_liveness, deaths_by_node, LiveInterval};
pub use workspace::{align_up, plan_workspace, WorkspaceLayout, WorkspaceSlot};
