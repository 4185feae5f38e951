//! Per-device tables of which primitive/layout combinations a backend accepts.
//!
//! Builders consult the [`HardwareProfile`] to pick a lowering, and setup checks
//! every node against it so an illegal graph never reaches the backend.

use serde::{Deserialize, Serialize};

use crate::tensor::Layout;

use super::PrimitiveKind;

/// Layouts a primitive accepts for its primary input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayoutSupport {
    pub natural: bool,
    pub packed: bool,
}

impl LayoutSupport {
    pub const NONE: LayoutSupport = LayoutSupport {
        natural: false,
        packed: false,
    };
    pub const NATURAL: LayoutSupport = LayoutSupport {
        natural: true,
        packed: false,
    };
    pub const PACKED: LayoutSupport = LayoutSupport {
        natural: false,
        packed: true,
    };
    pub const BOTH: LayoutSupport = LayoutSupport {
        natural: true,
        packed: true,
    };

    pub fn accepts(self, layout: Layout) -> bool {
        match layout {
            Layout::Natural => self.natural,
            Layout::Packed => self.packed,
        }
    }
}

/// Support entry for every [`PrimitiveKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    entries: [LayoutSupport; PrimitiveKind::COUNT],
}

impl CapabilityTable {
    /// Builds a table from an exhaustive per-kind mapping.
    pub fn from_fn(mut support: impl FnMut(PrimitiveKind) -> LayoutSupport) -> Self {
        Self {
            entries: PrimitiveKind::ALL.map(&mut support),
        }
    }

    pub fn get(&self, kind: PrimitiveKind) -> LayoutSupport {
        self.entries[kind as usize]
    }

    pub fn set(&mut self, kind: PrimitiveKind, support: LayoutSupport) {
        self.entries[kind as usize] = support;
    }
}

/// Static capability flags of one accelerator target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub name: String,
    pub table: CapabilityTable,
}

impl HardwareProfile {
    pub fn new(name: impl Into<String>, table: CapabilityTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    /// Training-class parts: matrix units read natural layout and fused attention exists.
    pub fn datacenter() -> Self {
        let table = CapabilityTable::from_fn(|kind| match kind {
            PrimitiveKind::TransData | PrimitiveKind::MatMul => LayoutSupport::BOTH,
            PrimitiveKind::Add | PrimitiveKind::Mul | PrimitiveKind::Muls => LayoutSupport::BOTH,
            PrimitiveKind::RmsNorm
            | PrimitiveKind::LayerNorm
            | PrimitiveKind::Softmax
            | PrimitiveKind::Transpose
            | PrimitiveKind::FusedAttention => LayoutSupport::NATURAL,
        });
        Self::new("datacenter", table)
    }

    /// Inference-class parts: matrix units only consume packed tiles.
    pub fn edge() -> Self {
        let table = CapabilityTable::from_fn(|kind| match kind {
            PrimitiveKind::TransData => LayoutSupport::BOTH,
            PrimitiveKind::MatMul => LayoutSupport::PACKED,
            PrimitiveKind::Add | PrimitiveKind::Mul | PrimitiveKind::Muls => LayoutSupport::BOTH,
            PrimitiveKind::RmsNorm
            | PrimitiveKind::LayerNorm
            | PrimitiveKind::Softmax
            | PrimitiveKind::Transpose => LayoutSupport::NATURAL,
            PrimitiveKind::FusedAttention => LayoutSupport::NONE,
        });
        Self::new("edge", table)
    }

    pub fn supports(&self, kind: PrimitiveKind, layout: Layout) -> bool {
        self.table.get(kind).accepts(layout)
    }

    /// Returns a copy with one entry replaced.
    pub fn with(mut self, kind: PrimitiveKind, support: LayoutSupport) -> Self {
        self.table.set(kind, support);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_matmul_is_packed_only() {
        let edge = HardwareProfile::edge();
        assert!(!edge.supports(PrimitiveKind::MatMul, Layout::Natural));
        assert!(edge.supports(PrimitiveKind::MatMul, Layout::Packed));
        assert!(!edge.supports(PrimitiveKind::FusedAttention, Layout::Natural));
    }

    #[test]
    fn override_replaces_single_entry() {
        let profile = HardwareProfile::datacenter()
            .with(PrimitiveKind::FusedAttention, LayoutSupport::NONE);
        assert!(!profile.supports(PrimitiveKind::FusedAttention, Layout::Natural));
        assert!(profile.supports(PrimitiveKind::MatMul, Layout::Natural));
    }
}
