use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::graph::TensorRef;

use super::liveness::{deaths_by_node, LiveInterval};

/// Rounds `value` up to a multiple of `alignment` (a power of two).
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    if alignment <= 1 {
        return Some(value);
    }
    let mask = alignment - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Byte range of one internal tensor inside the workspace buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSlot {
    pub offset: usize,
    pub bytes: usize,
}

impl WorkspaceSlot {
    pub fn end(&self) -> usize {
        self.offset + self.bytes
    }

    pub fn overlaps(&self, other: &WorkspaceSlot) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Solved workspace: one slot per internal tensor plus the kernel scratch region.
///
/// Zero-sized tensors have no slot. The kernel scratch region starts right
/// after the tensor region and is shared by every node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceLayout {
    pub slots: Vec<Option<WorkspaceSlot>>,
    pub tensor_bytes: usize,
    pub scratch_offset: usize,
    pub scratch_bytes: usize,
    pub total_bytes: usize,
    /// Size the tensor region would need without any reuse.
    pub naive_bytes: usize,
}

impl WorkspaceLayout {
    pub fn slot(&self, internal: usize) -> Option<WorkspaceSlot> {
        self.slots.get(internal).copied().flatten()
    }

    pub fn bytes_saved(&self) -> usize {
        self.naive_bytes.saturating_sub(self.tensor_bytes)
    }

    pub fn with_kernel_scratch(
        mut self,
        bytes: usize,
        alignment: usize,
    ) -> Result<Self, GraphError> {
        let tensor = TensorRef::Internal(self.slots.len());
        let overflow = || GraphError::SizeOverflow { tensor };
        let scratch_bytes = align_up(bytes, alignment).ok_or_else(overflow)?;
        self.scratch_offset = self.tensor_bytes;
        self.scratch_bytes = scratch_bytes;
        self.total_bytes = self
            .tensor_bytes
            .checked_add(scratch_bytes)
            .ok_or_else(overflow)?;
        Ok(self)
    }
}

/// Offset-sorted list of reclaimed ranges. Adjacent ranges are merged on release.
#[derive(Debug, Default)]
struct FreeList {
    ranges: Vec<WorkspaceSlot>,
}

impl FreeList {
    /// Smallest range that fits; ties go to the lowest offset.
    fn take_best_fit(&mut self, bytes: usize) -> Option<usize> {
        let (index, _) = self
            .ranges
            .iter()
            .enumerate()
            .filter(|(_, range)| range.bytes >= bytes)
            .min_by_key(|(_, range)| (range.bytes, range.offset))?;
        let range = self.ranges[index];
        if range.bytes == bytes {
            self.ranges.remove(index);
        } else {
            self.ranges[index] = WorkspaceSlot {
                offset: range.offset + bytes,
                bytes: range.bytes - bytes,
            };
        }
        Some(range.offset)
    }

    /// Removes and returns the range ending exactly at `high_water`, if any.
    fn take_tail(&mut self, high_water: usize) -> Option<WorkspaceSlot> {
        match self.ranges.last() {
            Some(last) if last.end() == high_water => self.ranges.pop(),
            _ => None,
        }
    }

    fn release(&mut self, slot: WorkspaceSlot) {
        let index = self
            .ranges
            .partition_point(|range| range.offset < slot.offset);
        self.ranges.insert(index, slot);
        if index + 1 < self.ranges.len() && self.ranges[index].end() == self.ranges[index + 1].offset
        {
            let next = self.ranges.remove(index + 1);
            self.ranges[index].bytes += next.bytes;
        }
        if index > 0 && self.ranges[index - 1].end() == self.ranges[index].offset {
            let current = self.ranges.remove(index);
            self.ranges[index - 1].bytes += current.bytes;
        }
    }
}

/// Greedy liveness-based placement of internal tensors.
///
/// Nodes are walked in order. At each node the tensors it produces are placed
/// first (best fit from the free list, else at the high-water mark), then the
/// tensors whose last reader is this node return to the free list. The result
/// depends only on `sizes`, `liveness` and `alignment`.
pub fn plan_workspace(
    sizes: &[usize],
    liveness: &[Option<LiveInterval>],
    node_count: usize,
    alignment: usize,
) -> Result<WorkspaceLayout, GraphError> {
    let aligned = sizes
        .iter()
        .enumerate()
        .map(|(slot, &bytes)| {
            align_up(bytes, alignment).ok_or(GraphError::SizeOverflow {
                tensor: TensorRef::Internal(slot),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut produced = vec![Vec::new(); node_count];
    for (slot, interval) in liveness.iter().enumerate() {
        if let Some(interval) = interval {
            if let Some(bucket) = produced.get_mut(interval.producer) {
                bucket.push(slot);
            }
        }
    }
    let deaths = deaths_by_node(liveness, node_count);

    let mut slots: Vec<Option<WorkspaceSlot>> = vec![None; sizes.len()];
    let mut free = FreeList::default();
    let mut high_water = 0usize;
    let mut naive_bytes = 0usize;

    for node in 0..node_count {
        for &slot in &produced[node] {
            let bytes = aligned.get(slot).copied().unwrap_or(0);
            if bytes == 0 {
                continue;
            }
            let overflow = || GraphError::SizeOverflow {
                tensor: TensorRef::Internal(slot),
            };
            naive_bytes = naive_bytes.checked_add(bytes).ok_or_else(overflow)?;
            let offset = match free.take_best_fit(bytes) {
                Some(offset) => offset,
                None => {
                    let offset = free
                        .take_tail(high_water)
                        .map_or(high_water, |tail| tail.offset);
                    high_water = offset.checked_add(bytes).ok_or_else(overflow)?;
                    offset
                }
            };
            slots[slot] = Some(WorkspaceSlot { offset, bytes });
        }
        for &slot in &deaths[node] {
            if let Some(assigned) = slots[slot] {
                free.release(assigned);
            }
        }
    }

    Ok(WorkspaceLayout {
        slots,
        tensor_bytes: high_water,
        scratch_offset: high_water,
        scratch_bytes: 0,
        total_bytes: high_water,
        naive_bytes,
    })
}
