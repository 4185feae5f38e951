//! Storage layouts and the packed (tiled) layout arithmetic.
//!
//! Matrix units on several accelerator generations only consume 16x16 tiles.
//! A natural row-major tensor with logical dims `[..batch, rows, cols]` is
//! stored in packed form as `[..batch, ceil(cols / 16), round_up(rows, 16), 16]`:
//! column blocks outermost, each block holding every (padded) row of 16 columns.

use serde::{Deserialize, Serialize};

use super::shape::Dims;

/// Edge length of one packed tile.
pub const PACKED_TILE: usize = 16;

/// Physical arrangement of a tensor's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    /// Row-major, dims are the logical dims.
    Natural,
    /// 16x16 tiled, dims are the physical packed dims.
    Packed,
}

impl Layout {
    pub fn as_str(self) -> &'static str {
        match self {
            Layout::Natural => "natural",
            Layout::Packed => "packed",
        }
    }
}

fn round_up(value: usize, multiple: usize) -> Option<usize> {
    value.div_ceil(multiple).checked_mul(multiple)
}

/// Packed physical dims for logical `[..batch, rows, cols]`.
///
/// Returns `None` for ranks below two or when the padded rows overflow.
pub fn packed_dims(logical: &[usize]) -> Option<Dims> {
    let rank = logical.len();
    if rank < 2 {
        return None;
    }
    let rows = logical[rank - 2];
    let cols = logical[rank - 1];
    let mut dims: Dims = logical[..rank - 2].iter().copied().collect();
    dims.push(cols.div_ceil(PACKED_TILE));
    dims.push(round_up(rows, PACKED_TILE)?);
    dims.push(PACKED_TILE);
    Some(dims)
}

/// Recovers logical dims from packed dims and the `[rows, cols]` crop.
///
/// Fails when the crop could not have produced the packed dims.
pub fn unpacked_dims(packed: &[usize], crops: [usize; 2]) -> Option<Dims> {
    let rank = packed.len();
    if rank < 3 || packed[rank - 1] != PACKED_TILE {
        return None;
    }
    let [rows, cols] = crops;
    if cols.div_ceil(PACKED_TILE) != packed[rank - 3]
        || round_up(rows, PACKED_TILE) != Some(packed[rank - 2])
    {
        return None;
    }
    let mut dims: Dims = packed[..rank - 3].iter().copied().collect();
    dims.push(rows);
    dims.push(cols);
    Some(dims)
}

/// Batch prefix of a tensor's dims, excluding the two matrix axes.
pub fn batch_prefix(dims: &[usize], layout: Layout) -> &[usize] {
    let matrix_rank = match layout {
        Layout::Natural => 2,
        Layout::Packed => 3,
    };
    &dims[..dims.len().saturating_sub(matrix_rank)]
}
