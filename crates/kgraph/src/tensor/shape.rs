//! Dimension bookkeeping for tensor descriptors.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Inline capacity covers every rank the bundled primitives produce.
pub type Dims = SmallVec<[usize; 6]>;

/// Logical (or physical, for packed tensors) dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    dims: Dims,
}

impl Shape {
    pub fn new<D: AsRef<[usize]>>(dims: D) -> Self {
        Shape {
            dims: SmallVec::from_slice(dims.as_ref()),
        }
    }

    /// Borrow the raw dimension slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements. A rank-0 shape describes a scalar.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Element count with overflow checking.
    pub fn checked_num_elements(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
    }

    pub fn last(&self) -> Option<usize> {
        self.dims.last().copied()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape {
            dims: SmallVec::from_vec(dims),
        }
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, dim) in self.dims.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

/// Maps a possibly negative axis onto `0..rank`.
pub fn normalize_axis(axis: isize, rank: usize) -> Option<usize> {
    let rank = rank as isize;
    let index = if axis < 0 { axis + rank } else { axis };
    (0..rank).contains(&index).then_some(index as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_axis_counts_from_back() {
        assert_eq!(normalize_axis(-1, 3), Some(2));
        assert_eq!(normalize_axis(-3, 3), Some(0));
        assert_eq!(normalize_axis(-4, 3), None);
        assert_eq!(normalize_axis(3, 3), None);
    }

    #[test]
    fn checked_count_reports_overflow() {
        let shape = Shape::new([usize::MAX, 2]);
        assert_eq!(shape.checked_num_elements(), None);
        assert_eq!(Shape::new([2, 3, 4]).checked_num_elements(), Some(24));
    }

    #[test]
    fn display_lists_dims() {
        assert_eq!(Shape::new([8, 16]).to_string(), "[8, 16]");
    }
}
