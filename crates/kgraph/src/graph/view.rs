//! Zero-copy input reshapes attached to node inputs.
//!
//! A view maps an input's current dims to the dims the primitive expects.
//! The element count must not change; setup checks that after every call.
//! Views also receive the setup scratch context so they can record the
//! pre-view dims for a later node's finalize callback.

use std::fmt;
use std::sync::Arc;

use crate::tensor::Dims;

type ViewBody<S> = dyn Fn(&[usize], &mut S) -> Result<Dims, String> + Send + Sync;

pub struct ViewFn<S>(Arc<ViewBody<S>>);

impl<S> Clone for ViewFn<S> {
    fn clone(&self) -> Self {
        ViewFn(Arc::clone(&self.0))
    }
}

impl<S> fmt::Debug for ViewFn<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewFn")
    }
}

impl<S: 'static> ViewFn<S> {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&[usize], &mut S) -> Result<Dims, String> + Send + Sync + 'static,
    {
        ViewFn(Arc::new(body))
    }

    pub fn apply(&self, dims: &[usize], scratch: &mut S) -> Result<Dims, String> {
        (self.0)(dims, scratch)
    }

    /// Folds the leading `count` axes into one: `[2, 3, 4]` with 2 gives `[6, 4]`.
    pub fn fold_leading(count: usize) -> Self {
        ViewFn::new(move |dims: &[usize], _: &mut S| {
            if count == 0 || dims.len() < count {
                return Err(format!("cannot fold {count} leading axes of {dims:?}"));
            }
            let mut out = Dims::new();
            out.push(dims[..count].iter().product());
            out.extend_from_slice(&dims[count..]);
            Ok(out)
        })
    }

    /// Folds every axis but the last: `[b, s, h]` becomes `[b * s, h]`.
    pub fn fold_to_matrix() -> Self {
        ViewFn::new(|dims: &[usize], _: &mut S| match dims.split_last() {
            Some((last, lead)) if !lead.is_empty() => {
                let mut out = Dims::new();
                out.push(lead.iter().product());
                out.push(*last);
                Ok(out)
            }
            _ => Err(format!("cannot fold {dims:?} into a matrix")),
        })
    }

    /// Splits `axis` into `[dim / inner, inner]`.
    pub fn split_axis(axis: usize, inner: usize) -> Self {
        ViewFn::new(move |dims: &[usize], _: &mut S| {
            let Some(&dim) = dims.get(axis) else {
                return Err(format!("axis {axis} out of range for {dims:?}"));
            };
            if inner == 0 || dim % inner != 0 {
                return Err(format!("axis {axis} of size {dim} is not divisible by {inner}"));
            }
            let mut out: Dims = dims[..axis].iter().copied().collect();
            out.push(dim / inner);
            out.push(inner);
            out.extend_from_slice(&dims[axis + 1..]);
            Ok(out)
        })
    }

    /// Reshapes to fixed dims.
    pub fn reshape<D: AsRef<[usize]>>(target: D) -> Self {
        let target = Dims::from_slice(target.as_ref());
        ViewFn::new(move |_: &[usize], _: &mut S| Ok(target.clone()))
    }

    /// Runs `record` on the pre-view dims, then applies `self`.
    pub fn capturing<F>(self, record: F) -> Self
    where
        F: Fn(&[usize], &mut S) -> Result<(), String> + Send + Sync + 'static,
    {
        ViewFn::new(move |dims: &[usize], scratch: &mut S| {
            record(dims, scratch)?;
            self.apply(dims, scratch)
        })
    }

    /// Applies `self`, then `next` to the result.
    pub fn then(self, next: ViewFn<S>) -> Self {
        ViewFn::new(move |dims: &[usize], scratch: &mut S| {
            let mid = self.apply(dims, scratch)?;
            next.apply(&mid, scratch)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_then_split_round_trips() {
        let view = ViewFn::<()>::fold_leading(2).then(ViewFn::split_axis(0, 3));
        let out = view.apply(&[2, 3, 4], &mut ()).unwrap();
        assert_eq!(out.as_slice(), &[2, 3, 4]);
    }

    #[test]
    fn split_rejects_uneven_factor() {
        let view = ViewFn::<()>::split_axis(1, 5);
        assert!(view.apply(&[2, 12], &mut ()).is_err());
    }

    #[test]
    fn capture_sees_original_dims() {
        let view = ViewFn::<Vec<usize>>::fold_to_matrix().capturing(|dims, seen| {
            seen.extend_from_slice(dims);
            Ok(())
        });
        let mut seen = Vec::new();
        let out = view.apply(&[2, 3, 4], &mut seen).unwrap();
        assert_eq!(out.as_slice(), &[6, 4]);
        assert_eq!(seen, vec![2, 3, 4]);
    }
}
