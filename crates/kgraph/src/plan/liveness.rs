use serde::{Deserialize, Serialize};

use crate::graph::TensorRef;

/// Node span of an internal tensor: written by `producer`, last read by `death`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveInterval {
    pub producer: usize,
    pub death: usize,
}

impl LiveInterval {
    pub fn overlaps(&self, other: &LiveInterval) -> bool {
        self.producer <= other.death && other.producer <= self.death
    }
}

/// Computes the live interval of every internal tensor from node order.
///
/// A tensor nobody reads dies right after its producer. Tensors that are
/// never written come back as `None`; graph validation rejects those before
/// planning.
pub fn compute_liveness<'a, I>(internal_count: usize, nodes: I) -> Vec<Option<LiveInterval>>
where
    I: IntoIterator<Item = (&'a [TensorRef], &'a [TensorRef])>,
{
    let mut intervals: Vec<Option<LiveInterval>> = vec![None; internal_count];
    for (index, (inputs, outputs)) in nodes.into_iter().enumerate() {
        for tensor in outputs {
            if let TensorRef::Internal(slot) = *tensor {
                if let Some(entry) = intervals.get_mut(slot) {
                    entry.get_or_insert(LiveInterval {
                        producer: index,
                        death: index,
                    });
                }
            }
        }
        for tensor in inputs {
            if let TensorRef::Internal(slot) = *tensor {
                if let Some(Some(interval)) = intervals.get_mut(slot) {
                    interval.death = interval.death.max(index);
                }
            }
        }
    }
    intervals
}

/// Inverse mapping: for each node, the internal tensors whose last reader it is.
pub fn deaths_by_node(liveness: &[Option<LiveInterval>], node_count: usize) -> Vec<Vec<usize>> {
    let mut deaths = vec![Vec::new(); node_count];
    for (slot, interval) in liveness.iter().enumerate() {
        if let Some(interval) = interval {
            if let Some(bucket) = deaths.get_mut(interval.death) {
                bucket.push(slot);
            }
        }
    }
    deaths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_reader_sets_death() {
        let nodes: Vec<(Vec<TensorRef>, Vec<TensorRef>)> = vec![
            (vec![TensorRef::Input(0)], vec![TensorRef::Internal(0)]),
            (vec![TensorRef::Internal(0)], vec![TensorRef::Internal(1)]),
            (
                vec![TensorRef::Internal(0), TensorRef::Internal(1)],
                vec![TensorRef::Output(0)],
            ),
        ];
        let liveness = compute_liveness(
            2,
            nodes.iter().map(|(i, o)| (i.as_slice(), o.as_slice())),
        );
        assert_eq!(
            liveness[0],
            Some(LiveInterval {
                producer: 0,
                death: 2
            })
        );
        assert_eq!(
            liveness[1],
            Some(LiveInterval {
                producer: 1,
                death: 2
            })
        );
        assert_eq!(deaths_by_node(&liveness, 3), vec![vec![], vec![], vec![0, 1]]);
    }

    #[test]
    fn unread_tensor_dies_at_producer() {
        let nodes = [(vec![TensorRef::Input(0)], vec![TensorRef::Internal(0)])];
        let liveness = compute_liveness(
            1,
            nodes.iter().map(|(i, o)| (i.as_slice(), o.as_slice())),
        );
        assert_eq!(
            liveness[0],
            Some(LiveInterval {
                producer: 0,
                death: 0
            })
        );
    }
}
