use std::fmt;

use serde::Serialize;

use crate::tensor::{TensorDesc, VariantPack};

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

fn fnv1a_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A_PRIME);
    }
    hash
}

/// Dtype, dims and layout of every bound tensor. Plans are keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ShapeSignature {
    pub inputs: Vec<TensorDesc>,
    pub outputs: Vec<TensorDesc>,
}

impl ShapeSignature {
    pub fn of(pack: &VariantPack) -> Self {
        Self {
            inputs: pack.input_descs(),
            outputs: pack.output_descs(),
        }
    }

    /// Stable 64-bit digest, used in spans and plan dumps.
    pub fn fingerprint(&self) -> u64 {
        let mut hash = FNV1A_OFFSET;
        for (tag, descs) in [(b'i', &self.inputs), (b'o', &self.outputs)] {
            hash = fnv1a_bytes(hash, &[tag]);
            for desc in descs {
                hash = fnv1a_bytes(hash, desc.dtype.as_str().as_bytes());
                hash = fnv1a_bytes(hash, desc.layout.as_str().as_bytes());
                for &dim in desc.dims() {
                    hash = fnv1a_bytes(hash, &(dim as u64).to_le_bytes());
                }
                hash = fnv1a_bytes(hash, b";");
            }
        }
        hash
    }

    /// First difference from `other`, phrased for an error message.
    pub fn diff(&self, other: &ShapeSignature) -> Option<String> {
        for (what, ours, theirs) in [
            ("input", &self.inputs, &other.inputs),
            ("output", &self.outputs, &other.outputs),
        ] {
            if ours.len() != theirs.len() {
                return Some(format!(
                    "{} {what}s planned, {} bound",
                    ours.len(),
                    theirs.len()
                ));
            }
            if let Some((index, (planned, bound))) = ours
                .iter()
                .zip(theirs)
                .enumerate()
                .find(|(_, (planned, bound))| planned != bound)
            {
                return Some(format!("{what} {index} planned as {planned}, bound as {bound}"));
            }
        }
        None
    }
}

impl fmt::Display for ShapeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |descs: &[TensorDesc]| {
            descs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "({}) -> ({})",
            join(&self.inputs),
            join(&self.outputs)
        )
    }
}
