//! Axis permutations.

use std::ops::Index;
use strided_view::{Dims, Result, StridedError};

/// A validated permutation of `0..rank` together with its inverse.
///
/// Output axis `i` of a shuffled tensor is input axis `self[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shuffle {
    perm: Dims,
    inverse: Dims,
    is_identity: bool,
}

impl Shuffle {
    /// # Errors
    /// Returns [`StridedError::InvalidPermutation`] unless `perm` contains
    /// every value in `0..perm.len()` exactly once.
    pub fn new(perm: &[usize]) -> Result<Self> {
        let rank = perm.len();
        let mut inverse: Dims = smallvec::smallvec![usize::MAX; rank];
        for (i, &p) in perm.iter().enumerate() {
            if p >= rank || inverse[p] != usize::MAX {
                return Err(StridedError::InvalidPermutation(perm.to_vec()));
            }
            inverse[p] = i;
        }
        Ok(Self {
            perm: Dims::from_slice(perm),
            inverse,
            is_identity: perm.iter().enumerate().all(|(i, &p)| i == p),
        })
    }

    pub fn identity(rank: usize) -> Self {
        let perm: Dims = (0..rank).collect();
        Self {
            inverse: perm.clone(),
            perm,
            is_identity: true,
        }
    }

    /// Reverse the order of all axes.
    pub fn reversed(rank: usize) -> Self {
        let perm: Dims = (0..rank).rev().collect();
        Self {
            inverse: perm.clone(),
            perm,
            is_identity: rank <= 1,
        }
    }

    /// Exchange axes `a` and `b`, leaving the others in place.
    ///
    /// # Errors
    /// Returns [`StridedError::InvalidAxis`] if either axis is out of range.
    pub fn swap_axes(rank: usize, a: usize, b: usize) -> Result<Self> {
        for axis in [a, b] {
            if axis >= rank {
                return Err(StridedError::InvalidAxis { axis, rank });
            }
        }
        let mut perm: Dims = (0..rank).collect();
        perm.swap(a, b);
        Ok(Self {
            inverse: perm.clone(),
            perm,
            is_identity: a == b,
        })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.perm.len()
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.is_identity
    }

    #[inline]
    pub fn as_slice(&self) -> &[usize] {
        &self.perm
    }

    /// `inverse()[perm[i]] == i`.
    #[inline]
    pub fn inverse(&self) -> &[usize] {
        &self.inverse
    }

    /// The permutation that undoes this one.
    pub fn inverted(&self) -> Shuffle {
        Shuffle {
            perm: self.inverse.clone(),
            inverse: self.perm.clone(),
            is_identity: self.is_identity,
        }
    }

    /// Dimensions after shuffling: `out[i] = dims[perm[i]]`.
    pub fn apply(&self, dims: &[usize]) -> Dims {
        debug_assert_eq!(dims.len(), self.rank());
        self.perm.iter().map(|&p| dims[p]).collect()
    }
}

impl Index<usize> for Shuffle {
    type Output = usize;

    #[inline]
    fn index(&self, axis: usize) -> &usize {
        &self.perm[axis]
    }
}
