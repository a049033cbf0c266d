//! Storage layout of a flattened tensor.

/// Order in which the axes of a tensor are laid out in linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    /// First axis varies fastest (Fortran / Julia order).
    #[default]
    ColMajor,
    /// Last axis varies fastest (C order).
    RowMajor,
}

impl Layout {
    /// The fastest-varying axis for a tensor of the given rank.
    ///
    /// Rank 0 has no axes; 0 is returned so callers can index empty tables
    /// behind a rank check.
    #[inline]
    pub fn inner_axis(self, rank: usize) -> usize {
        match self {
            Layout::ColMajor => 0,
            Layout::RowMajor => rank.saturating_sub(1),
        }
    }

    /// The slowest-varying axis for a tensor of the given rank.
    #[inline]
    pub fn outer_axis(self, rank: usize) -> usize {
        match self {
            Layout::ColMajor => rank.saturating_sub(1),
            Layout::RowMajor => 0,
        }
    }

    /// Axes ordered from fastest to slowest varying.
    pub fn inner_to_outer(self, rank: usize) -> impl Iterator<Item = usize> {
        (0..rank).map(move |k| match self {
            Layout::ColMajor => k,
            Layout::RowMajor => rank - 1 - k,
        })
    }
}
