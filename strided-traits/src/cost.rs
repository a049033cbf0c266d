//! Per-coefficient cost record used by schedulers to pick an evaluation
//! strategy.

use std::ops::{Add, AddAssign, Mul};

/// Cost of producing one coefficient of an expression.
///
/// Plain data: evaluators add their own contribution on top of their
/// inputs' costs and the scheduler folds the record with
/// [`OpCost::total_cost`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OpCost {
    bytes_loaded: f64,
    bytes_stored: f64,
    compute_cycles: f64,
}

impl OpCost {
    /// Cycles for an index addition.
    pub const INDEX_ADD_COST: f64 = 1.0;
    /// Cycles for an index multiplication.
    pub const INDEX_MUL_COST: f64 = 1.0;
    /// Cycles for an index division.
    pub const INDEX_DIV_COST: f64 = 24.0;

    /// Build a cost record.
    ///
    /// When `vectorized` is set the compute term is amortized over
    /// `packet_size` coefficients.
    pub fn new(
        bytes_loaded: f64,
        bytes_stored: f64,
        compute_cycles: f64,
        vectorized: bool,
        packet_size: usize,
    ) -> Self {
        let compute_cycles = if vectorized && packet_size > 0 {
            compute_cycles / packet_size as f64
        } else {
            compute_cycles
        };
        Self {
            bytes_loaded,
            bytes_stored,
            compute_cycles,
        }
    }

    /// Cost of pure computation with no memory traffic.
    pub fn compute(compute_cycles: f64) -> Self {
        Self::new(0.0, 0.0, compute_cycles, false, 1)
    }

    #[inline]
    pub fn bytes_loaded(&self) -> f64 {
        self.bytes_loaded
    }

    #[inline]
    pub fn bytes_stored(&self) -> f64 {
        self.bytes_stored
    }

    #[inline]
    pub fn compute_cycles(&self) -> f64 {
        self.compute_cycles
    }

    /// Fold the record into a single number using per-byte and per-cycle
    /// weights.
    pub fn total_cost(&self, load_cost: f64, store_cost: f64, compute_cost: f64) -> f64 {
        self.bytes_loaded * load_cost
            + self.bytes_stored * store_cost
            + self.compute_cycles * compute_cost
    }
}

impl Add for OpCost {
    type Output = OpCost;

    fn add(self, rhs: OpCost) -> OpCost {
        OpCost {
            bytes_loaded: self.bytes_loaded + rhs.bytes_loaded,
            bytes_stored: self.bytes_stored + rhs.bytes_stored,
            compute_cycles: self.compute_cycles + rhs.compute_cycles,
        }
    }
}

impl AddAssign for OpCost {
    fn add_assign(&mut self, rhs: OpCost) {
        *self = *self + rhs;
    }
}

impl Mul<f64> for OpCost {
    type Output = OpCost;

    fn mul(self, rhs: f64) -> OpCost {
        OpCost {
            bytes_loaded: self.bytes_loaded * rhs,
            bytes_stored: self.bytes_stored * rhs,
            compute_cycles: self.compute_cycles * rhs,
        }
    }
}
