//! Division by a loop-invariant positive integer without hardware division.
//!
//! A [`FastDivisor`] precomputes a magic multiplier and two shifts for a
//! fixed divisor `d` (round-up method of Granlund and Montgomery). Dividing
//! then costs one widening multiply, one subtraction and two shifts, and is
//! exact for every 64-bit numerator.

use std::ops::Div;

/// Precomputed reciprocal of a fixed positive divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastDivisor {
    multiplier: u64,
    shift1: u32,
    shift2: u32,
    divisor: u64,
}

#[inline(always)]
fn mul_hi(a: u64, b: u64) -> u64 {
    ((a as u128 * b as u128) >> 64) as u64
}

impl FastDivisor {
    /// Build the divisor.
    ///
    /// # Panics
    /// Panics if `divisor` is zero.
    pub fn new(divisor: usize) -> Self {
        assert!(divisor > 0, "FastDivisor requires a positive divisor");
        let d = divisor as u64;
        // ceil(log2(d))
        let log_div = 64 - (d - 1).leading_zeros();
        // floor(2^64 * (2^l - d) / d) + 1; (2^l - d) < d so this fits in 64 bits.
        let excess = (1u128 << log_div) - d as u128;
        let multiplier = ((excess << 64) / d as u128 + 1) as u64;
        Self {
            multiplier,
            shift1: log_div.min(1),
            shift2: log_div.saturating_sub(1),
            divisor: d,
        }
    }

    /// `numerator / divisor`, exact for all `numerator`.
    #[inline(always)]
    pub fn divide(&self, numerator: usize) -> usize {
        let n = numerator as u64;
        let t1 = mul_hi(self.multiplier, n);
        let t = (n - t1) >> self.shift1;
        ((t1 + t) >> self.shift2) as usize
    }

    /// The divisor this was built from.
    #[inline]
    pub fn divisor(&self) -> usize {
        self.divisor as usize
    }
}

impl Div<FastDivisor> for usize {
    type Output = usize;

    #[inline(always)]
    fn div(self, rhs: FastDivisor) -> usize {
        rhs.divide(self)
    }
}

impl Div<&FastDivisor> for usize {
    type Output = usize;

    #[inline(always)]
    fn div(self, rhs: &FastDivisor) -> usize {
        rhs.divide(self)
    }
}
