//! Host runtime description: cache sizes and temporary allocation.
//!
//! Evaluators never keep process-wide state; they ask the device they were
//! built with every time they need a cache size or a scratch buffer.

use crate::{Result, StridedError};
use strided_traits::Scalar;

/// Default first-level data cache size (typical L1d).
pub const DEFAULT_L1_CACHE_BYTES: usize = 32 * 1024;

/// Default last-level cache size.
pub const DEFAULT_LLC_BYTES: usize = 8 * 1024 * 1024;

const L1_ENV: &str = "STRIDED_L1_CACHE_BYTES";
const LLC_ENV: &str = "STRIDED_LLC_BYTES";

/// A host that evaluators run on.
pub trait Device: Send + Sync {
    /// Size in bytes of the first-level data cache.
    fn first_level_cache_size(&self) -> usize;

    /// Size in bytes of the last-level cache.
    fn last_level_cache_size(&self) -> usize;

    /// Allocate a zero-initialized buffer of `len` coefficients.
    ///
    /// # Errors
    /// Returns [`StridedError::AllocationFailed`] if the memory cannot be
    /// reserved.
    fn allocate<T: Scalar>(&self, len: usize) -> Result<Vec<T>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| StridedError::AllocationFailed {
                bytes: len.saturating_mul(std::mem::size_of::<T>()),
            })?;
        buf.resize(len, T::zero());
        Ok(buf)
    }

    /// Return a buffer obtained from [`Device::allocate`].
    fn deallocate<T: Scalar>(&self, buf: Vec<T>) {
        drop(buf);
    }
}

/// The CPU the process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDevice {
    l1_cache_bytes: usize,
    llc_bytes: usize,
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self {
            l1_cache_bytes: DEFAULT_L1_CACHE_BYTES,
            llc_bytes: DEFAULT_LLC_BYTES,
        }
    }
}

impl CpuDevice {
    pub fn new(l1_cache_bytes: usize, llc_bytes: usize) -> Self {
        Self {
            l1_cache_bytes,
            llc_bytes,
        }
    }

    /// Build from the defaults, overridden by `STRIDED_L1_CACHE_BYTES` and
    /// `STRIDED_LLC_BYTES` when set.
    ///
    /// # Errors
    /// Returns [`StridedError::InvalidConfig`] if a variable is set but is
    /// not a positive decimal integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut device = Self::default();
        if let Some(v) = lookup(L1_ENV) {
            device.l1_cache_bytes = parse_bytes(L1_ENV, &v)?;
        }
        if let Some(v) = lookup(LLC_ENV) {
            device.llc_bytes = parse_bytes(LLC_ENV, &v)?;
        }
        tracing::debug!(
            l1_cache_bytes = device.l1_cache_bytes,
            llc_bytes = device.llc_bytes,
            "cpu device configured"
        );
        Ok(device)
    }
}

fn parse_bytes(key: &'static str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(StridedError::InvalidConfig {
            key,
            value: value.to_string(),
        }),
    }
}

impl Device for CpuDevice {
    #[inline]
    fn first_level_cache_size(&self) -> usize {
        self.l1_cache_bytes
    }

    #[inline]
    fn last_level_cache_size(&self) -> usize {
        self.llc_bytes
    }
}
