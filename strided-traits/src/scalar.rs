//! Scalar type bounds for strided evaluators.

/// Width in bytes of the vector registers packets are sized for.
pub const SIMD_REGISTER_BYTES: usize = 32;

/// Shared trait bounds for all coefficient types an evaluator can expose.
///
/// Evaluators only move coefficients around, so no arithmetic is required.
/// `Zero` is used to initialize freshly allocated block buffers.
///
/// `PACKET_SIZE` is the number of coefficients that fit one vector register.
/// Types wider than a register get a packet size of 1, which callers treat
/// as "no packet access".
pub trait Scalar: Copy + Send + Sync + PartialEq + std::fmt::Debug + num_traits::Zero + 'static {
    const PACKET_SIZE: usize = if std::mem::size_of::<Self>() == 0
        || std::mem::size_of::<Self>() >= SIMD_REGISTER_BYTES
    {
        1
    } else {
        SIMD_REGISTER_BYTES / std::mem::size_of::<Self>()
    };
}

impl<T> Scalar for T where
    T: Copy + Send + Sync + PartialEq + std::fmt::Debug + num_traits::Zero + 'static
{
}
