use thiserror::Error;

/// Failures surfaced by the arithmetic core.
///
/// Every variant is a precondition violation or an out-of-memory condition;
/// none is recoverable. Callers treat any of these as fatal for the
/// enclosing cryptographic operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An operand's row or column count does not satisfy the primitive's
    /// precondition.
    #[error("operand dimensions do not match")]
    DimensionMismatch,

    /// The aligned allocator could not satisfy the request.
    #[error("aligned allocation failed")]
    AllocationFailure,

    /// A caller broke an API contract, e.g. a shift count outside `[0, 64)`
    /// or a constant-add party index that names no share.
    #[error("API contract violated")]
    ContractViolation,
}
