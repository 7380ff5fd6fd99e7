//! Arithmetic core of the Fish and Begol signature schemes.
//!
//! Fish and Begol are ZKBoo-style signatures: a LowMC encryption is
//! evaluated "in the head" under a 3-party MPC protocol, and two of the
//! three party views are opened to the verifier. This crate provides the
//! two layers everything above is built on:
//!
//! - [`algebra`] — cache-line-aligned GF(2) row vectors and matrices with
//!   scalar/SSE/AVX2 kernels selected at runtime: XOR, AND, whole-row
//!   shifts, vector-times-matrix products and equality.
//! - [`mpc`] — the 3-share lifting of those primitives, additive sharing
//!   and reconstruction, and the communication-aware AND gate in proof
//!   (3 shares) and verify (2 shares + committed view) modes.
//!
//! [`crypto`] supplies the keyed AES-CTR stream the per-party random
//! tapes are drawn from. Key schedules, transcript hashing, serialization
//! and the outer signer live in the layers above.
//!
//! Nothing here synchronizes: values are plain owned data, and callers may
//! work on disjoint objects from any number of threads.

pub mod algebra;
pub mod crypto;
pub mod mpc;

mod error;

pub use error::Error;
