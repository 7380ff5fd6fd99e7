//! Randomness plumbing: the keyed deterministic PRG used to derive
//! per-party random tapes. OS entropy comes from the caller through any
//! [`rand::RngCore`]; the core never owns an entropy source.

mod prg;

pub use prg::{random_blocks_from_seed, Key, Prg, KEY_SIZE};
