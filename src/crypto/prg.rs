use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use rand::{CryptoRng, RngCore};
use rand_core::impls;

use crate::algebra::{self, BitBlock};
use crate::Error;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

pub const KEY_SIZE: usize = 16;

pub type Key = [u8; KEY_SIZE];

/// Keyed pseudorandom byte stream: AES-128 in counter mode with a zero
/// nonce. The stream is deterministic given the seed, which is what the
/// "in-head" parties rely on to replay their random tapes.
pub struct Prg(Aes128Ctr);

impl Prg {
    pub fn new(key: &Key) -> Self {
        let nonce = [0u8; 16];
        Prg(Aes128Ctr::new(
            GenericArray::from_slice(key),
            GenericArray::from_slice(&nonce),
        ))
    }
}

impl RngCore for Prg {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        // the keystream XORed over zeroes is the keystream itself
        for byte in dest.iter_mut() {
            *byte = 0;
        }
        self.0.apply_keystream(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }

    fn next_u32(&mut self) -> u32 {
        impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        impls::next_u64_via_fill(self)
    }
}

impl CryptoRng for Prg {}

/// Derives `count` parallel random row vectors from one 128-bit seed.
pub fn random_blocks_from_seed(
    key: &Key,
    count: usize,
    ncols: usize,
) -> Result<Vec<BitBlock>, Error> {
    let mut prg = Prg::new(key);
    algebra::random_blocks(count, ncols, &mut prg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_is_deterministic() {
        let key: Key = *b"0123456789abcdef";
        let mut a = Prg::new(&key);
        let mut b = Prg::new(&key);

        let mut out_a = [0u8; 64];
        let mut out_b = [0u8; 64];
        a.fill_bytes(&mut out_a);
        b.fill_bytes(&mut out_b);
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn stream_continues_across_calls() {
        let key: Key = [7u8; KEY_SIZE];
        let mut whole = Prg::new(&key);
        let mut split = Prg::new(&key);

        let mut expect = [0u8; 48];
        whole.fill_bytes(&mut expect);

        let mut parts = [0u8; 48];
        split.fill_bytes(&mut parts[..16]);
        split.fill_bytes(&mut parts[16..]);
        assert_eq!(parts, expect);
    }

    #[test]
    fn distinct_keys_diverge() {
        let mut a = Prg::new(&[0u8; KEY_SIZE]);
        let mut b = Prg::new(&[1u8; KEY_SIZE]);

        let mut out_a = [0u8; 32];
        let mut out_b = [0u8; 32];
        a.fill_bytes(&mut out_a);
        b.fill_bytes(&mut out_b);
        assert_ne!(out_a, out_b);
    }

    #[test]
    fn seeded_blocks_reproduce() {
        let key: Key = [42u8; KEY_SIZE];
        let first = random_blocks_from_seed(&key, 3, 200).unwrap();
        let second = random_blocks_from_seed(&key, 3, 200).unwrap();
        assert_eq!(first, second);
        // successive draws from one stream must differ
        assert_ne!(first[0], first[1]);
    }
}
