//! Share-lifted GF(2) operations and the communication-aware AND gates.
//!
//! The simulated protocol runs [`SC_PROOF`] parties; a [`SharedVector`]
//! holds one row vector per party whose XOR is the secret. Linear
//! operations lift share-wise. The one nonlinear operation, [`and`],
//! follows the replicated-sharing identity
//!
//! ```text
//! z[m] = x[m]&y[m] ^ x[m+1]&y[m] ^ x[m]&y[m+1] ^ r[m] ^ r[m+1]
//! ```
//!
//! and records each party's output, shifted to its wire position, into
//! that party's [`View`] transcript. [`and_verify`] replays the same gate
//! over the [`SC_VERIFY`] opened parties and recovers the hidden party's
//! output from its committed view.

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86;

use std::ops::{Index, IndexMut};

use rand::RngCore;

use crate::algebra::{self, BitBlock, BitMatrix, WORD_SIZE_BITS};
use crate::Error;

/// Simulated parties in proof mode.
pub const SC_PROOF: usize = 3;
/// Opened parties in verify mode.
pub const SC_VERIFY: usize = 2;

/// An additive 3-of-3 sharing: three equally-shaped row vectors, one per
/// party, XORing to the secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedVector {
    shares: [BitBlock; SC_PROOF],
}

impl SharedVector {
    /// All-zero sharing (of the zero vector).
    pub fn zero(ncols: usize) -> Result<Self, Error> {
        Ok(SharedVector {
            shares: [
                BitBlock::zero(ncols)?,
                BitBlock::zero(ncols)?,
                BitBlock::zero(ncols)?,
            ],
        })
    }

    /// Three independently random shares (of an undetermined secret).
    pub fn random<R: RngCore>(ncols: usize, rng: &mut R) -> Result<Self, Error> {
        let mut shares = Self::zero(ncols)?;
        for share in shares.shares.iter_mut() {
            share.randomize(rng);
        }
        Ok(shares)
    }

    /// Shares `v`: two uniform shares and a third derived so the XOR of
    /// all three is `v`.
    pub fn share<R: RngCore>(v: &BitBlock, rng: &mut R) -> Result<Self, Error> {
        let mut shared = Self::zero(v.ncols())?;
        let [s0, s1, s2] = &mut shared.shares;
        s0.randomize(rng);
        s1.randomize(rng);
        algebra::xor_into(s2, s0, s1)?;
        s2.xor_assign(v)?;
        Ok(shared)
    }

    /// The trivial sharing `(v, v, v)` used for public values.
    pub fn plain(v: &BitBlock) -> Self {
        SharedVector {
            shares: [v.clone(), v.clone(), v.clone()],
        }
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.shares[0].ncols()
    }

    #[inline]
    pub fn as_slice(&self) -> &[BitBlock] {
        &self.shares
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [BitBlock] {
        &mut self.shares
    }

    /// XOR of all three shares.
    pub fn reconstruct(&self) -> Result<BitBlock, Error> {
        reconstruct(&self.shares)
    }
}

impl Index<usize> for SharedVector {
    type Output = BitBlock;

    fn index(&self, party: usize) -> &BitBlock {
        &self.shares[party]
    }
}

impl IndexMut<usize> for SharedVector {
    fn index_mut(&mut self, party: usize) -> &mut BitBlock {
        &mut self.shares[party]
    }
}

/// Per-party transcript of AND-gate outputs for one round.
///
/// Owned by the caller; the gates only XOR into the pre-allocated rows.
/// In verify mode only the first [`SC_VERIFY`] entries are touched: slot 0
/// is the verifier's recomputed transcript, slot 1 the committed view of
/// the last opened party.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    pub s: [BitBlock; SC_PROOF],
}

impl View {
    pub fn new(ncols: usize) -> Result<View, Error> {
        Ok(View {
            s: [
                BitBlock::zero(ncols)?,
                BitBlock::zero(ncols)?,
                BitBlock::zero(ncols)?,
            ],
        })
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.s[0].ncols()
    }
}

fn check_parallel(shares: &[BitBlock], sc: usize, ncols: usize) -> Result<(), Error> {
    if shares.len() < sc {
        return Err(Error::DimensionMismatch);
    }
    for share in &shares[..sc] {
        if share.ncols() != ncols {
            return Err(Error::DimensionMismatch);
        }
    }
    Ok(())
}

/// Share-wise `res = first ^ second` over `res.len()` parties.
pub fn xor(res: &mut [BitBlock], first: &[BitBlock], second: &[BitBlock]) -> Result<(), Error> {
    if first.len() < res.len() || second.len() < res.len() {
        return Err(Error::DimensionMismatch);
    }
    for (i, r) in res.iter_mut().enumerate() {
        algebra::xor_into(r, &first[i], &second[i])?;
    }
    Ok(())
}

/// Share-wise AND with one public operand.
pub fn and_const(res: &mut [BitBlock], first: &[BitBlock], second: &BitBlock) -> Result<(), Error> {
    if first.len() < res.len() {
        return Err(Error::DimensionMismatch);
    }
    for (i, r) in res.iter_mut().enumerate() {
        algebra::and_into(r, &first[i], second)?;
    }
    Ok(())
}

/// Share-wise logical right shift.
pub fn shift_right(res: &mut [BitBlock], val: &[BitBlock], count: usize) -> Result<(), Error> {
    if val.len() < res.len() {
        return Err(Error::DimensionMismatch);
    }
    for (i, r) in res.iter_mut().enumerate() {
        algebra::shift_right_into(r, &val[i], count)?;
    }
    Ok(())
}

/// Share-wise logical left shift.
pub fn shift_left(res: &mut [BitBlock], val: &[BitBlock], count: usize) -> Result<(), Error> {
    if val.len() < res.len() {
        return Err(Error::DimensionMismatch);
    }
    for (i, r) in res.iter_mut().enumerate() {
        algebra::shift_left_into(r, &val[i], count)?;
    }
    Ok(())
}

/// XORs a public constant into exactly one share, in place.
///
/// `party == 0` selects the first share and `party == shares.len()` the
/// last one; anything in between names no share and is rejected.
pub fn const_add(shares: &mut [BitBlock], constant: &BitBlock, party: usize) -> Result<(), Error> {
    let sc = shares.len();
    if party == 0 {
        shares[0].xor_assign(constant)
    } else if party == sc {
        shares[sc - 1].xor_assign(constant)
    } else {
        Err(Error::ContractViolation)
    }
}

/// Share-wise `res = vector * At` for a public matrix.
pub fn const_mat_mul(
    res: &mut [BitBlock],
    matrix: &BitMatrix,
    vector: &[BitBlock],
) -> Result<(), Error> {
    if vector.len() < res.len() {
        return Err(Error::DimensionMismatch);
    }
    for (i, r) in res.iter_mut().enumerate() {
        algebra::mul_v_into(r, &vector[i], matrix)?;
    }
    Ok(())
}

/// Share-wise `res ^= vector * At` for a public matrix.
pub fn const_addmat_mul(
    res: &mut [BitBlock],
    matrix: &BitMatrix,
    vector: &[BitBlock],
) -> Result<(), Error> {
    if vector.len() < res.len() {
        return Err(Error::DimensionMismatch);
    }
    for (i, r) in res.iter_mut().enumerate() {
        algebra::addmul_v_into(r, &vector[i], matrix)?;
    }
    Ok(())
}

/// Share-wise copy.
pub fn copy(out: &mut [BitBlock], inp: &[BitBlock]) -> Result<(), Error> {
    if inp.len() < out.len() {
        return Err(Error::DimensionMismatch);
    }
    for (i, o) in out.iter_mut().enumerate() {
        o.copy_from(&inp[i])?;
    }
    Ok(())
}

/// `shares[0] ^ shares[1] ^ shares[2]`.
pub fn reconstruct(shares: &[BitBlock]) -> Result<BitBlock, Error> {
    if shares.len() != SC_PROOF {
        return Err(Error::DimensionMismatch);
    }
    let mut dst = algebra::xor(&shares[0], &shares[1])?;
    dst.xor_assign(&shares[2])?;
    Ok(dst)
}

/// The MPC AND gate, proof mode.
///
/// Computes every party's output share of `x & y` mixed with the partner
/// shares and fresh randomness, then XORs each output, right-shifted by
/// `viewshift`, into that party's transcript row. All outputs land in
/// `res` before the first transcript write; callers may alias view rows
/// with buffers they later read, so the two phases must not interleave.
pub fn and(
    res: &mut [BitBlock],
    first: &[BitBlock],
    second: &[BitBlock],
    r: &[BitBlock],
    view: &mut View,
    viewshift: usize,
    buffer: &mut BitBlock,
) -> Result<(), Error> {
    let ncols = first.first().map(BitBlock::ncols).ok_or(Error::DimensionMismatch)?;
    check_parallel(res, SC_PROOF, ncols)?;
    check_parallel(first, SC_PROOF, ncols)?;
    check_parallel(second, SC_PROOF, ncols)?;
    check_parallel(r, SC_PROOF, ncols)?;
    check_parallel(&view.s, SC_PROOF, ncols)?;
    if buffer.ncols() != ncols {
        return Err(Error::DimensionMismatch);
    }
    if viewshift >= WORD_SIZE_BITS {
        return Err(Error::ContractViolation);
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let cpu = algebra::dispatch::features();
        if cpu.avx2 && ncols == 256 {
            unsafe { x86::and_avx2(res, first, second, r, view, viewshift) };
            return Ok(());
        }
        if cpu.sse2 && ncols == 128 {
            unsafe { x86::and_sse2(res, first, second, r, view, viewshift) };
            return Ok(());
        }
    }

    for m in 0..SC_PROOF {
        let j = (m + 1) % SC_PROOF;

        algebra::and_into(&mut res[m], &first[m], &second[m])?;

        algebra::and_into(buffer, &first[j], &second[m])?;
        res[m].xor_assign(buffer)?;

        algebra::and_into(buffer, &first[m], &second[j])?;
        res[m].xor_assign(buffer)?;

        res[m].xor_assign(&r[m])?;
        res[m].xor_assign(&r[j])?;
    }

    for m in 0..SC_PROOF {
        algebra::shift_right_into(buffer, &res[m], viewshift)?;
        view.s[m].xor_assign(buffer)?;
    }
    Ok(())
}

/// The MPC AND gate, verify mode.
///
/// Replays the gate over the opened pair, XORing the recomputed output
/// into the verifier's transcript row, and recovers the hidden party's
/// output as `(view.s[1] << viewshift) & mask`. Whether the recomputed
/// transcript matches the committed one is judged by the surrounding
/// transcript logic, not here.
pub fn and_verify(
    res: &mut [BitBlock],
    first: &[BitBlock],
    second: &[BitBlock],
    r: &[BitBlock],
    view: &mut View,
    mask: &BitBlock,
    viewshift: usize,
    buffer: &mut BitBlock,
) -> Result<(), Error> {
    let ncols = first.first().map(BitBlock::ncols).ok_or(Error::DimensionMismatch)?;
    check_parallel(res, SC_VERIFY, ncols)?;
    check_parallel(first, SC_VERIFY, ncols)?;
    check_parallel(second, SC_VERIFY, ncols)?;
    check_parallel(r, SC_VERIFY, ncols)?;
    check_parallel(&view.s, SC_VERIFY, ncols)?;
    if buffer.ncols() != ncols || mask.ncols() != ncols {
        return Err(Error::DimensionMismatch);
    }
    if viewshift >= WORD_SIZE_BITS {
        return Err(Error::ContractViolation);
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let cpu = algebra::dispatch::features();
        if cpu.avx2 && ncols == 256 {
            unsafe { x86::and_verify_avx2(res, first, second, r, view, mask, viewshift) };
            return Ok(());
        }
        if cpu.sse2 && ncols == 128 {
            unsafe { x86::and_verify_sse2(res, first, second, r, view, mask, viewshift) };
            return Ok(());
        }
    }

    for m in 0..SC_VERIFY - 1 {
        let j = m + 1;

        algebra::and_into(&mut res[m], &first[m], &second[m])?;

        algebra::and_into(buffer, &first[j], &second[m])?;
        res[m].xor_assign(buffer)?;

        algebra::and_into(buffer, &first[m], &second[j])?;
        res[m].xor_assign(buffer)?;

        res[m].xor_assign(&r[m])?;
        res[m].xor_assign(&r[j])?;
    }

    for m in 0..SC_VERIFY - 1 {
        algebra::shift_right_into(buffer, &res[m], viewshift)?;
        view.s[m].xor_assign(buffer)?;
    }

    algebra::shift_left_into(&mut res[SC_VERIFY - 1], &view.s[SC_VERIFY - 1], viewshift)?;
    res[SC_VERIFY - 1].and_assign(mask)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::thread_rng;

    use crate::crypto::{Prg, KEY_SIZE};

    fn ones(ncols: usize) -> BitBlock {
        let limbs = vec![!0u64; (ncols + 63) / 64];
        BitBlock::from_limbs(ncols, &limbs).unwrap()
    }

    // the gate identity evaluated with the plain primitives
    fn reference_outputs(
        first: &[BitBlock],
        second: &[BitBlock],
        r: &[BitBlock],
    ) -> Vec<BitBlock> {
        (0..SC_PROOF)
            .map(|m| {
                let j = (m + 1) % SC_PROOF;
                let mut z = algebra::and(&first[m], &second[m]).unwrap();
                z.xor_assign(&algebra::and(&first[j], &second[m]).unwrap())
                    .unwrap();
                z.xor_assign(&algebra::and(&first[m], &second[j]).unwrap())
                    .unwrap();
                z.xor_assign(&r[m]).unwrap();
                z.xor_assign(&r[j]).unwrap();
                z
            })
            .collect()
    }

    #[test]
    fn sharing_reconstructs() {
        let mut rng = thread_rng();
        for &ncols in &[32usize, 64, 100, 128, 256, 1024] {
            let v = BitBlock::random(ncols, &mut rng).unwrap();
            let shared = SharedVector::share(&v, &mut rng).unwrap();
            assert_eq!(shared.reconstruct().unwrap(), v, "ncols = {}", ncols);

            let plain = SharedVector::plain(&v);
            assert_eq!(plain.reconstruct().unwrap(), v);
        }
    }

    #[test]
    fn share_bits_are_uniform() {
        let mut prg = Prg::new(&[3u8; KEY_SIZE]);
        let v = BitBlock::from_limbs(32, &[0xdead_beef]).unwrap();

        const SAMPLES: usize = 20_000;
        let mut counts = [[0usize; 32]; 2];
        for _ in 0..SAMPLES {
            let shared = SharedVector::share(&v, &mut prg).unwrap();
            assert_eq!(shared.reconstruct().unwrap(), v);
            for (party, share) in [&shared[0], &shared[1]].iter().enumerate() {
                for bit in 0..32 {
                    if share.bit(bit) {
                        counts[party][bit] += 1;
                    }
                }
            }
        }

        for (party, bits) in counts.iter().enumerate() {
            for (bit, &count) in bits.iter().enumerate() {
                let freq = count as f64 / SAMPLES as f64;
                assert!(
                    (0.48..=0.52).contains(&freq),
                    "party {} bit {} frequency {}",
                    party,
                    bit,
                    freq
                );
            }
        }
    }

    #[test]
    fn lifted_linear_ops_commute_with_reconstruction() {
        let mut rng = thread_rng();
        let ncols = 128;

        let xv = BitBlock::random(ncols, &mut rng).unwrap();
        let yv = BitBlock::random(ncols, &mut rng).unwrap();
        let x = SharedVector::share(&xv, &mut rng).unwrap();
        let y = SharedVector::share(&yv, &mut rng).unwrap();

        let mut sum = SharedVector::zero(ncols).unwrap();
        xor(sum.as_mut_slice(), x.as_slice(), y.as_slice()).unwrap();
        assert_eq!(
            sum.reconstruct().unwrap(),
            algebra::xor(&xv, &yv).unwrap()
        );

        let k = BitBlock::random(ncols, &mut rng).unwrap();
        let mut masked = SharedVector::zero(ncols).unwrap();
        and_const(masked.as_mut_slice(), x.as_slice(), &k).unwrap();
        assert_eq!(
            masked.reconstruct().unwrap(),
            algebra::and(&xv, &k).unwrap()
        );

        let mut shifted = SharedVector::zero(ncols).unwrap();
        shift_right(shifted.as_mut_slice(), x.as_slice(), 7).unwrap();
        let mut expect = BitBlock::zero(ncols).unwrap();
        algebra::shift_right_into(&mut expect, &xv, 7).unwrap();
        assert_eq!(shifted.reconstruct().unwrap(), expect);

        shift_left(shifted.as_mut_slice(), x.as_slice(), 11).unwrap();
        algebra::shift_left_into(&mut expect, &xv, 11).unwrap();
        assert_eq!(shifted.reconstruct().unwrap(), expect);
    }

    #[test]
    fn lifted_matrix_mul_commutes_with_reconstruction() {
        let mut rng = thread_rng();
        let v = BitBlock::random(128, &mut rng).unwrap();
        let shared = SharedVector::share(&v, &mut rng).unwrap();
        let at = BitMatrix::random(128, 256, &mut rng).unwrap();

        let mut prod = SharedVector::zero(256).unwrap();
        const_mat_mul(prod.as_mut_slice(), &at, shared.as_slice()).unwrap();
        assert_eq!(
            prod.reconstruct().unwrap(),
            algebra::mul_v(&v, &at).unwrap()
        );

        let acc = SharedVector::random(256, &mut rng).unwrap();
        let before = acc.reconstruct().unwrap();
        let mut fused = acc.clone();
        const_addmat_mul(fused.as_mut_slice(), &at, shared.as_slice()).unwrap();
        let mut expect = algebra::mul_v(&v, &at).unwrap();
        expect.xor_assign(&before).unwrap();
        assert_eq!(fused.reconstruct().unwrap(), expect);
    }

    #[test]
    fn const_add_targets_one_share() {
        let mut rng = thread_rng();
        let v = BitBlock::random(96, &mut rng).unwrap();
        let k = BitBlock::random(96, &mut rng).unwrap();

        let mut shared = SharedVector::share(&v, &mut rng).unwrap();
        const_add(shared.as_mut_slice(), &k, 0).unwrap();
        assert_eq!(
            shared.reconstruct().unwrap(),
            algebra::xor(&v, &k).unwrap()
        );

        let mut shared = SharedVector::share(&v, &mut rng).unwrap();
        const_add(shared.as_mut_slice(), &k, SC_PROOF).unwrap();
        assert_eq!(
            shared.reconstruct().unwrap(),
            algebra::xor(&v, &k).unwrap()
        );

        let mut shared = SharedVector::share(&v, &mut rng).unwrap();
        assert_eq!(
            const_add(shared.as_mut_slice(), &k, 1),
            Err(Error::ContractViolation)
        );
        assert_eq!(
            const_add(shared.as_mut_slice(), &k, 2),
            Err(Error::ContractViolation)
        );
    }

    #[test]
    fn and_gate_reconstructs_product() {
        let mut rng = thread_rng();
        // 128 and 256 exercise the single-register paths where available
        for &ncols in &[64usize, 128, 192, 256, 1024] {
            for &viewshift in &[0usize, 3, 13] {
                let xv = BitBlock::random(ncols, &mut rng).unwrap();
                let yv = BitBlock::random(ncols, &mut rng).unwrap();
                let x = SharedVector::share(&xv, &mut rng).unwrap();
                let y = SharedVector::share(&yv, &mut rng).unwrap();
                let r = algebra::random_blocks(SC_PROOF, ncols, &mut rng).unwrap();

                let mut res = algebra::alloc_blocks(SC_PROOF, ncols).unwrap();
                let mut view = View::new(ncols).unwrap();
                let mut buffer = BitBlock::zero(ncols).unwrap();

                and(
                    &mut res,
                    x.as_slice(),
                    y.as_slice(),
                    &r,
                    &mut view,
                    viewshift,
                    &mut buffer,
                )
                .unwrap();

                // outputs agree with the gate identity
                let expect = reference_outputs(x.as_slice(), y.as_slice(), &r);
                for m in 0..SC_PROOF {
                    assert_eq!(
                        res[m], expect[m],
                        "party {}, ncols = {}, shift = {}",
                        m, ncols, viewshift
                    );
                }

                // transcript rows hold the shifted outputs
                let mut shifted = BitBlock::zero(ncols).unwrap();
                for m in 0..SC_PROOF {
                    algebra::shift_right_into(&mut shifted, &res[m], viewshift).unwrap();
                    assert_eq!(view.s[m], shifted);
                }

                // randomness cancels in the reconstruction
                assert_eq!(
                    reconstruct(&res).unwrap(),
                    algebra::and(&xv, &yv).unwrap(),
                    "ncols = {}, shift = {}",
                    ncols,
                    viewshift
                );
            }
        }
    }

    #[test]
    fn verify_gate_matches_proof_transcript() {
        let mut rng = thread_rng();
        for &ncols in &[128usize, 256, 1024] {
            let viewshift = 2;

            let xv = BitBlock::from_limbs(ncols, &vec![0xaaaa_aaaa_aaaa_aaaa; ncols / 64]).unwrap();
            let yv = BitBlock::from_limbs(ncols, &vec![0x5555_5555_5555_5555; ncols / 64]).unwrap();
            let x = SharedVector::share(&xv, &mut rng).unwrap();
            let y = SharedVector::share(&yv, &mut rng).unwrap();
            let r = algebra::random_blocks(SC_PROOF, ncols, &mut rng).unwrap();

            // prover side
            let mut z = algebra::alloc_blocks(SC_PROOF, ncols).unwrap();
            let mut proof_view = View::new(ncols).unwrap();
            let mut buffer = BitBlock::zero(ncols).unwrap();
            and(
                &mut z,
                x.as_slice(),
                y.as_slice(),
                &r,
                &mut proof_view,
                viewshift,
                &mut buffer,
            )
            .unwrap();

            // verifier side: opened parties 0 and 1, slot 1 of the view is
            // the committed transcript of the last opened party
            let mut verify_view = View::new(ncols).unwrap();
            verify_view.s[1].copy_from(&proof_view.s[1]).unwrap();

            let mut recomputed = algebra::alloc_blocks(SC_VERIFY, ncols).unwrap();
            let mask = ones(ncols);
            and_verify(
                &mut recomputed,
                x.as_slice(),
                y.as_slice(),
                &r,
                &mut verify_view,
                &mask,
                viewshift,
                &mut buffer,
            )
            .unwrap();

            // the opened party's output and transcript row replay exactly
            assert_eq!(recomputed[0], z[0], "ncols = {}", ncols);
            assert_eq!(verify_view.s[0], proof_view.s[0]);

            // the hidden output comes back modulo the bits the shift drops
            let mut down = BitBlock::zero(ncols).unwrap();
            let mut expect = BitBlock::zero(ncols).unwrap();
            algebra::shift_right_into(&mut down, &z[1], viewshift).unwrap();
            algebra::shift_left_into(&mut expect, &down, viewshift).unwrap();
            assert_eq!(recomputed[1], expect, "ncols = {}", ncols);
        }
    }

    #[test]
    fn gate_rejects_bad_arguments() {
        let mut rng = thread_rng();
        let ncols = 128;

        let x = SharedVector::random(ncols, &mut rng).unwrap();
        let y = SharedVector::random(ncols, &mut rng).unwrap();
        let r = algebra::random_blocks(SC_PROOF, ncols, &mut rng).unwrap();
        let mut view = View::new(ncols).unwrap();
        let mut buffer = BitBlock::zero(ncols).unwrap();

        let mut narrow = algebra::alloc_blocks(SC_PROOF, 64).unwrap();
        assert_eq!(
            and(
                &mut narrow,
                x.as_slice(),
                y.as_slice(),
                &r,
                &mut view,
                0,
                &mut buffer
            ),
            Err(Error::DimensionMismatch)
        );

        let mut res = algebra::alloc_blocks(SC_PROOF, ncols).unwrap();
        assert_eq!(
            and(
                &mut res,
                x.as_slice(),
                y.as_slice(),
                &r,
                &mut view,
                64,
                &mut buffer
            ),
            Err(Error::ContractViolation)
        );
    }
}
