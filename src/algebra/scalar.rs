//! Portable kernels.
//!
//! These are the fallback implementations of every primitive and the
//! reference the SIMD kernels are tested against. Kernels take raw limb
//! pointers behind the same signature as the SIMD variants, so the scalar
//! element-wise paths tolerate `res` aliasing an input. The final limb is
//! masked with `high_bitmask` here; the SIMD kernels skip the mask because
//! dispatch only hands them rows whose trailing bits are already zero.

/// `res = a ^ b` over `nlimbs` limbs, final limb masked.
///
/// Safety: all pointers must be valid for `nlimbs` limbs; `res` may alias
/// `a` or `b`.
pub(super) unsafe fn xor(res: *mut u64, a: *const u64, b: *const u64, nlimbs: usize, mask: u64) {
    for i in 0..nlimbs {
        *res.add(i) = *a.add(i) ^ *b.add(i);
    }
    *res.add(nlimbs - 1) &= mask;
}

/// `res = a & b` over `nlimbs` limbs, final limb masked.
///
/// Safety: as for [`xor`].
pub(super) unsafe fn and(res: *mut u64, a: *const u64, b: *const u64, nlimbs: usize, mask: u64) {
    for i in 0..nlimbs {
        *res.add(i) = *a.add(i) & *b.add(i);
    }
    *res.add(nlimbs - 1) &= mask;
}

/// `c ^= v * At` where `At` is the transposed matrix stored row-major with
/// `rowstride` limbs per row and `nlimbs` payload limbs per row.
///
/// Walks the index vector bit by bit, XORing row `i` of `At` into `c` for
/// every set bit `i` of `v`. Trailing bits of `v` above its column count
/// are zero, so the row offset never passes `At`'s last row.
///
/// Safety: `c` valid for `nlimbs` limbs, `at` valid for the whole matrix
/// payload, `c` must not alias `at`.
pub(super) unsafe fn addmul_v(
    c: *mut u64,
    v: &[u64],
    at: *const u64,
    rowstride: usize,
    nlimbs: usize,
    mask: u64,
) {
    for (w, &limb) in v.iter().enumerate() {
        let mut idx = limb;
        let mut off = w * 64 * rowstride;

        while idx != 0 {
            if idx & 0x1 != 0 {
                let row = at.add(off);
                for i in 0..nlimbs - 1 {
                    *c.add(i) ^= *row.add(i);
                }
                *c.add(nlimbs - 1) = (*c.add(nlimbs - 1) ^ *row.add(nlimbs - 1)) & mask;
            }

            off += rowstride;
            idx >>= 1;
        }
    }
}

/// Limb-wise equality over a single row.
///
/// Safety: both pointers valid for `nlimbs` limbs.
pub(super) unsafe fn equal(a: *const u64, b: *const u64, nlimbs: usize) -> bool {
    for i in 0..nlimbs {
        if *a.add(i) != *b.add(i) {
            return false;
        }
    }
    true
}
