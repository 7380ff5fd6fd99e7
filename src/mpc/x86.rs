//! Single-register fast paths for the AND gates.
//!
//! When a share row fits one SIMD register the whole gate runs without
//! touching memory between steps: a 128-bit row under SSE2, a 256-bit row
//! under AVX2. All party outputs are computed into `res` before the first
//! transcript write, matching the generic path's ordering guarantee.

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use crate::algebra::x86::{
    mm128_shift_left, mm128_shift_right, mm256_shift_left, mm256_shift_right,
};
use crate::algebra::BitBlock;

use super::{View, SC_PROOF, SC_VERIFY};

#[target_feature(enable = "sse2")]
pub(super) unsafe fn and_sse2(
    res: &mut [BitBlock],
    first: &[BitBlock],
    second: &[BitBlock],
    r: &[BitBlock],
    view: &mut View,
    viewshift: usize,
) {
    let mut z = [_mm_setzero_si128(); SC_PROOF];

    for m in 0..SC_PROOF {
        let j = (m + 1) % SC_PROOF;

        let fm = _mm_load_si128(first[m].as_ptr() as *const __m128i);
        let fj = _mm_load_si128(first[j].as_ptr() as *const __m128i);
        let sm = _mm_load_si128(second[m].as_ptr() as *const __m128i);
        let sj = _mm_load_si128(second[j].as_ptr() as *const __m128i);
        let rm = _mm_load_si128(r[m].as_ptr() as *const __m128i);
        let rj = _mm_load_si128(r[j].as_ptr() as *const __m128i);

        let mut tmp1 = _mm_xor_si128(sm, sj);
        let tmp2 = _mm_and_si128(fj, sm);
        tmp1 = _mm_and_si128(tmp1, fm);
        tmp1 = _mm_xor_si128(tmp1, tmp2);
        tmp1 = _mm_xor_si128(tmp1, _mm_xor_si128(rm, rj));
        z[m] = tmp1;
    }

    for m in 0..SC_PROOF {
        _mm_store_si128(res[m].as_mut_ptr() as *mut __m128i, z[m]);

        let shifted = mm128_shift_right(z[m], viewshift);
        let vs = view.s[m].as_mut_ptr() as *mut __m128i;
        _mm_store_si128(vs, _mm_xor_si128(_mm_load_si128(vs), shifted));
    }
}

#[target_feature(enable = "avx2")]
pub(super) unsafe fn and_avx2(
    res: &mut [BitBlock],
    first: &[BitBlock],
    second: &[BitBlock],
    r: &[BitBlock],
    view: &mut View,
    viewshift: usize,
) {
    let mut z = [_mm256_setzero_si256(); SC_PROOF];

    for m in 0..SC_PROOF {
        let j = (m + 1) % SC_PROOF;

        let fm = _mm256_load_si256(first[m].as_ptr() as *const __m256i);
        let fj = _mm256_load_si256(first[j].as_ptr() as *const __m256i);
        let sm = _mm256_load_si256(second[m].as_ptr() as *const __m256i);
        let sj = _mm256_load_si256(second[j].as_ptr() as *const __m256i);
        let rm = _mm256_load_si256(r[m].as_ptr() as *const __m256i);
        let rj = _mm256_load_si256(r[j].as_ptr() as *const __m256i);

        let mut tmp1 = _mm256_xor_si256(sm, sj);
        let tmp2 = _mm256_and_si256(fj, sm);
        tmp1 = _mm256_and_si256(tmp1, fm);
        tmp1 = _mm256_xor_si256(tmp1, tmp2);
        tmp1 = _mm256_xor_si256(tmp1, _mm256_xor_si256(rm, rj));
        z[m] = tmp1;
    }

    for m in 0..SC_PROOF {
        _mm256_store_si256(res[m].as_mut_ptr() as *mut __m256i, z[m]);

        let shifted = mm256_shift_right(z[m], viewshift);
        let vs = view.s[m].as_mut_ptr() as *mut __m256i;
        _mm256_store_si256(vs, _mm256_xor_si256(_mm256_load_si256(vs), shifted));
    }
}

#[target_feature(enable = "sse2")]
pub(super) unsafe fn and_verify_sse2(
    res: &mut [BitBlock],
    first: &[BitBlock],
    second: &[BitBlock],
    r: &[BitBlock],
    view: &mut View,
    mask: &BitBlock,
    viewshift: usize,
) {
    for m in 0..SC_VERIFY - 1 {
        let j = m + 1;

        let fm = _mm_load_si128(first[m].as_ptr() as *const __m128i);
        let fj = _mm_load_si128(first[j].as_ptr() as *const __m128i);
        let sm = _mm_load_si128(second[m].as_ptr() as *const __m128i);
        let sj = _mm_load_si128(second[j].as_ptr() as *const __m128i);
        let rm = _mm_load_si128(r[m].as_ptr() as *const __m128i);
        let rj = _mm_load_si128(r[j].as_ptr() as *const __m128i);

        let mut tmp1 = _mm_xor_si128(sm, sj);
        let tmp2 = _mm_and_si128(fj, sm);
        tmp1 = _mm_and_si128(tmp1, fm);
        tmp1 = _mm_xor_si128(tmp1, tmp2);
        tmp1 = _mm_xor_si128(tmp1, _mm_xor_si128(rm, rj));

        _mm_store_si128(res[m].as_mut_ptr() as *mut __m128i, tmp1);

        let shifted = mm128_shift_right(tmp1, viewshift);
        let vs = view.s[m].as_mut_ptr() as *mut __m128i;
        _mm_store_si128(vs, _mm_xor_si128(_mm_load_si128(vs), shifted));
    }

    // recover the hidden party's output from its committed view
    let committed = _mm_load_si128(view.s[SC_VERIFY - 1].as_ptr() as *const __m128i);
    let recovered = _mm_and_si128(
        mm128_shift_left(committed, viewshift),
        _mm_load_si128(mask.as_ptr() as *const __m128i),
    );
    _mm_store_si128(res[SC_VERIFY - 1].as_mut_ptr() as *mut __m128i, recovered);
}

#[target_feature(enable = "avx2")]
pub(super) unsafe fn and_verify_avx2(
    res: &mut [BitBlock],
    first: &[BitBlock],
    second: &[BitBlock],
    r: &[BitBlock],
    view: &mut View,
    mask: &BitBlock,
    viewshift: usize,
) {
    for m in 0..SC_VERIFY - 1 {
        let j = m + 1;

        let fm = _mm256_load_si256(first[m].as_ptr() as *const __m256i);
        let fj = _mm256_load_si256(first[j].as_ptr() as *const __m256i);
        let sm = _mm256_load_si256(second[m].as_ptr() as *const __m256i);
        let sj = _mm256_load_si256(second[j].as_ptr() as *const __m256i);
        let rm = _mm256_load_si256(r[m].as_ptr() as *const __m256i);
        let rj = _mm256_load_si256(r[j].as_ptr() as *const __m256i);

        let mut tmp1 = _mm256_xor_si256(sm, sj);
        let tmp2 = _mm256_and_si256(fj, sm);
        tmp1 = _mm256_and_si256(tmp1, fm);
        tmp1 = _mm256_xor_si256(tmp1, tmp2);
        tmp1 = _mm256_xor_si256(tmp1, _mm256_xor_si256(rm, rj));

        _mm256_store_si256(res[m].as_mut_ptr() as *mut __m256i, tmp1);

        let shifted = mm256_shift_right(tmp1, viewshift);
        let vs = view.s[m].as_mut_ptr() as *mut __m256i;
        _mm256_store_si256(vs, _mm256_xor_si256(_mm256_load_si256(vs), shifted));
    }

    let committed = _mm256_load_si256(view.s[SC_VERIFY - 1].as_ptr() as *const __m256i);
    let recovered = _mm256_and_si256(
        mm256_shift_left(committed, viewshift),
        _mm256_load_si256(mask.as_ptr() as *const __m256i),
    );
    _mm256_store_si256(res[SC_VERIFY - 1].as_mut_ptr() as *mut __m256i, recovered);
}
