//! SSE2/SSE4.1/AVX2 kernels.
//!
//! Every kernel assumes the preconditions its dispatch site checked: rows
//! start on a 16-byte (SSE) or 32-byte (AVX) boundary, and for the
//! element-wise kernels the column count is a multiple of the limb width,
//! so no trailing-bit masking is performed. The bit-identical scalar
//! kernels in [`super::scalar`] are the reference implementations.

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

/// Limbs per 128-bit vector.
const SSE_LIMBS: usize = 2;
/// Limbs per 256-bit vector.
const AVX_LIMBS: usize = 4;

#[target_feature(enable = "sse2")]
pub(super) unsafe fn xor_sse2(res: *mut u64, a: *const u64, b: *const u64, nlimbs: usize) {
    let mut width = nlimbs;
    let mut res = res;
    let mut a = a;
    let mut b = b;

    if width >= SSE_LIMBS {
        let mut mres = res as *mut __m128i;
        let mut ma = a as *const __m128i;
        let mut mb = b as *const __m128i;

        while width >= SSE_LIMBS {
            _mm_store_si128(mres, _mm_xor_si128(_mm_load_si128(ma), _mm_load_si128(mb)));
            mres = mres.add(1);
            ma = ma.add(1);
            mb = mb.add(1);
            width -= SSE_LIMBS;
        }

        res = mres as *mut u64;
        a = ma as *const u64;
        b = mb as *const u64;
    }

    for i in 0..width {
        *res.add(i) = *a.add(i) ^ *b.add(i);
    }
}

#[target_feature(enable = "avx2")]
pub(super) unsafe fn xor_avx2(res: *mut u64, a: *const u64, b: *const u64, nlimbs: usize) {
    let mut width = nlimbs;
    let mut res = res;
    let mut a = a;
    let mut b = b;

    if width >= AVX_LIMBS {
        let mut mres = res as *mut __m256i;
        let mut ma = a as *const __m256i;
        let mut mb = b as *const __m256i;

        while width >= AVX_LIMBS {
            _mm256_store_si256(
                mres,
                _mm256_xor_si256(_mm256_load_si256(ma), _mm256_load_si256(mb)),
            );
            mres = mres.add(1);
            ma = ma.add(1);
            mb = mb.add(1);
            width -= AVX_LIMBS;
        }

        res = mres as *mut u64;
        a = ma as *const u64;
        b = mb as *const u64;
    }

    for i in 0..width {
        *res.add(i) = *a.add(i) ^ *b.add(i);
    }
}

#[target_feature(enable = "sse2")]
pub(super) unsafe fn and_sse2(res: *mut u64, a: *const u64, b: *const u64, nlimbs: usize) {
    let mut width = nlimbs;
    let mut res = res;
    let mut a = a;
    let mut b = b;

    if width >= SSE_LIMBS {
        let mut mres = res as *mut __m128i;
        let mut ma = a as *const __m128i;
        let mut mb = b as *const __m128i;

        while width >= SSE_LIMBS {
            _mm_store_si128(mres, _mm_and_si128(_mm_load_si128(ma), _mm_load_si128(mb)));
            mres = mres.add(1);
            ma = ma.add(1);
            mb = mb.add(1);
            width -= SSE_LIMBS;
        }

        res = mres as *mut u64;
        a = ma as *const u64;
        b = mb as *const u64;
    }

    for i in 0..width {
        *res.add(i) = *a.add(i) & *b.add(i);
    }
}

#[target_feature(enable = "avx2")]
pub(super) unsafe fn and_avx2(res: *mut u64, a: *const u64, b: *const u64, nlimbs: usize) {
    let mut width = nlimbs;
    let mut res = res;
    let mut a = a;
    let mut b = b;

    if width >= AVX_LIMBS {
        let mut mres = res as *mut __m256i;
        let mut ma = a as *const __m256i;
        let mut mb = b as *const __m256i;

        while width >= AVX_LIMBS {
            _mm256_store_si256(
                mres,
                _mm256_and_si256(_mm256_load_si256(ma), _mm256_load_si256(mb)),
            );
            mres = mres.add(1);
            ma = ma.add(1);
            mb = mb.add(1);
            width -= AVX_LIMBS;
        }

        res = mres as *mut u64;
        a = ma as *const u64;
        b = mb as *const u64;
    }

    for i in 0..width {
        *res.add(i) = *a.add(i) & *b.add(i);
    }
}

#[target_feature(enable = "sse2")]
pub(super) unsafe fn equal_sse2(a: *const u64, b: *const u64, nlimbs: usize) -> bool {
    let mut width = nlimbs;
    let mut a = a;
    let mut b = b;

    if width >= SSE_LIMBS {
        let mut ma = a as *const __m128i;
        let mut mb = b as *const __m128i;

        while width >= SSE_LIMBS {
            let eq = _mm_cmpeq_epi8(_mm_load_si128(ma), _mm_load_si128(mb));
            if _mm_movemask_epi8(eq) != 0xffff {
                return false;
            }
            ma = ma.add(1);
            mb = mb.add(1);
            width -= SSE_LIMBS;
        }

        a = ma as *const u64;
        b = mb as *const u64;
    }

    for i in 0..width {
        if *a.add(i) != *b.add(i) {
            return false;
        }
    }
    true
}

#[target_feature(enable = "sse4.1")]
pub(super) unsafe fn equal_sse41(a: *const u64, b: *const u64, nlimbs: usize) -> bool {
    let mut width = nlimbs;
    let mut a = a;
    let mut b = b;

    if width >= SSE_LIMBS {
        let mut ma = a as *const __m128i;
        let mut mb = b as *const __m128i;

        while width >= SSE_LIMBS {
            let tmp = _mm_xor_si128(_mm_load_si128(ma), _mm_load_si128(mb));
            if _mm_testz_si128(tmp, tmp) == 0 {
                return false;
            }
            ma = ma.add(1);
            mb = mb.add(1);
            width -= SSE_LIMBS;
        }

        a = ma as *const u64;
        b = mb as *const u64;
    }

    for i in 0..width {
        if *a.add(i) != *b.add(i) {
            return false;
        }
    }
    true
}

#[target_feature(enable = "avx2")]
pub(super) unsafe fn equal_avx2(a: *const u64, b: *const u64, nlimbs: usize) -> bool {
    let mut width = nlimbs;
    let mut a = a;
    let mut b = b;

    if width >= AVX_LIMBS {
        let mut ma = a as *const __m256i;
        let mut mb = b as *const __m256i;

        while width >= AVX_LIMBS {
            let tmp = _mm256_xor_si256(_mm256_load_si256(ma), _mm256_load_si256(mb));
            if _mm256_testz_si256(tmp, tmp) == 0 {
                return false;
            }
            ma = ma.add(1);
            mb = mb.add(1);
            width -= AVX_LIMBS;
        }

        a = ma as *const u64;
        b = mb as *const u64;
    }

    for i in 0..width {
        if *a.add(i) != *b.add(i) {
            return false;
        }
    }
    true
}

/// `dst[0..len] ^= src[0..len]`, in 128-bit units.
#[target_feature(enable = "sse2")]
unsafe fn mm128_xor_region(dst: *mut __m128i, src: *const __m128i, len: usize) {
    for i in 0..len {
        _mm_store_si128(
            dst.add(i),
            _mm_xor_si128(_mm_load_si128(dst.add(i)), _mm_load_si128(src.add(i))),
        );
    }
}

/// `dst[0..len] ^= src[0..len]`, in 256-bit units.
#[target_feature(enable = "avx2")]
unsafe fn mm256_xor_region(dst: *mut __m256i, src: *const __m256i, len: usize) {
    for i in 0..len {
        _mm256_store_si256(
            dst.add(i),
            _mm256_xor_si256(_mm256_load_si256(dst.add(i)), _mm256_load_si256(src.add(i))),
        );
    }
}

/// `c ^= v * At`, consuming the index vector four bits at a time.
///
/// Each nibble of `v` selects a subset of four consecutive matrix rows to
/// fold into `c` in one pass; the row cursor advances by four rows per
/// nibble and the loop ends as soon as the remaining limb is zero. Caller
/// guarantees `At.nrows % 64 == 0` and `At.ncols % 128 == 0`.
#[target_feature(enable = "sse2")]
pub(super) unsafe fn addmul_v_sse2(
    c: *mut u64,
    v: &[u64],
    at: *const u64,
    rowstride: usize,
    nlimbs: usize,
) {
    let len = nlimbs / SSE_LIMBS;
    let mrowstride = rowstride / SSE_LIMBS;
    let mc = c as *mut __m128i;

    for (w, &limb) in v.iter().enumerate() {
        let mut idx = limb;
        let mut ma = at.add(w * 64 * rowstride) as *const __m128i;

        while idx != 0 {
            match idx & 0x0f {
                0x00 => {}

                0x01 => {
                    mm128_xor_region(mc, ma, len);
                }
                0x02 => {
                    mm128_xor_region(mc, ma.add(mrowstride), len);
                }
                0x03 => {
                    mm128_xor_region(mc, ma, len);
                    mm128_xor_region(mc, ma.add(mrowstride), len);
                }
                0x04 => {
                    mm128_xor_region(mc, ma.add(2 * mrowstride), len);
                }
                0x05 => {
                    mm128_xor_region(mc, ma, len);
                    mm128_xor_region(mc, ma.add(2 * mrowstride), len);
                }
                0x06 => {
                    mm128_xor_region(mc, ma.add(mrowstride), len);
                    mm128_xor_region(mc, ma.add(2 * mrowstride), len);
                }
                0x07 => {
                    mm128_xor_region(mc, ma, len);
                    mm128_xor_region(mc, ma.add(mrowstride), len);
                    mm128_xor_region(mc, ma.add(2 * mrowstride), len);
                }
                0x08 => {
                    mm128_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x09 => {
                    mm128_xor_region(mc, ma, len);
                    mm128_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0a => {
                    mm128_xor_region(mc, ma.add(mrowstride), len);
                    mm128_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0b => {
                    mm128_xor_region(mc, ma, len);
                    mm128_xor_region(mc, ma.add(mrowstride), len);
                    mm128_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0c => {
                    mm128_xor_region(mc, ma.add(2 * mrowstride), len);
                    mm128_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0d => {
                    mm128_xor_region(mc, ma, len);
                    mm128_xor_region(mc, ma.add(2 * mrowstride), len);
                    mm128_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0e => {
                    mm128_xor_region(mc, ma.add(mrowstride), len);
                    mm128_xor_region(mc, ma.add(2 * mrowstride), len);
                    mm128_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0f => {
                    mm128_xor_region(mc, ma, len);
                    mm128_xor_region(mc, ma.add(mrowstride), len);
                    mm128_xor_region(mc, ma.add(2 * mrowstride), len);
                    mm128_xor_region(mc, ma.add(3 * mrowstride), len);
                }

                _ => unreachable!(),
            }

            ma = ma.add(4 * mrowstride);
            idx >>= 4;
        }
    }
}

/// 256-bit variant of [`addmul_v_sse2`]; caller guarantees
/// `At.nrows % 64 == 0` and `At.ncols % 256 == 0`.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn addmul_v_avx2(
    c: *mut u64,
    v: &[u64],
    at: *const u64,
    rowstride: usize,
    nlimbs: usize,
) {
    let len = nlimbs / AVX_LIMBS;
    let mrowstride = rowstride / AVX_LIMBS;
    let mc = c as *mut __m256i;

    for (w, &limb) in v.iter().enumerate() {
        let mut idx = limb;
        let mut ma = at.add(w * 64 * rowstride) as *const __m256i;

        while idx != 0 {
            match idx & 0x0f {
                0x00 => {}

                0x01 => {
                    mm256_xor_region(mc, ma, len);
                }
                0x02 => {
                    mm256_xor_region(mc, ma.add(mrowstride), len);
                }
                0x03 => {
                    mm256_xor_region(mc, ma, len);
                    mm256_xor_region(mc, ma.add(mrowstride), len);
                }
                0x04 => {
                    mm256_xor_region(mc, ma.add(2 * mrowstride), len);
                }
                0x05 => {
                    mm256_xor_region(mc, ma, len);
                    mm256_xor_region(mc, ma.add(2 * mrowstride), len);
                }
                0x06 => {
                    mm256_xor_region(mc, ma.add(mrowstride), len);
                    mm256_xor_region(mc, ma.add(2 * mrowstride), len);
                }
                0x07 => {
                    mm256_xor_region(mc, ma, len);
                    mm256_xor_region(mc, ma.add(mrowstride), len);
                    mm256_xor_region(mc, ma.add(2 * mrowstride), len);
                }
                0x08 => {
                    mm256_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x09 => {
                    mm256_xor_region(mc, ma, len);
                    mm256_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0a => {
                    mm256_xor_region(mc, ma.add(mrowstride), len);
                    mm256_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0b => {
                    mm256_xor_region(mc, ma, len);
                    mm256_xor_region(mc, ma.add(mrowstride), len);
                    mm256_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0c => {
                    mm256_xor_region(mc, ma.add(2 * mrowstride), len);
                    mm256_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0d => {
                    mm256_xor_region(mc, ma, len);
                    mm256_xor_region(mc, ma.add(2 * mrowstride), len);
                    mm256_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0e => {
                    mm256_xor_region(mc, ma.add(mrowstride), len);
                    mm256_xor_region(mc, ma.add(2 * mrowstride), len);
                    mm256_xor_region(mc, ma.add(3 * mrowstride), len);
                }
                0x0f => {
                    mm256_xor_region(mc, ma, len);
                    mm256_xor_region(mc, ma.add(mrowstride), len);
                    mm256_xor_region(mc, ma.add(2 * mrowstride), len);
                    mm256_xor_region(mc, ma.add(3 * mrowstride), len);
                }

                _ => unreachable!(),
            }

            ma = ma.add(4 * mrowstride);
            idx >>= 4;
        }
    }
}

/// Logical right shift of a whole 128-bit register by `count < 64` bits.
#[target_feature(enable = "sse2")]
pub(crate) unsafe fn mm128_shift_right(x: __m128i, count: usize) -> __m128i {
    let cnt = _mm_cvtsi32_si128(count as i32);
    let carry_cnt = _mm_cvtsi32_si128(64 - count as i32);
    let carry = _mm_sll_epi64(_mm_srli_si128::<8>(x), carry_cnt);
    _mm_or_si128(_mm_srl_epi64(x, cnt), carry)
}

/// Logical left shift of a whole 128-bit register by `count < 64` bits.
#[target_feature(enable = "sse2")]
pub(crate) unsafe fn mm128_shift_left(x: __m128i, count: usize) -> __m128i {
    let cnt = _mm_cvtsi32_si128(count as i32);
    let carry_cnt = _mm_cvtsi32_si128(64 - count as i32);
    let carry = _mm_srl_epi64(_mm_slli_si128::<8>(x), carry_cnt);
    _mm_or_si128(_mm_sll_epi64(x, cnt), carry)
}

/// Logical right shift of a whole 256-bit register by `count < 64` bits.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn mm256_shift_right(x: __m256i, count: usize) -> __m256i {
    let cnt = _mm_cvtsi32_si128(count as i32);
    let carry_cnt = _mm_cvtsi32_si128(64 - count as i32);
    // lanes moved down one position: (w1, w2, w3, 0)
    let carry = _mm256_and_si256(
        _mm256_permute4x64_epi64::<0xf9>(x),
        _mm256_setr_epi64x(-1, -1, -1, 0),
    );
    _mm256_or_si256(_mm256_srl_epi64(x, cnt), _mm256_sll_epi64(carry, carry_cnt))
}

/// Logical left shift of a whole 256-bit register by `count < 64` bits.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn mm256_shift_left(x: __m256i, count: usize) -> __m256i {
    let cnt = _mm_cvtsi32_si128(count as i32);
    let carry_cnt = _mm_cvtsi32_si128(64 - count as i32);
    // lanes moved up one position: (0, w0, w1, w2)
    let carry = _mm256_and_si256(
        _mm256_permute4x64_epi64::<0x90>(x),
        _mm256_setr_epi64x(0, -1, -1, -1),
    );
    _mm256_or_si256(_mm256_sll_epi64(x, cnt), _mm256_srl_epi64(carry, carry_cnt))
}
