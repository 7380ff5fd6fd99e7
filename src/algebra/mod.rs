//! Fixed-width GF(2) row vectors and matrices.
//!
//! The types here back the bit-sliced LowMC state: a [`BitBlock`] is a
//! single 1×n row vector, a [`BitMatrix`] an m×n matrix with the same
//! per-row layout. Rows live in 64-bit limbs with little-endian bit order
//! (bit `i` of the row is bit `i % 64` of limb `i / 64`), padded so every
//! row starts on a 16-byte boundary, or a 32-byte boundary once a row
//! spans 256 bits or more. Bits of the final limb above the column count
//! read as zero after every primitive; the SIMD kernels depend on that
//! invariant holding on their inputs and skip the trailing mask.
//!
//! Each primitive dispatches at call time to a scalar, SSE, or AVX2 kernel
//! based on the memoized CPU probes and the operand shape.

pub(crate) mod dispatch;
mod scalar;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub(crate) mod x86;

use std::alloc::{self, Layout};
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::slice;

use rand::RngCore;

use crate::Error;

pub(crate) const WORD_SIZE_BITS: usize = 64;

// Row limb count at which rows are padded and aligned for 256-bit loads
// instead of 128-bit ones.
const AVX_BOUND_LIMBS: usize = 256 / WORD_SIZE_BITS;

fn limb_count(ncols: usize) -> usize {
    (ncols + WORD_SIZE_BITS - 1) / WORD_SIZE_BITS
}

fn row_stride(nlimbs: usize) -> usize {
    if nlimbs >= AVX_BOUND_LIMBS {
        (nlimbs + 3) & !3
    } else {
        (nlimbs + 1) & !1
    }
}

fn row_alignment(nlimbs: usize) -> usize {
    if nlimbs >= AVX_BOUND_LIMBS {
        32
    } else {
        16
    }
}

fn high_bitmask(ncols: usize) -> u64 {
    match ncols % WORD_SIZE_BITS {
        0 => !0u64,
        r => (1u64 << r) - 1,
    }
}

/// Owner of one aligned, zero-initialized limb buffer.
///
/// All row storage goes through this type, which is what makes the aligned
/// SIMD loads in the kernels sound and gives every block a single
/// allocation and a single free.
struct AlignedLimbs {
    ptr: NonNull<u64>,
    limbs: usize,
    layout: Layout,
}

impl AlignedLimbs {
    fn zeroed(limbs: usize, align: usize) -> Result<Self, Error> {
        debug_assert!(limbs > 0);
        let layout = Layout::from_size_align(limbs * mem::size_of::<u64>(), align)
            .map_err(|_| Error::ContractViolation)?;
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut u64).ok_or(Error::AllocationFailure)?;
        Ok(AlignedLimbs { ptr, limbs, layout })
    }

    #[inline]
    fn as_slice(&self) -> &[u64] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.limbs) }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [u64] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.limbs) }
    }

    #[inline]
    fn as_ptr(&self) -> *const u64 {
        self.ptr.as_ptr()
    }

    #[inline]
    fn as_mut_ptr(&mut self) -> *mut u64 {
        self.ptr.as_ptr()
    }
}

impl Drop for AlignedLimbs {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, self.layout) };
    }
}

impl Clone for AlignedLimbs {
    fn clone(&self) -> Self {
        let mut copy = match AlignedLimbs::zeroed(self.limbs, self.layout.align()) {
            Ok(copy) => copy,
            Err(_) => alloc::handle_alloc_error(self.layout),
        };
        copy.as_mut_slice().copy_from_slice(self.as_slice());
        copy
    }
}

unsafe impl Send for AlignedLimbs {}
unsafe impl Sync for AlignedLimbs {}

/// A 1×n GF(2) row vector.
pub struct BitBlock {
    storage: AlignedLimbs,
    ncols: usize,
    nlimbs: usize,
    high_bitmask: u64,
}

impl BitBlock {
    /// Allocates an all-zero row vector of `ncols` bits.
    pub fn zero(ncols: usize) -> Result<Self, Error> {
        if ncols == 0 {
            return Err(Error::DimensionMismatch);
        }
        let nlimbs = limb_count(ncols);
        let storage = AlignedLimbs::zeroed(row_stride(nlimbs), row_alignment(nlimbs))?;
        Ok(BitBlock {
            storage,
            ncols,
            nlimbs,
            high_bitmask: high_bitmask(ncols),
        })
    }

    /// Builds a row vector from raw limbs; bits above `ncols` are cleared.
    pub fn from_limbs(ncols: usize, limbs: &[u64]) -> Result<Self, Error> {
        let mut block = BitBlock::zero(ncols)?;
        if limbs.len() != block.nlimbs {
            return Err(Error::DimensionMismatch);
        }
        block.limbs_mut().copy_from_slice(limbs);
        let last = block.nlimbs - 1;
        let mask = block.high_bitmask;
        block.limbs_mut()[last] &= mask;
        Ok(block)
    }

    /// Allocates a row vector filled from `rng`.
    pub fn random<R: RngCore>(ncols: usize, rng: &mut R) -> Result<Self, Error> {
        let mut block = BitBlock::zero(ncols)?;
        block.randomize(rng);
        Ok(block)
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// The payload limbs of the row, valid bits masked per the invariant.
    #[inline]
    pub fn limbs(&self) -> &[u64] {
        &self.storage.as_slice()[..self.nlimbs]
    }

    /// Reads bit `i` of the row.
    #[inline]
    pub fn bit(&self, i: usize) -> bool {
        assert!(i < self.ncols);
        (self.limbs()[i / WORD_SIZE_BITS] >> (i % WORD_SIZE_BITS)) & 1 == 1
    }

    #[inline]
    pub(crate) fn limbs_mut(&mut self) -> &mut [u64] {
        let nlimbs = self.nlimbs;
        &mut self.storage.as_mut_slice()[..nlimbs]
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const u64 {
        self.storage.as_ptr()
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u64 {
        self.storage.as_mut_ptr()
    }

    #[cfg(test)]
    fn alignment(&self) -> usize {
        self.storage.layout.align()
    }

    /// Zeroes the row.
    pub fn clear(&mut self) {
        for limb in self.limbs_mut() {
            *limb = 0;
        }
    }

    /// Refills the row from `rng` and remasks the final limb.
    pub fn randomize<R: RngCore>(&mut self, rng: &mut R) {
        let mask = self.high_bitmask;
        randomize_row(rng, self.limbs_mut(), mask);
    }

    /// Copies `src` into `self`; widths must agree.
    pub fn copy_from(&mut self, src: &BitBlock) -> Result<(), Error> {
        if self.ncols != src.ncols {
            return Err(Error::DimensionMismatch);
        }
        self.limbs_mut().copy_from_slice(src.limbs());
        Ok(())
    }

    /// `self ^= other`.
    pub fn xor_assign(&mut self, other: &BitBlock) -> Result<(), Error> {
        if self.ncols != other.ncols {
            return Err(Error::DimensionMismatch);
        }
        unsafe {
            xor_raw(
                self.as_mut_ptr(),
                self.as_ptr(),
                other.as_ptr(),
                self.ncols,
                self.nlimbs,
                self.high_bitmask,
            )
        };
        Ok(())
    }

    /// `self &= other`.
    pub fn and_assign(&mut self, other: &BitBlock) -> Result<(), Error> {
        if self.ncols != other.ncols {
            return Err(Error::DimensionMismatch);
        }
        unsafe {
            and_raw(
                self.as_mut_ptr(),
                self.as_ptr(),
                other.as_ptr(),
                self.ncols,
                self.nlimbs,
                self.high_bitmask,
            )
        };
        Ok(())
    }
}

impl Clone for BitBlock {
    fn clone(&self) -> Self {
        BitBlock {
            storage: self.storage.clone(),
            ncols: self.ncols,
            nlimbs: self.nlimbs,
            high_bitmask: self.high_bitmask,
        }
    }
}

impl fmt::Debug for BitBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitBlock<{}>(", self.ncols)?;
        for limb in self.limbs().iter().rev() {
            write!(f, "{:016x}", limb)?;
        }
        write!(f, ")")
    }
}

impl PartialEq for BitBlock {
    fn eq(&self, other: &Self) -> bool {
        equal(self, other)
    }
}

impl Eq for BitBlock {}

/// An m×n GF(2) matrix with the same per-row layout as [`BitBlock`].
///
/// Used for the (transposed) LowMC round matrices consumed by
/// [`mul_v_into`] and [`addmul_v_into`].
pub struct BitMatrix {
    storage: AlignedLimbs,
    nrows: usize,
    ncols: usize,
    nlimbs: usize,
    rowstride: usize,
    high_bitmask: u64,
}

impl BitMatrix {
    /// Allocates an all-zero `nrows`×`ncols` matrix.
    pub fn zero(nrows: usize, ncols: usize) -> Result<Self, Error> {
        if nrows == 0 || ncols == 0 {
            return Err(Error::DimensionMismatch);
        }
        let nlimbs = limb_count(ncols);
        let rowstride = row_stride(nlimbs);
        let storage = AlignedLimbs::zeroed(nrows * rowstride, row_alignment(nlimbs))?;
        Ok(BitMatrix {
            storage,
            nrows,
            ncols,
            nlimbs,
            rowstride,
            high_bitmask: high_bitmask(ncols),
        })
    }

    /// Builds a matrix from equally-shaped row vectors.
    pub fn from_rows(rows: &[BitBlock]) -> Result<Self, Error> {
        let first = rows.first().ok_or(Error::DimensionMismatch)?;
        let mut matrix = BitMatrix::zero(rows.len(), first.ncols())?;
        for (i, row) in rows.iter().enumerate() {
            matrix.set_row(i, row)?;
        }
        Ok(matrix)
    }

    /// Allocates a matrix filled from `rng`.
    pub fn random<R: RngCore>(nrows: usize, ncols: usize, rng: &mut R) -> Result<Self, Error> {
        let mut matrix = BitMatrix::zero(nrows, ncols)?;
        matrix.randomize(rng);
        Ok(matrix)
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// The payload limbs of row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[u64] {
        let start = i * self.rowstride;
        &self.storage.as_slice()[start..start + self.nlimbs]
    }

    #[inline]
    fn row_mut(&mut self, i: usize) -> &mut [u64] {
        let start = i * self.rowstride;
        let nlimbs = self.nlimbs;
        &mut self.storage.as_mut_slice()[start..start + nlimbs]
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const u64 {
        self.storage.as_ptr()
    }

    /// Copies row `i` into an existing row vector of matching width.
    pub fn copy_row_into(&self, i: usize, dst: &mut BitBlock) -> Result<(), Error> {
        if i >= self.nrows || dst.ncols != self.ncols {
            return Err(Error::DimensionMismatch);
        }
        dst.limbs_mut().copy_from_slice(self.row(i));
        Ok(())
    }

    /// Overwrites row `i` with a row vector of matching width.
    pub fn set_row(&mut self, i: usize, src: &BitBlock) -> Result<(), Error> {
        if i >= self.nrows || src.ncols != self.ncols {
            return Err(Error::DimensionMismatch);
        }
        self.row_mut(i).copy_from_slice(src.limbs());
        Ok(())
    }

    /// Refills every row from `rng` and remasks the final limbs.
    pub fn randomize<R: RngCore>(&mut self, rng: &mut R) {
        let mask = self.high_bitmask;
        for i in 0..self.nrows {
            randomize_row(rng, self.row_mut(i), mask);
        }
    }

    /// Row-wise copy; `self` must match `src`'s width and hold at least as
    /// many rows.
    pub fn copy_from(&mut self, src: &BitMatrix) -> Result<(), Error> {
        if self.ncols != src.ncols || self.nrows < src.nrows {
            return Err(Error::DimensionMismatch);
        }
        for i in 0..src.nrows {
            self.row_mut(i).copy_from_slice(src.row(i));
        }
        Ok(())
    }
}

impl Clone for BitMatrix {
    fn clone(&self) -> Self {
        BitMatrix {
            storage: self.storage.clone(),
            nrows: self.nrows,
            ncols: self.ncols,
            nlimbs: self.nlimbs,
            rowstride: self.rowstride,
            high_bitmask: self.high_bitmask,
        }
    }
}

impl PartialEq for BitMatrix {
    fn eq(&self, other: &Self) -> bool {
        if self.ncols != other.ncols || self.nrows != other.nrows {
            return false;
        }
        (0..self.nrows).all(|i| unsafe {
            equal_raw(
                self.row(i).as_ptr(),
                other.row(i).as_ptr(),
                self.ncols,
                self.nlimbs,
            )
        })
    }
}

impl Eq for BitMatrix {}

fn randomize_row<R: RngCore>(rng: &mut R, row: &mut [u64], mask: u64) {
    let bytes = unsafe {
        slice::from_raw_parts_mut(row.as_mut_ptr() as *mut u8, row.len() * mem::size_of::<u64>())
    };
    rng.fill_bytes(bytes);
    let last = row.len() - 1;
    row[last] &= mask;
}

/// Allocates `count` parallel all-zero row vectors of the same shape.
pub fn alloc_blocks(count: usize, ncols: usize) -> Result<Vec<BitBlock>, Error> {
    let mut blocks = Vec::with_capacity(count);
    for _ in 0..count {
        blocks.push(BitBlock::zero(ncols)?);
    }
    Ok(blocks)
}

/// Allocates `count` parallel row vectors filled from `rng`.
pub fn random_blocks<R: RngCore>(
    count: usize,
    ncols: usize,
    rng: &mut R,
) -> Result<Vec<BitBlock>, Error> {
    let mut blocks = alloc_blocks(count, ncols)?;
    for block in blocks.iter_mut() {
        block.randomize(rng);
    }
    Ok(blocks)
}

#[cfg_attr(
    not(any(target_arch = "x86", target_arch = "x86_64")),
    allow(unused_variables)
)]
unsafe fn xor_raw(
    res: *mut u64,
    a: *const u64,
    b: *const u64,
    ncols: usize,
    nlimbs: usize,
    mask: u64,
) {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let cpu = dispatch::features();
        if cpu.avx2 && ncols >= 256 && ncols % WORD_SIZE_BITS == 0 {
            return x86::xor_avx2(res, a, b, nlimbs);
        }
        if cpu.sse2 && ncols % WORD_SIZE_BITS == 0 {
            return x86::xor_sse2(res, a, b, nlimbs);
        }
    }

    scalar::xor(res, a, b, nlimbs, mask)
}

#[cfg_attr(
    not(any(target_arch = "x86", target_arch = "x86_64")),
    allow(unused_variables)
)]
unsafe fn and_raw(
    res: *mut u64,
    a: *const u64,
    b: *const u64,
    ncols: usize,
    nlimbs: usize,
    mask: u64,
) {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let cpu = dispatch::features();
        if cpu.avx2 && ncols >= 256 && ncols % WORD_SIZE_BITS == 0 {
            return x86::and_avx2(res, a, b, nlimbs);
        }
        if cpu.sse2 && ncols % WORD_SIZE_BITS == 0 {
            return x86::and_sse2(res, a, b, nlimbs);
        }
    }

    scalar::and(res, a, b, nlimbs, mask)
}

#[cfg_attr(
    not(any(target_arch = "x86", target_arch = "x86_64")),
    allow(unused_variables)
)]
unsafe fn equal_raw(a: *const u64, b: *const u64, ncols: usize, nlimbs: usize) -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let cpu = dispatch::features();
        if cpu.avx2 && ncols >= 256 {
            return x86::equal_avx2(a, b, nlimbs);
        }
        if cpu.sse41 {
            return x86::equal_sse41(a, b, nlimbs);
        }
        if cpu.sse2 {
            return x86::equal_sse2(a, b, nlimbs);
        }
    }

    scalar::equal(a, b, nlimbs)
}

/// `res = first ^ second`.
pub fn xor_into(res: &mut BitBlock, first: &BitBlock, second: &BitBlock) -> Result<(), Error> {
    if res.ncols != first.ncols || first.ncols != second.ncols {
        return Err(Error::DimensionMismatch);
    }
    unsafe {
        xor_raw(
            res.as_mut_ptr(),
            first.as_ptr(),
            second.as_ptr(),
            first.ncols,
            first.nlimbs,
            first.high_bitmask,
        )
    };
    Ok(())
}

/// `first ^ second` into a fresh row vector.
pub fn xor(first: &BitBlock, second: &BitBlock) -> Result<BitBlock, Error> {
    let mut res = BitBlock::zero(first.ncols)?;
    xor_into(&mut res, first, second)?;
    Ok(res)
}

/// `res = first & second`.
pub fn and_into(res: &mut BitBlock, first: &BitBlock, second: &BitBlock) -> Result<(), Error> {
    if res.ncols != first.ncols || first.ncols != second.ncols {
        return Err(Error::DimensionMismatch);
    }
    unsafe {
        and_raw(
            res.as_mut_ptr(),
            first.as_ptr(),
            second.as_ptr(),
            first.ncols,
            first.nlimbs,
            first.high_bitmask,
        )
    };
    Ok(())
}

/// `first & second` into a fresh row vector.
pub fn and(first: &BitBlock, second: &BitBlock) -> Result<BitBlock, Error> {
    let mut res = BitBlock::zero(first.ncols)?;
    and_into(&mut res, first, second)?;
    Ok(res)
}

/// Logical right shift of the whole row by `count < 64` bit positions.
///
/// `res` must not alias `val` (the loop reads ahead); `count == 0`
/// degenerates to a copy.
pub fn shift_right_into(res: &mut BitBlock, val: &BitBlock, count: usize) -> Result<(), Error> {
    if res.ncols != val.ncols {
        return Err(Error::DimensionMismatch);
    }
    if count == 0 {
        return res.copy_from(val);
    }
    if count >= WORD_SIZE_BITS {
        return Err(Error::ContractViolation);
    }

    let nlimbs = val.nlimbs;
    let left = WORD_SIZE_BITS - count;
    let src = val.limbs();
    let dst = res.limbs_mut();

    for i in 0..nlimbs - 1 {
        dst[i] = (src[i] >> count) | (src[i + 1] << left);
    }
    dst[nlimbs - 1] = src[nlimbs - 1] >> count;
    Ok(())
}

/// Logical left shift of the whole row by `count < 64` bit positions.
///
/// Mirror image of [`shift_right_into`]; the final limb is remasked so
/// bits cannot escape past the column count.
pub fn shift_left_into(res: &mut BitBlock, val: &BitBlock, count: usize) -> Result<(), Error> {
    if res.ncols != val.ncols {
        return Err(Error::DimensionMismatch);
    }
    if count == 0 {
        return res.copy_from(val);
    }
    if count >= WORD_SIZE_BITS {
        return Err(Error::ContractViolation);
    }

    let nlimbs = val.nlimbs;
    let right = WORD_SIZE_BITS - count;
    let mask = val.high_bitmask;
    let src = val.limbs();
    let dst = res.limbs_mut();

    for i in (1..nlimbs).rev() {
        dst[i] = (src[i] << count) | (src[i - 1] >> right);
    }
    dst[0] = src[0] << count;
    dst[nlimbs - 1] &= mask;
    Ok(())
}

/// `c = v * At`, where `At` is the transpose of the mathematical matrix.
pub fn mul_v_into(c: &mut BitBlock, v: &BitBlock, at: &BitMatrix) -> Result<(), Error> {
    if at.nrows != v.ncols || at.ncols != c.ncols {
        return Err(Error::DimensionMismatch);
    }
    c.clear();
    addmul_v_into(c, v, at)
}

/// `v * At` into a fresh row vector.
pub fn mul_v(v: &BitBlock, at: &BitMatrix) -> Result<BitBlock, Error> {
    let mut c = BitBlock::zero(at.ncols)?;
    mul_v_into(&mut c, v, at)?;
    Ok(c)
}

/// `c ^= v * At`. The hot loop of signing: the SIMD kernels fold four
/// matrix rows per index nibble.
pub fn addmul_v_into(c: &mut BitBlock, v: &BitBlock, at: &BitMatrix) -> Result<(), Error> {
    if at.ncols != c.ncols || at.nrows != v.ncols {
        return Err(Error::DimensionMismatch);
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        let cpu = dispatch::features();
        if at.nrows % WORD_SIZE_BITS == 0 {
            if cpu.avx2 && at.ncols % 256 == 0 {
                unsafe {
                    x86::addmul_v_avx2(
                        c.as_mut_ptr(),
                        v.limbs(),
                        at.as_ptr(),
                        at.rowstride,
                        at.nlimbs,
                    )
                };
                return Ok(());
            }
            if cpu.sse2 && at.ncols % 128 == 0 {
                unsafe {
                    x86::addmul_v_sse2(
                        c.as_mut_ptr(),
                        v.limbs(),
                        at.as_ptr(),
                        at.rowstride,
                        at.nlimbs,
                    )
                };
                return Ok(());
            }
        }
    }

    unsafe {
        scalar::addmul_v(
            c.as_mut_ptr(),
            v.limbs(),
            at.as_ptr(),
            at.rowstride,
            at.nlimbs,
            at.high_bitmask,
        )
    };
    Ok(())
}

/// True iff both vectors have the same width and identical contents.
pub fn equal(first: &BitBlock, second: &BitBlock) -> bool {
    if first.ncols != second.ncols {
        return false;
    }
    unsafe { equal_raw(first.as_ptr(), second.as_ptr(), first.ncols, first.nlimbs) }
}
