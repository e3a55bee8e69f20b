//! Address arithmetic shared by every kernel.
//!
//! Aligned record: component `k` of lane `i` lives at `base + i * stride + k`,
//! where `base` is lane 0's record start plus the field offset. Indexed
//! record: `table[i] + offset + k`. Reads and writes both go through these
//! two functions, so a value written by one kernel is read back at the same
//! address by the next.

use std::ptr::NonNull;

/// Element `k` of lane `lane` in an aligned record.
///
/// # Safety
///
/// `base` must point into one allocation that extends at least
/// `lane * stride + k + 1` floats past it.
#[inline(always)]
pub(crate) unsafe fn aligned(base: NonNull<f32>, stride: usize, lane: usize, k: usize) -> *mut f32 {
    // SAFETY: in bounds per the caller's contract.
    unsafe { base.as_ptr().add(lane * stride + k) }
}

/// Element `k` of lane `lane` in an indexed record.
///
/// # Safety
///
/// `lane < table.len()` and `table[lane]` must point to a record of at
/// least `offset + k + 1` floats.
#[inline(always)]
pub(crate) unsafe fn indexed(table: &[NonNull<f32>], offset: usize, lane: usize, k: usize) -> *mut f32 {
    // SAFETY: in bounds per the caller's contract.
    unsafe { table.get_unchecked(lane).as_ptr().add(offset + k) }
}
