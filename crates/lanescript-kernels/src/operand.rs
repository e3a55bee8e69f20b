//! Kernel operands and the typed views the loops read through.
//!
//! An [`Operand`] names where a value comes from: a record field, a temp
//! buffer, or a constant. Entry points turn each operand into one concrete
//! view type before the lane loop starts, so a loop is specialised on its
//! operands' location and alignment instead of testing them per lane.
//!
//! Sources narrower than the destination tile: component `k` reads
//! component `k % width`, so a scalar broadcasts. Components past the
//! destination width are ignored.

use std::ptr::NonNull;

use crate::addr;
use crate::datarec::DataRec;
use crate::temp::TempBuffer;

/// A constant operand of one to four components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constant {
    value: [f32; 4],
    width: usize,
}

impl Constant {
    pub fn scalar(value: f32) -> Self {
        Self {
            value: [value; 4],
            width: 1,
        }
    }

    /// Up to four components; an empty slice is the scalar 0.
    pub fn vector(components: &[f32]) -> Self {
        let width = components.len().clamp(1, 4);
        let mut value = [0.0; 4];
        for (slot, &c) in value.iter_mut().zip(components) {
            *slot = c;
        }
        Self { value, width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// The single value of a scalar constant.
    pub fn as_scalar(&self) -> Option<f32> {
        (self.width == 1).then_some(self.value[0])
    }
}

/// Where a kernel reads from.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'r, 'a> {
    Record(&'r DataRec<'a>),
    Temp(&'r TempBuffer),
    Constant(Constant),
}

impl<'r, 'a> Operand<'r, 'a> {
    pub fn width(&self) -> usize {
        match self {
            Operand::Record(rec) => rec.width(),
            Operand::Temp(temp) => temp.width(),
            Operand::Constant(c) => c.width(),
        }
    }

    /// Lanes available, `None` for constants.
    pub fn lanes(&self) -> Option<usize> {
        match self {
            Operand::Record(rec) => Some(rec.lanes()),
            Operand::Temp(temp) => Some(temp.lanes()),
            Operand::Constant(_) => None,
        }
    }

    pub(crate) fn view(&self) -> SourceView<'r> {
        match *self {
            Operand::Record(rec) => match (rec.is_aligned(), rec.base()) {
                (true, Some(base)) => SourceView::Aligned(AlignedView {
                    base,
                    stride: rec.stride(),
                    width: rec.width(),
                }),
                _ => SourceView::Indexed(IndexedView {
                    table: rec.table(),
                    offset: rec.offset(),
                    width: rec.width(),
                }),
            },
            Operand::Temp(temp) => SourceView::Temp(TempView {
                data: temp.as_slice(),
                width: temp.width(),
            }),
            Operand::Constant(c) => SourceView::Constant(ConstView {
                value: c.value,
                width: c.width,
            }),
        }
    }
}

impl<'r, 'a> From<&'r DataRec<'a>> for Operand<'r, 'a> {
    fn from(rec: &'r DataRec<'a>) -> Self {
        Operand::Record(rec)
    }
}

impl<'r> From<&'r TempBuffer> for Operand<'r, '_> {
    fn from(temp: &'r TempBuffer) -> Self {
        Operand::Temp(temp)
    }
}

impl From<Constant> for Operand<'_, '_> {
    fn from(c: Constant) -> Self {
        Operand::Constant(c)
    }
}

impl From<f32> for Operand<'_, '_> {
    fn from(value: f32) -> Self {
        Operand::Constant(Constant::scalar(value))
    }
}

/// Where a kernel writes to.
#[derive(Debug)]
pub enum Dest<'r, 'a> {
    Record(&'r DataRec<'a>),
    Temp(&'r mut TempBuffer),
}

impl<'r, 'a> Dest<'r, 'a> {
    pub fn width(&self) -> usize {
        match self {
            Dest::Record(rec) => rec.width(),
            Dest::Temp(temp) => temp.width(),
        }
    }

    pub fn lanes(&self) -> usize {
        match self {
            Dest::Record(rec) => rec.lanes(),
            Dest::Temp(temp) => temp.lanes(),
        }
    }

    pub(crate) fn view(self) -> DestView<'r> {
        match self {
            Dest::Record(rec) => match (rec.is_aligned(), rec.base()) {
                (true, Some(base)) => DestView::Aligned(AlignedView {
                    base,
                    stride: rec.stride(),
                    width: rec.width(),
                }),
                _ => DestView::Indexed(IndexedView {
                    table: rec.table(),
                    offset: rec.offset(),
                    width: rec.width(),
                }),
            },
            Dest::Temp(temp) => {
                let width = temp.width();
                DestView::Temp(TempViewMut {
                    data: temp.as_mut_slice(),
                    width,
                })
            }
        }
    }
}

impl<'r, 'a> From<&'r DataRec<'a>> for Dest<'r, 'a> {
    fn from(rec: &'r DataRec<'a>) -> Self {
        Dest::Record(rec)
    }
}

impl<'r> From<&'r mut TempBuffer> for Dest<'r, '_> {
    fn from(temp: &'r mut TempBuffer) -> Self {
        Dest::Temp(temp)
    }
}

// ============================================================================
// Views
// ============================================================================

/// Per-lane reads.
pub(crate) trait Lanes {
    /// Component `k` of lane `lane`, tiled to the view's width.
    ///
    /// # Safety
    ///
    /// `lane` must be below the lane count checked by the entry point.
    unsafe fn get(&self, lane: usize, k: usize) -> f32;
}

/// Per-lane writes.
pub(crate) trait LanesMut {
    fn width(&self) -> usize;

    /// # Safety
    ///
    /// `lane` must be below the lane count checked by the entry point and
    /// `k` below the view's width.
    unsafe fn put(&mut self, lane: usize, k: usize, value: f32);
}

pub(crate) struct AlignedView {
    base: NonNull<f32>,
    stride: usize,
    width: usize,
}

pub(crate) struct IndexedView<'r> {
    table: &'r [NonNull<f32>],
    offset: usize,
    width: usize,
}

pub(crate) struct TempView<'r> {
    data: &'r [f32],
    width: usize,
}

pub(crate) struct TempViewMut<'r> {
    data: &'r mut [f32],
    width: usize,
}

pub(crate) struct ConstView {
    value: [f32; 4],
    width: usize,
}

pub(crate) enum SourceView<'r> {
    Aligned(AlignedView),
    Indexed(IndexedView<'r>),
    Temp(TempView<'r>),
    Constant(ConstView),
}

pub(crate) enum DestView<'r> {
    Aligned(AlignedView),
    Indexed(IndexedView<'r>),
    Temp(TempViewMut<'r>),
}

impl Lanes for AlignedView {
    #[inline(always)]
    unsafe fn get(&self, lane: usize, k: usize) -> f32 {
        // SAFETY: the field fits every record and lane is in range.
        unsafe { addr::aligned(self.base, self.stride, lane, k % self.width).read() }
    }
}

impl LanesMut for AlignedView {
    #[inline(always)]
    fn width(&self) -> usize {
        self.width
    }

    #[inline(always)]
    unsafe fn put(&mut self, lane: usize, k: usize, value: f32) {
        // SAFETY: k < width and the field fits every record.
        unsafe { addr::aligned(self.base, self.stride, lane, k).write(value) }
    }
}

impl Lanes for IndexedView<'_> {
    #[inline(always)]
    unsafe fn get(&self, lane: usize, k: usize) -> f32 {
        // SAFETY: lane < table.len() was checked by the entry point.
        unsafe { addr::indexed(self.table, self.offset, lane, k % self.width).read() }
    }
}

impl LanesMut for IndexedView<'_> {
    #[inline(always)]
    fn width(&self) -> usize {
        self.width
    }

    #[inline(always)]
    unsafe fn put(&mut self, lane: usize, k: usize, value: f32) {
        // SAFETY: lane < table.len() and k < width.
        unsafe { addr::indexed(self.table, self.offset, lane, k).write(value) }
    }
}

impl Lanes for TempView<'_> {
    #[inline(always)]
    unsafe fn get(&self, lane: usize, k: usize) -> f32 {
        self.data[lane * self.width + k % self.width]
    }
}

impl LanesMut for TempViewMut<'_> {
    #[inline(always)]
    fn width(&self) -> usize {
        self.width
    }

    #[inline(always)]
    unsafe fn put(&mut self, lane: usize, k: usize, value: f32) {
        self.data[lane * self.width + k] = value;
    }
}

impl Lanes for ConstView {
    #[inline(always)]
    unsafe fn get(&self, _lane: usize, k: usize) -> f32 {
        self.value[k % self.width]
    }
}

/// Dynamic dispatch over a source, for kernels taking a run of operands.
impl Lanes for SourceView<'_> {
    #[inline]
    unsafe fn get(&self, lane: usize, k: usize) -> f32 {
        // SAFETY: forwarded contract.
        unsafe {
            match self {
                SourceView::Aligned(v) => v.get(lane, k),
                SourceView::Indexed(v) => v.get(lane, k),
                SourceView::Temp(v) => v.get(lane, k),
                SourceView::Constant(v) => v.get(lane, k),
            }
        }
    }
}
