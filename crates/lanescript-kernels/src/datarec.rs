//! Record descriptors handed to kernels.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::storage::LaneStorage;

/// Element type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    F32,
}

/// Where one field lives in every lane's record.
///
/// Built fresh per invocation by [`LaneStorage::datarec`]. The pointer
/// table always holds one record start per lane; aligned records also carry
/// a stride and kernels walk them as `base + lane * stride + k` from lane 0.
///
/// A `DataRec` is neither `Send` nor `Sync`. Kernels write through it while
/// other `DataRec`s over the same storage may be read, which is only sound
/// within one thread.
#[derive(Debug)]
pub struct DataRec<'a> {
    table: Vec<NonNull<f32>>,
    stride: usize,
    offset: usize,
    aligned: bool,
    datatype: DataType,
    width: usize,
    _storage: PhantomData<&'a LaneStorage>,
}

impl<'a> DataRec<'a> {
    /// Callers guarantee every table entry starts a record holding at least
    /// `offset + width` floats, and that `stride` (when given) is the
    /// distance between consecutive records of one block.
    pub(crate) fn from_parts(
        table: Vec<NonNull<f32>>,
        stride: Option<usize>,
        offset: usize,
        width: usize,
    ) -> Self {
        Self {
            table,
            stride: stride.unwrap_or(0),
            offset,
            aligned: stride.is_some(),
            datatype: DataType::F32,
            width,
            _storage: PhantomData,
        }
    }

    /// Number of lanes described.
    pub fn lanes(&self) -> usize {
        self.table.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Distance in floats between consecutive records; 0 when indexed.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    /// Start of lane `lane`'s record, or null when out of range.
    pub fn lane_ptr(&self, lane: usize) -> *const f32 {
        self.table
            .get(lane)
            .map_or(std::ptr::null(), |ptr| ptr.as_ptr() as *const f32)
    }

    pub(crate) fn table(&self) -> &[NonNull<f32>] {
        &self.table
    }

    /// Lane 0's field start, the base of aligned address arithmetic.
    pub(crate) fn base(&self) -> Option<NonNull<f32>> {
        let first = self.table.first()?;
        // SAFETY: the field lies inside lane 0's record.
        Some(unsafe { NonNull::new_unchecked(first.as_ptr().add(self.offset)) })
    }
}
