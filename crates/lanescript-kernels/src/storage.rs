//! Lane record storage.
//!
//! A host keeps one record of floats per lane. Records either sit back to
//! back in one 64-byte aligned block ([`LaneStorage::aligned`]) or live in
//! separate allocations reached through a pointer table
//! ([`LaneStorage::indexed`]). Kernels see either shape through a
//! [`DataRec`].

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::datarec::DataRec;
use crate::error::{KernelError, Result};

/// Cache-line alignment for record blocks.
pub const RECORD_ALIGNMENT: usize = 64;

/// One zeroed, aligned run of floats.
///
/// The memory is reached only through raw pointers. No reference into it
/// outlives a single read or write, so kernels may write through a
/// [`DataRec`] while the owning storage is borrowed shared.
#[derive(Debug)]
struct AlignedBlock {
    ptr: NonNull<f32>,
    len: usize,
}

impl AlignedBlock {
    fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
            });
        }
        let layout = Self::layout(len)?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) } as *mut f32;
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Ok(Self { ptr, len })
    }

    fn layout(len: usize) -> Result<Layout> {
        len.checked_mul(std::mem::size_of::<f32>())
            .and_then(|size| Layout::from_size_align(size, RECORD_ALIGNMENT).ok())
            .ok_or_else(|| {
                KernelError::InvalidConfig(format!("a block of {len} floats cannot be allocated"))
            })
    }

    fn read(&self, index: usize) -> Option<f32> {
        // SAFETY: index < len keeps the read inside the allocation.
        (index < self.len).then(|| unsafe { self.ptr.as_ptr().add(index).read() })
    }

    fn write(&mut self, index: usize, value: f32) -> bool {
        if index >= self.len {
            return false;
        }
        // SAFETY: index < len keeps the write inside the allocation.
        unsafe { self.ptr.as_ptr().add(index).write(value) };
        true
    }

    fn at(&self, index: usize) -> NonNull<f32> {
        debug_assert!(index <= self.len);
        // SAFETY: index <= len stays within or one past the allocation.
        unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(index)) }
    }
}

impl Drop for AlignedBlock {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: allocated in `zeroed` with this same layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, layout) };
        }
    }
}

// SAFETY: AlignedBlock owns its memory exclusively, so moving it to another
// thread moves that ownership along with it.
unsafe impl Send for AlignedBlock {}

// AlignedBlock is deliberately not Sync: a shared borrow hands out DataRecs
// that write through raw pointers, which is only sound on one thread.

#[derive(Debug)]
enum Blocks {
    Contiguous { block: AlignedBlock, stride: usize },
    PerLane(Vec<AlignedBlock>),
}

/// Per-lane records owned by the host.
#[derive(Debug)]
pub struct LaneStorage {
    blocks: Blocks,
    lanes: usize,
    record_len: usize,
}

impl LaneStorage {
    /// `lanes` records of `stride` floats, back to back in one block.
    pub fn aligned(lanes: usize, stride: usize) -> Result<Self> {
        let len = lanes.checked_mul(stride).ok_or_else(|| {
            KernelError::InvalidConfig(format!("{lanes} lanes of stride {stride} overflow"))
        })?;
        Ok(Self {
            blocks: Blocks::Contiguous {
                block: AlignedBlock::zeroed(len)?,
                stride,
            },
            lanes,
            record_len: stride,
        })
    }

    /// `lanes` records of `record_len` floats, each allocated separately.
    pub fn indexed(lanes: usize, record_len: usize) -> Result<Self> {
        let blocks = (0..lanes)
            .map(|_| AlignedBlock::zeroed(record_len))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            blocks: Blocks::PerLane(blocks),
            lanes,
            record_len,
        })
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn record_len(&self) -> usize {
        self.record_len
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self.blocks, Blocks::Contiguous { .. })
    }

    /// Element `index` of lane `lane`'s record.
    pub fn get(&self, lane: usize, index: usize) -> Option<f32> {
        if lane >= self.lanes || index >= self.record_len {
            return None;
        }
        match &self.blocks {
            Blocks::Contiguous { block, stride } => block.read(lane * stride + index),
            Blocks::PerLane(blocks) => blocks[lane].read(index),
        }
    }

    pub fn set(&mut self, lane: usize, index: usize, value: f32) -> Result<()> {
        if lane >= self.lanes || index >= self.record_len {
            return Err(KernelError::OutOfRange { lane, index });
        }
        let written = match &mut self.blocks {
            Blocks::Contiguous { block, stride } => block.write(lane * *stride + index, value),
            Blocks::PerLane(blocks) => blocks[lane].write(index, value),
        };
        if written {
            Ok(())
        } else {
            Err(KernelError::OutOfRange { lane, index })
        }
    }

    /// Overwrite the start of a lane's record.
    pub fn write_record(&mut self, lane: usize, values: &[f32]) -> Result<()> {
        for (index, &value) in values.iter().enumerate() {
            self.set(lane, index, value)?;
        }
        Ok(())
    }

    /// Copy of one lane's record.
    pub fn record(&self, lane: usize) -> Option<Vec<f32>> {
        (0..self.record_len)
            .map(|index| self.get(lane, index))
            .collect()
    }

    /// Copy of `width` floats at `offset` in one lane's record.
    pub fn field(&self, lane: usize, offset: usize, width: usize) -> Option<Vec<f32>> {
        (offset..offset + width)
            .map(|index| self.get(lane, index))
            .collect()
    }

    /// Describe a `width`-float field at `offset` in every lane's record.
    pub fn datarec(&self, offset: usize, width: usize) -> Result<DataRec<'_>> {
        if !(1..=4).contains(&width) {
            return Err(KernelError::Width(width));
        }
        let end = offset + width;
        if end > self.record_len {
            return Err(KernelError::FieldOutOfRecord {
                offset,
                end,
                record_len: self.record_len,
            });
        }

        let (table, stride) = match &self.blocks {
            Blocks::Contiguous { block, stride } => (
                (0..self.lanes).map(|lane| block.at(lane * stride)).collect(),
                Some(*stride),
            ),
            Blocks::PerLane(blocks) => (blocks.iter().map(|block| block.at(0)).collect(), None),
        };
        Ok(DataRec::from_parts(table, stride, offset, width))
    }
}
