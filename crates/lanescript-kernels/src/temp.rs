//! Dense temporary buffers for intermediate results.

use crate::error::{KernelError, Result};

/// `lanes` values of `width` components, lane-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TempBuffer {
    data: Vec<f32>,
    lanes: usize,
    width: usize,
}

impl TempBuffer {
    pub fn new(lanes: usize, width: usize) -> Result<Self> {
        if !(1..=4).contains(&width) {
            return Err(KernelError::Width(width));
        }
        Ok(Self {
            data: vec![0.0; lanes * width],
            lanes,
            width,
        })
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, lane: usize, k: usize) -> Option<f32> {
        if k >= self.width {
            return None;
        }
        self.data.get(lane * self.width + k).copied()
    }

    /// Components of one lane.
    pub fn lane(&self, lane: usize) -> Option<&[f32]> {
        let start = lane.checked_mul(self.width)?;
        self.data.get(start..start + self.width)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}
