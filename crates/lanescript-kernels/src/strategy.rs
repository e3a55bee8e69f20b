//! Loop strategy selection.
//!
//! | Strategy    | Lanes per step | Remainder loop |
//! |-------------|----------------|----------------|
//! | `Unrolled8` | 8              | yes            |
//! | `Unrolled4` | 4              | yes            |
//! | `Scalar`    | 1              | no             |
//!
//! The strategy is picked once when a [`LaneKernels`](crate::LaneKernels)
//! instance is built and never re-evaluated per call or per lane.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// How kernel loops walk the lanes of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStrategy {
    Unrolled8,
    Unrolled4,
    Scalar,
}

impl LoopStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LoopStrategy::Unrolled8 => "unrolled8",
            LoopStrategy::Unrolled4 => "unrolled4",
            LoopStrategy::Scalar => "scalar",
        }
    }

    /// Call `f` for every lane in `0..n`, in order.
    #[inline(always)]
    pub(crate) fn for_each_lane(self, n: usize, mut f: impl FnMut(usize)) {
        match self {
            LoopStrategy::Unrolled8 => {
                let chunks = n / 8;
                for chunk in 0..chunks {
                    let base = chunk * 8;
                    f(base);
                    f(base + 1);
                    f(base + 2);
                    f(base + 3);
                    f(base + 4);
                    f(base + 5);
                    f(base + 6);
                    f(base + 7);
                }
                for lane in chunks * 8..n {
                    f(lane);
                }
            }
            LoopStrategy::Unrolled4 => {
                let chunks = n / 4;
                for chunk in 0..chunks {
                    let base = chunk * 4;
                    f(base);
                    f(base + 1);
                    f(base + 2);
                    f(base + 3);
                }
                for lane in chunks * 4..n {
                    f(lane);
                }
            }
            LoopStrategy::Scalar => {
                for lane in 0..n {
                    f(lane);
                }
            }
        }
    }
}

impl fmt::Display for LoopStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kernel library settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Use unrolled loops. When false every kernel runs lane by lane.
    pub unroll: bool,
    /// Lanes per unrolled step: 4 or 8.
    pub unroll_width: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            unroll: true,
            unroll_width: 8,
        }
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.unroll_width, 4 | 8) {
            return Err(KernelError::InvalidConfig(format!(
                "unroll_width must be 4 or 8, got {}",
                self.unroll_width
            )));
        }
        Ok(())
    }

    pub fn strategy(&self) -> LoopStrategy {
        match (self.unroll, self.unroll_width) {
            (false, _) => LoopStrategy::Scalar,
            (true, 4) => LoopStrategy::Unrolled4,
            (true, _) => LoopStrategy::Unrolled8,
        }
    }
}
