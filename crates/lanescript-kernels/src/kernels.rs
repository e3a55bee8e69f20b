//! The kernel entry points.
//!
//! Every entry point validates its arguments, resolves each operand to a
//! concrete view once, then runs a lane loop under the instance's
//! [`LoopStrategy`]. Kernels never allocate inside the loop.
//!
//! Each operation has a negated variant that produces exactly the negation
//! of the plain result. The plain loop runs with a negating post-step, so
//! the two agree bit for bit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datarec::DataRec;
use crate::error::{KernelError, Result};
use crate::operand::{Dest, DestView, Lanes, LanesMut, Operand, SourceView};
use crate::strategy::{KernelConfig, LoopStrategy};
use crate::temp::TempBuffer;

/// Run `$body` with `$s` bound to the concrete view behind a source.
macro_rules! with_source {
    ($view:expr, $s:ident => $body:expr) => {
        match $view {
            SourceView::Aligned($s) => $body,
            SourceView::Indexed($s) => $body,
            SourceView::Temp($s) => $body,
            SourceView::Constant($s) => $body,
        }
    };
}

/// Run `$body` with `$d` bound to the concrete view behind a destination.
macro_rules! with_dest {
    ($view:expr, $d:ident => $body:expr) => {
        match $view {
            DestView::Aligned(mut $d) => $body,
            DestView::Indexed(mut $d) => $body,
            DestView::Temp(mut $d) => $body,
        }
    };
}

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "sub",
            BinaryOp::Multiply => "mul",
            BinaryOp::Divide => "div",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }

    #[inline(always)]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => a / b,
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
        }
    }
}

#[inline(always)]
fn identity(x: f32) -> f32 {
    x
}

#[inline(always)]
fn negate(x: f32) -> f32 {
    -x
}

// ============================================================================
// Lane loops
// ============================================================================

#[inline(always)]
fn map1<D: LanesMut, S: Lanes>(
    strategy: LoopStrategy,
    n: usize,
    dst: &mut D,
    src: &S,
    f: impl Fn(f32) -> f32,
) {
    let width = dst.width();
    strategy.for_each_lane(n, |lane| {
        for k in 0..width {
            // SAFETY: lane < n, which the entry point checked against every
            // operand; k < destination width.
            unsafe { dst.put(lane, k, f(src.get(lane, k))) }
        }
    });
}

#[inline(always)]
fn map2<D: LanesMut, A: Lanes, B: Lanes>(
    strategy: LoopStrategy,
    n: usize,
    dst: &mut D,
    a: &A,
    b: &B,
    f: impl Fn(f32, f32) -> f32,
) {
    let width = dst.width();
    strategy.for_each_lane(n, |lane| {
        for k in 0..width {
            // SAFETY: as in map1.
            unsafe { dst.put(lane, k, f(a.get(lane, k), b.get(lane, k))) }
        }
    });
}

/// `a * (1 / b)` with the reciprocal taken once per lane from `b`'s first
/// component.
#[inline(always)]
fn map_reciprocal<D: LanesMut, A: Lanes, B: Lanes>(
    strategy: LoopStrategy,
    n: usize,
    dst: &mut D,
    a: &A,
    b: &B,
    post: impl Fn(f32) -> f32,
) {
    let width = dst.width();
    strategy.for_each_lane(n, |lane| {
        // SAFETY: as in map1.
        unsafe {
            let r = 1.0 / b.get(lane, 0);
            for k in 0..width {
                dst.put(lane, k, post(a.get(lane, k) * r));
            }
        }
    });
}

#[inline(always)]
fn fill<D: LanesMut>(strategy: LoopStrategy, n: usize, dst: &mut D, value: f32) {
    let width = dst.width();
    strategy.for_each_lane(n, |lane| {
        for k in 0..width {
            // SAFETY: as in map1.
            unsafe { dst.put(lane, k, value) }
        }
    });
}

/// Left fold over a run of dynamically typed sources.
fn fold_views<D: LanesMut>(
    strategy: LoopStrategy,
    n: usize,
    dst: &mut D,
    op: BinaryOp,
    first: &SourceView<'_>,
    rest: &[SourceView<'_>],
    post: impl Fn(f32) -> f32,
) {
    let width = dst.width();
    strategy.for_each_lane(n, |lane| {
        for k in 0..width {
            // SAFETY: as in map1.
            unsafe {
                let mut acc = first.get(lane, k);
                for src in rest {
                    acc = op.apply(acc, src.get(lane, k));
                }
                dst.put(lane, k, post(acc));
            }
        }
    });
}

// ============================================================================
// Entry points
// ============================================================================

/// A configured kernel library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneKernels {
    strategy: LoopStrategy,
}

impl Default for LaneKernels {
    fn default() -> Self {
        Self::with_strategy(KernelConfig::default().strategy())
    }
}

impl LaneKernels {
    pub fn new(config: &KernelConfig) -> Result<Self> {
        config.validate()?;
        let strategy = config.strategy();
        debug!(strategy = %strategy, "kernel loop strategy selected");
        Ok(Self::with_strategy(strategy))
    }

    pub fn with_strategy(strategy: LoopStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> LoopStrategy {
        self.strategy
    }

    /// Copy `src` into `dst`, broadcasting narrower sources.
    pub fn set<'r, 'a: 'r>(
        &self,
        dst: impl Into<Dest<'r, 'a>>,
        src: impl Into<Operand<'r, 'a>>,
        n: usize,
    ) -> Result<()> {
        self.copy(dst.into(), src.into(), n, identity)
    }

    pub fn set_negated<'r, 'a: 'r>(
        &self,
        dst: impl Into<Dest<'r, 'a>>,
        src: impl Into<Operand<'r, 'a>>,
        n: usize,
    ) -> Result<()> {
        self.copy(dst.into(), src.into(), n, negate)
    }

    /// Load a record field into a temp buffer.
    pub fn load(&self, dst: &mut TempBuffer, src: &DataRec<'_>, n: usize) -> Result<()> {
        self.set(dst, src, n)
    }

    pub fn load_negated(&self, dst: &mut TempBuffer, src: &DataRec<'_>, n: usize) -> Result<()> {
        self.set_negated(dst, src, n)
    }

    /// Broadcast one component of `src` across every component of `dst`.
    pub fn extract<'r, 'a: 'r>(
        &self,
        dst: impl Into<Dest<'r, 'a>>,
        src: impl Into<Operand<'r, 'a>>,
        component: usize,
        n: usize,
    ) -> Result<()> {
        self.extract_with(dst.into(), src.into(), component, n, identity)
    }

    pub fn extract_negated<'r, 'a: 'r>(
        &self,
        dst: impl Into<Dest<'r, 'a>>,
        src: impl Into<Operand<'r, 'a>>,
        component: usize,
        n: usize,
    ) -> Result<()> {
        self.extract_with(dst.into(), src.into(), component, n, negate)
    }

    /// `dst = lhs op rhs`. [`BinaryOp::Divide`] follows [`Self::divide`].
    pub fn binary<'r, 'a: 'r>(
        &self,
        op: BinaryOp,
        dst: impl Into<Dest<'r, 'a>>,
        lhs: impl Into<Operand<'r, 'a>>,
        rhs: impl Into<Operand<'r, 'a>>,
        n: usize,
    ) -> Result<()> {
        self.binary_with(op, dst.into(), lhs.into(), rhs.into(), n, identity)
    }

    pub fn binary_negated<'r, 'a: 'r>(
        &self,
        op: BinaryOp,
        dst: impl Into<Dest<'r, 'a>>,
        lhs: impl Into<Operand<'r, 'a>>,
        rhs: impl Into<Operand<'r, 'a>>,
        n: usize,
    ) -> Result<()> {
        self.binary_with(op, dst.into(), lhs.into(), rhs.into(), n, negate)
    }

    /// `dst = lhs / rhs`.
    ///
    /// A scalar constant divisor of 1 copies and of 0 fills with quiet NaN.
    /// A vector divided by a scalar, constant or per lane, multiplies by
    /// the reciprocal. Everything else divides component by component.
    pub fn divide<'r, 'a: 'r>(
        &self,
        dst: impl Into<Dest<'r, 'a>>,
        lhs: impl Into<Operand<'r, 'a>>,
        rhs: impl Into<Operand<'r, 'a>>,
        n: usize,
    ) -> Result<()> {
        self.divide_with(dst.into(), lhs.into(), rhs.into(), n, identity)
    }

    pub fn divide_negated<'r, 'a: 'r>(
        &self,
        dst: impl Into<Dest<'r, 'a>>,
        lhs: impl Into<Operand<'r, 'a>>,
        rhs: impl Into<Operand<'r, 'a>>,
        n: usize,
    ) -> Result<()> {
        self.divide_with(dst.into(), lhs.into(), rhs.into(), n, negate)
    }

    /// Fused n-ary left fold: `((o0 op o1) op o2) ...`.
    ///
    /// Division folds divide component by component.
    pub fn fold<'r, 'a: 'r>(
        &self,
        op: BinaryOp,
        dst: impl Into<Dest<'r, 'a>>,
        operands: &[Operand<'r, 'a>],
        n: usize,
    ) -> Result<()> {
        self.fold_with(op, dst.into(), operands, n, identity)
    }

    pub fn fold_negated<'r, 'a: 'r>(
        &self,
        op: BinaryOp,
        dst: impl Into<Dest<'r, 'a>>,
        operands: &[Operand<'r, 'a>],
        n: usize,
    ) -> Result<()> {
        self.fold_with(op, dst.into(), operands, n, negate)
    }

    fn copy(
        &self,
        dst: Dest<'_, '_>,
        src: Operand<'_, '_>,
        n: usize,
        post: impl Fn(f32) -> f32 + Copy,
    ) -> Result<()> {
        check_lanes(n, &dst, &[src])?;
        let strategy = self.strategy;
        with_dest!(dst.view(), d => with_source!(src.view(), s => {
            map1(strategy, n, &mut d, &s, post)
        }));
        Ok(())
    }

    fn extract_with(
        &self,
        dst: Dest<'_, '_>,
        src: Operand<'_, '_>,
        component: usize,
        n: usize,
        post: impl Fn(f32) -> f32 + Copy,
    ) -> Result<()> {
        if component >= 4 {
            return Err(KernelError::Component(component));
        }
        check_lanes(n, &dst, &[src])?;
        let strategy = self.strategy;
        with_dest!(dst.view(), d => with_source!(src.view(), s => {
            map1(strategy, n, &mut d, &Component(s, component), post)
        }));
        Ok(())
    }

    fn binary_with(
        &self,
        op: BinaryOp,
        dst: Dest<'_, '_>,
        lhs: Operand<'_, '_>,
        rhs: Operand<'_, '_>,
        n: usize,
        post: impl Fn(f32) -> f32 + Copy,
    ) -> Result<()> {
        if op == BinaryOp::Divide {
            return self.divide_with(dst, lhs, rhs, n, post);
        }
        check_lanes(n, &dst, &[lhs, rhs])?;
        let strategy = self.strategy;
        with_dest!(dst.view(), d => with_source!(lhs.view(), a => with_source!(rhs.view(), b => {
            map2(strategy, n, &mut d, &a, &b, |x, y| post(op.apply(x, y)))
        })));
        Ok(())
    }

    fn divide_with(
        &self,
        dst: Dest<'_, '_>,
        lhs: Operand<'_, '_>,
        rhs: Operand<'_, '_>,
        n: usize,
        post: impl Fn(f32) -> f32 + Copy,
    ) -> Result<()> {
        check_lanes(n, &dst, &[lhs, rhs])?;
        let strategy = self.strategy;
        let vector = lhs.width() > 1;

        if let Operand::Constant(c) = rhs {
            if let Some(divisor) = c.as_scalar() {
                if divisor == 1.0 {
                    return self.copy(dst, lhs, n, post);
                }
                if divisor == 0.0 {
                    with_dest!(dst.view(), d => fill(strategy, n, &mut d, post(f32::NAN)));
                    return Ok(());
                }
                if vector {
                    let r = 1.0 / divisor;
                    with_dest!(dst.view(), d => with_source!(lhs.view(), s => {
                        map1(strategy, n, &mut d, &s, |x| post(x * r))
                    }));
                    return Ok(());
                }
            }
        } else if vector && rhs.width() == 1 {
            with_dest!(dst.view(), d => with_source!(lhs.view(), a => with_source!(rhs.view(), b => {
                map_reciprocal(strategy, n, &mut d, &a, &b, post)
            })));
            return Ok(());
        }

        with_dest!(dst.view(), d => with_source!(lhs.view(), a => with_source!(rhs.view(), b => {
            map2(strategy, n, &mut d, &a, &b, |x, y| post(x / y))
        })));
        Ok(())
    }

    fn fold_with(
        &self,
        op: BinaryOp,
        dst: Dest<'_, '_>,
        operands: &[Operand<'_, '_>],
        n: usize,
        post: impl Fn(f32) -> f32 + Copy,
    ) -> Result<()> {
        let Some((first, rest)) = operands.split_first() else {
            return Err(KernelError::NoOperands);
        };
        check_lanes(n, &dst, operands)?;
        let first = first.view();
        let rest: Vec<SourceView<'_>> = rest.iter().map(Operand::view).collect();
        let strategy = self.strategy;
        with_dest!(dst.view(), d => fold_views(strategy, n, &mut d, op, &first, &rest, post));
        Ok(())
    }
}

/// A source read at one fixed component.
struct Component<S>(S, usize);

impl<S: Lanes> Lanes for Component<S> {
    #[inline(always)]
    unsafe fn get(&self, lane: usize, _k: usize) -> f32 {
        // SAFETY: forwarded contract.
        unsafe { self.0.get(lane, self.1) }
    }
}

fn check_lanes(n: usize, dst: &Dest<'_, '_>, sources: &[Operand<'_, '_>]) -> Result<()> {
    let available = sources
        .iter()
        .filter_map(Operand::lanes)
        .chain(std::iter::once(dst.lanes()))
        .min()
        .unwrap_or(0);
    if n > available {
        return Err(KernelError::LaneCount {
            needed: n,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
