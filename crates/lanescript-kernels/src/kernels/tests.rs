use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::operand::Constant;
use crate::storage::LaneStorage;

const STRATEGIES: [LoopStrategy; 3] = [
    LoopStrategy::Unrolled8,
    LoopStrategy::Unrolled4,
    LoopStrategy::Scalar,
];

/// Three aligned lanes of stride 16 holding 1..=12 in their first field.
fn three_lanes() -> LaneStorage {
    let mut storage = LaneStorage::aligned(3, 16).unwrap();
    for lane in 0..3 {
        let base = (lane * 4) as f32;
        storage
            .write_record(lane, &[base + 1.0, base + 2.0, base + 3.0, base + 4.0])
            .unwrap();
    }
    storage
}

fn bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

fn random_storage(rng: &mut StdRng, aligned: bool, lanes: usize, record_len: usize) -> LaneStorage {
    let mut storage = if aligned {
        LaneStorage::aligned(lanes, record_len).unwrap()
    } else {
        LaneStorage::indexed(lanes, record_len).unwrap()
    };
    for lane in 0..lanes {
        let values: Vec<f32> = (0..record_len).map(|_| rng.gen_range(-50.0..50.0)).collect();
        storage.write_record(lane, &values).unwrap();
    }
    storage
}

#[test]
fn test_multiply_three_aligned_lanes() {
    let storage = three_lanes();
    let src = storage.datarec(0, 4).unwrap();
    let dst = storage.datarec(4, 4).unwrap();
    let kernels = LaneKernels::default();

    kernels
        .binary(BinaryOp::Multiply, &dst, &src, 2.0f32, 3)
        .unwrap();

    assert_eq!(storage.field(0, 4, 4), Some(vec![2.0, 4.0, 6.0, 8.0]));
    assert_eq!(storage.field(1, 4, 4), Some(vec![10.0, 12.0, 14.0, 16.0]));
    assert_eq!(storage.field(2, 4, 4), Some(vec![18.0, 20.0, 22.0, 24.0]));
    // The source field is untouched.
    assert_eq!(storage.field(2, 0, 4), Some(vec![9.0, 10.0, 11.0, 12.0]));
}

/// Host-style wrappers: record borrows and storage borrows are unrelated.
fn halve(kernels: &LaneKernels, dst: &DataRec<'_>, src: &DataRec<'_>, n: usize) -> Result<()> {
    kernels.divide(dst, src, 2.0f32, n)
}

fn sum_into(
    kernels: &LaneKernels,
    dst: &mut TempBuffer,
    operands: &[&DataRec<'_>],
    n: usize,
) -> Result<()> {
    let operands: Vec<Operand<'_, '_>> = operands.iter().map(|&rec| rec.into()).collect();
    kernels.fold(BinaryOp::Add, dst, &operands, n)
}

#[test]
fn test_entry_points_accept_independent_borrows() {
    let storage = three_lanes();
    let kernels = LaneKernels::default();
    let src = storage.datarec(0, 4).unwrap();
    {
        let dst = storage.datarec(4, 4).unwrap();
        halve(&kernels, &dst, &src, 3).unwrap();
        assert_eq!(storage.field(1, 4, 4), Some(vec![2.5, 3.0, 3.5, 4.0]));
        kernels.set_negated(&dst, &dst, 3).unwrap();
        assert_eq!(storage.field(1, 4, 4), Some(vec![-2.5, -3.0, -3.5, -4.0]));
        kernels.extract(&dst, &src, 3, 3).unwrap();
    }
    assert_eq!(storage.field(1, 4, 4), Some(vec![8.0; 4]));

    let scaled = storage.datarec(8, 4).unwrap();
    kernels.binary(BinaryOp::Multiply, &scaled, &src, 3.0f32, 3).unwrap();
    let mut total = TempBuffer::new(3, 4).unwrap();
    sum_into(&kernels, &mut total, &[&src, &scaled], 3).unwrap();
    assert_eq!(total.lane(2), Some(&[36.0f32, 40.0, 44.0, 48.0][..]));
}

#[test]
fn test_negated_variant_is_exact_negation() {
    let storage = three_lanes();
    let src = storage.datarec(0, 4).unwrap();
    let plain = storage.datarec(4, 4).unwrap();
    let negated = storage.datarec(8, 4).unwrap();
    let kernels = LaneKernels::default();

    kernels.binary(BinaryOp::Multiply, &plain, &src, 2.0f32, 3).unwrap();
    kernels
        .binary_negated(BinaryOp::Multiply, &negated, &src, 2.0f32, 3)
        .unwrap();

    // Negate the inputs by hand and run the plain kernel.
    let mut flipped = LaneStorage::aligned(3, 16).unwrap();
    for lane in 0..3 {
        let values: Vec<f32> = storage.field(lane, 0, 4).unwrap().iter().map(|v| -v).collect();
        flipped.write_record(lane, &values).unwrap();
    }
    let flipped_src = flipped.datarec(0, 4).unwrap();
    let flipped_dst = flipped.datarec(4, 4).unwrap();
    kernels
        .binary(BinaryOp::Multiply, &flipped_dst, &flipped_src, 2.0f32, 3)
        .unwrap();

    for lane in 0..3 {
        let plain: Vec<f32> = storage.field(lane, 4, 4).unwrap();
        let negated = storage.field(lane, 8, 4).unwrap();
        let expected: Vec<f32> = plain.iter().map(|v| -v).collect();
        assert_eq!(bits(&negated), bits(&expected));
        assert_eq!(bits(&negated), bits(&flipped.field(lane, 4, 4).unwrap()));
    }
}

#[test]
fn test_division_policy() {
    let mut storage = LaneStorage::aligned(2, 8).unwrap();
    storage.write_record(0, &[4.0, 4.0, 4.0, 4.0]).unwrap();
    storage.write_record(1, &[4.0, 4.0, 4.0, 4.0]).unwrap();
    let src = storage.datarec(0, 4).unwrap();
    let kernels = LaneKernels::default();

    let mut out = TempBuffer::new(2, 4).unwrap();
    kernels.divide(&mut out, &src, 1.0f32, 2).unwrap();
    assert_eq!(out.lane(1), Some(&[4.0, 4.0, 4.0, 4.0][..]));

    kernels.divide(&mut out, &src, 0.0f32, 2).unwrap();
    assert!(out.as_slice().iter().all(|v| v.is_nan()));

    kernels.divide(&mut out, &src, 2.0f32, 2).unwrap();
    for (&got, want) in out.as_slice().iter().zip([4.0f32 / 2.0; 8]) {
        assert!((got - want).abs() < 1e-6);
        assert!((got - 2.0).abs() < 1e-6);
    }
}

#[test]
fn test_vector_over_lane_scalar_uses_reciprocal() {
    let mut storage = LaneStorage::indexed(3, 8).unwrap();
    for lane in 0..3 {
        let divisor = 3.0 + lane as f32 * 4.0;
        storage
            .write_record(lane, &[1.0, 2.0, 5.0, 7.0, divisor])
            .unwrap();
    }
    let numerator = storage.datarec(0, 4).unwrap();
    let divisor = storage.datarec(4, 1).unwrap();
    let mut out = TempBuffer::new(3, 4).unwrap();
    LaneKernels::default()
        .divide(&mut out, &numerator, &divisor, 3)
        .unwrap();

    for lane in 0..3 {
        let r = 1.0 / storage.get(lane, 4).unwrap();
        let expected: Vec<f32> = [1.0f32, 2.0, 5.0, 7.0].iter().map(|x| x * r).collect();
        assert_eq!(bits(out.lane(lane).unwrap()), bits(&expected));
    }
}

#[test]
fn test_scalar_division_is_true_division() {
    let mut storage = LaneStorage::indexed(1, 2).unwrap();
    storage.write_record(0, &[1.0, 3.0]).unwrap();
    let a = storage.datarec(0, 1).unwrap();
    let b = storage.datarec(1, 1).unwrap();
    let mut out = TempBuffer::new(1, 1).unwrap();
    let kernels = LaneKernels::default();

    kernels.divide(&mut out, &a, &b, 1).unwrap();
    assert_eq!(out.get(0, 0).map(f32::to_bits), Some((1.0f32 / 3.0).to_bits()));

    kernels.divide_negated(&mut out, &a, 3.0f32, 1).unwrap();
    assert_eq!(out.get(0, 0).map(f32::to_bits), Some((-(1.0f32 / 3.0)).to_bits()));

    // Routed through the generic entry point too.
    kernels.binary(BinaryOp::Divide, &mut out, &a, 0.0f32, 1).unwrap();
    assert!(out.get(0, 0).unwrap().is_nan());
}

/// Mixed aligned and indexed operands agree with an all-indexed scalar run.
#[test]
fn test_mixed_alignment_matches_scalar_fallback() {
    let mut rng = StdRng::seed_from_u64(0x1a7e);
    let lanes = 37;
    let ops = [
        BinaryOp::Add,
        BinaryOp::Subtract,
        BinaryOp::Multiply,
        BinaryOp::Min,
        BinaryOp::Max,
    ];

    for op in ops {
        for (lhs_aligned, rhs_aligned, dst_aligned) in
            [(true, false, true), (false, true, false), (true, true, false)]
        {
            let lhs_store = random_storage(&mut rng, lhs_aligned, lanes, 8);
            let rhs_store = random_storage(&mut rng, rhs_aligned, lanes, 8);
            let dst_store = random_storage(&mut rng, dst_aligned, lanes, 8);
            let reference = LaneStorage::indexed(lanes, 8).unwrap();

            let lhs = lhs_store.datarec(2, 3).unwrap();
            let rhs = rhs_store.datarec(5, 3).unwrap();
            let dst = dst_store.datarec(0, 3).unwrap();
            let reference_dst = reference.datarec(0, 3).unwrap();

            LaneKernels::default()
                .binary(op, &dst, &lhs, &rhs, lanes)
                .unwrap();
            LaneKernels::with_strategy(LoopStrategy::Scalar)
                .binary(op, &reference_dst, &lhs, &rhs, lanes)
                .unwrap();

            for lane in 0..lanes {
                assert_eq!(
                    bits(&dst_store.field(lane, 0, 3).unwrap()),
                    bits(&reference.field(lane, 0, 3).unwrap()),
                    "{} lane {lane}",
                    op.name()
                );
                let a = lhs_store.field(lane, 2, 3).unwrap();
                let b = rhs_store.field(lane, 5, 3).unwrap();
                let expected: Vec<f32> = a.iter().zip(&b).map(|(&x, &y)| op.apply(x, y)).collect();
                assert_eq!(bits(&reference.field(lane, 0, 3).unwrap()), bits(&expected));
            }
        }
    }
}

#[test]
fn test_strategies_agree_on_partial_batches() {
    let mut rng = StdRng::seed_from_u64(7);
    let storage = random_storage(&mut rng, true, 32, 8);
    let src = storage.datarec(0, 4).unwrap();
    let offset = storage.datarec(4, 4).unwrap();

    for n in [0, 1, 5, 8, 19, 32] {
        let results: Vec<TempBuffer> = STRATEGIES
            .iter()
            .map(|&strategy| {
                let mut out = TempBuffer::new(32, 4).unwrap();
                LaneKernels::with_strategy(strategy)
                    .binary(BinaryOp::Add, &mut out, &src, &offset, n)
                    .unwrap();
                out
            })
            .collect();
        assert_eq!(results[0], results[1], "n = {n}");
        assert_eq!(results[0], results[2], "n = {n}");
        // Lanes past the batch are left alone.
        assert!(results[0].as_slice()[n * 4..].iter().all(|&v| v == 0.0));
    }
}

#[test]
fn test_broadcast_and_tiling() {
    let mut storage = LaneStorage::indexed(2, 8).unwrap();
    storage.write_record(0, &[3.0, 1.0, 2.0, 9.0, 8.0, 7.0, 6.0]).unwrap();
    storage.write_record(1, &[4.0, 5.0, 6.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
    let scalar = storage.datarec(0, 1).unwrap();
    let pair = storage.datarec(1, 2).unwrap();
    let quad = storage.datarec(3, 4).unwrap();
    let kernels = LaneKernels::default();

    let mut out = TempBuffer::new(2, 4).unwrap();
    kernels.set(&mut out, &scalar, 2).unwrap();
    assert_eq!(out.lane(0), Some(&[3.0, 3.0, 3.0, 3.0][..]));
    assert_eq!(out.lane(1), Some(&[4.0, 4.0, 4.0, 4.0][..]));

    kernels.set(&mut out, &pair, 2).unwrap();
    assert_eq!(out.lane(0), Some(&[1.0, 2.0, 1.0, 2.0][..]));

    // A wider source into a narrower destination drops the excess.
    let mut narrow = TempBuffer::new(2, 2).unwrap();
    kernels.set(&mut narrow, &quad, 2).unwrap();
    assert_eq!(narrow.lane(1), Some(&[1.0, 2.0][..]));

    let mut out = TempBuffer::new(2, 3).unwrap();
    kernels
        .binary(BinaryOp::Add, &mut out, &scalar, Constant::vector(&[10.0, 20.0, 30.0]), 2)
        .unwrap();
    assert_eq!(out.lane(0), Some(&[13.0, 23.0, 33.0][..]));
}

#[test]
fn test_load_and_extract() {
    let storage = three_lanes();
    let src = storage.datarec(0, 4).unwrap();
    let kernels = LaneKernels::default();

    let mut temp = TempBuffer::new(3, 4).unwrap();
    kernels.load(&mut temp, &src, 3).unwrap();
    assert_eq!(temp.lane(2), Some(&[9.0, 10.0, 11.0, 12.0][..]));

    let y = storage.datarec(8, 1).unwrap();
    kernels.extract(&y, &temp, 1, 3).unwrap();
    assert_eq!(storage.get(0, 8), Some(2.0));
    assert_eq!(storage.get(2, 8), Some(10.0));

    let splat = storage.datarec(12, 4).unwrap();
    kernels.extract_negated(&splat, &src, 3, 3).unwrap();
    assert_eq!(storage.field(1, 12, 4), Some(vec![-8.0; 4]));

    assert_eq!(
        kernels.extract(&mut temp, &src, 4, 3),
        Err(KernelError::Component(4))
    );
}

#[test]
fn test_set_writes_back_into_records() {
    let storage = three_lanes();
    let src = storage.datarec(0, 4).unwrap();
    let kernels = LaneKernels::default();

    let mut temp = TempBuffer::new(3, 4).unwrap();
    kernels.load_negated(&mut temp, &src, 3).unwrap();
    kernels.set(&src, &temp, 3).unwrap();
    assert_eq!(storage.field(0, 0, 4), Some(vec![-1.0, -2.0, -3.0, -4.0]));

    kernels.set_negated(&src, &src, 3).unwrap();
    assert_eq!(storage.field(2, 0, 4), Some(vec![9.0, 10.0, 11.0, 12.0]));
}

#[test]
fn test_fold_matches_pairwise() {
    let mut rng = StdRng::seed_from_u64(99);
    let storage = random_storage(&mut rng, false, 12, 12);
    let a = storage.datarec(0, 4).unwrap();
    let b = storage.datarec(4, 4).unwrap();
    let c = storage.datarec(8, 4).unwrap();
    let kernels = LaneKernels::default();

    for op in [BinaryOp::Add, BinaryOp::Subtract, BinaryOp::Multiply, BinaryOp::Divide] {
        let mut fused = TempBuffer::new(12, 4).unwrap();
        let operands = [Operand::from(&a), Operand::from(&b), Operand::from(&c), Operand::from(0.5f32)];
        kernels.fold(op, &mut fused, &operands, 12).unwrap();

        let mut negated = TempBuffer::new(12, 4).unwrap();
        kernels.fold_negated(op, &mut negated, &operands, 12).unwrap();

        for lane in 0..12 {
            let x = storage.field(lane, 0, 4).unwrap();
            let y = storage.field(lane, 4, 4).unwrap();
            let z = storage.field(lane, 8, 4).unwrap();
            let expected: Vec<f32> = (0..4)
                .map(|k| op.apply(op.apply(op.apply(x[k], y[k]), z[k]), 0.5))
                .collect();
            assert_eq!(bits(fused.lane(lane).unwrap()), bits(&expected), "{}", op.name());
            let flipped: Vec<f32> = expected.iter().map(|v| -v).collect();
            assert_eq!(bits(negated.lane(lane).unwrap()), bits(&flipped));
        }
    }

    let mut out = TempBuffer::new(1, 1).unwrap();
    assert_eq!(
        kernels.fold(BinaryOp::Add, &mut out, &[], 1),
        Err(KernelError::NoOperands)
    );
}

#[test]
fn test_batch_larger_than_operand_is_rejected() {
    let storage = three_lanes();
    let src = storage.datarec(0, 4).unwrap();
    let mut temp = TempBuffer::new(8, 4).unwrap();
    let kernels = LaneKernels::default();

    assert_eq!(
        kernels.set(&mut temp, &src, 4),
        Err(KernelError::LaneCount {
            needed: 4,
            available: 3
        })
    );
    let mut small = TempBuffer::new(2, 4).unwrap();
    assert_eq!(
        kernels.binary(BinaryOp::Add, &mut small, 1.0f32, 2.0f32, 3),
        Err(KernelError::LaneCount {
            needed: 3,
            available: 2
        })
    );
}

#[test]
fn test_new_validates_config() {
    let kernels = LaneKernels::new(&KernelConfig {
        unroll: true,
        unroll_width: 4,
    })
    .unwrap();
    assert_eq!(kernels.strategy(), LoopStrategy::Unrolled4);
    assert!(LaneKernels::new(&KernelConfig {
        unroll: true,
        unroll_width: 3,
    })
    .is_err());
}
