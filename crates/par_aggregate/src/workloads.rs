//! Benchmark kernels built on the combiner.
//!
//! Each kernel is an indexed reduction: it describes the value contributed by
//! index `i` and lets `reduce_indexed` handle splitting, scheduling and
//! merging according to the run configuration.

use anyhow::{ensure, Result};
use std::ops::Mul;

use crate::combiner::{reduce_indexed, RunOutcome};
use crate::config::AggregateConfig;
use crate::datagen::Matrix;
use crate::reduce::{Element, ReduceOp};

/// Sum of `a[i] * b[i]`.
pub fn dot_product<T>(a: &[T], b: &[T], config: &AggregateConfig) -> Result<RunOutcome<T>>
where
    T: Element + Mul<Output = T>,
{
    ensure!(
        a.len() == b.len(),
        "Dot product needs equal lengths, but got {} and {}",
        a.len(),
        b.len()
    );
    reduce_indexed(a.len(), ReduceOp::Sum, config, |i| a[i] * b[i])
}

/// Left-rectangle approximation of the integral of `sin^2(x)` over `[a, b]`.
pub fn integrate_sin_squared(
    a: f64,
    b: f64,
    intervals: usize,
    config: &AggregateConfig,
) -> Result<RunOutcome<f64>> {
    ensure!(
        intervals > 0,
        "intervals must be a positive integer, but got intervals={}",
        intervals
    );
    let h = (b - a) / intervals as f64;
    let outcome = reduce_indexed(intervals, ReduceOp::Sum, config, |i| {
        let x = a + i as f64 * h;
        let s = x.sin();
        s * s
    })?;
    Ok(RunOutcome {
        value: outcome.value * h,
        ..outcome
    })
}

/// Closed form of the integral of `sin^2(x)` over `[a, b]`.
pub fn exact_sin_squared(a: f64, b: f64) -> f64 {
    (b - a) / 2.0 - ((2.0 * b).sin() - (2.0 * a).sin()) / 4.0
}

/// Smallest non-zero cell of a row, or `None` if every cell is zero.
pub fn row_min_nonzero(row: &[i64]) -> Option<i64> {
    row.iter().copied().filter(|&v| v != 0).min()
}

/// Largest row minimum. Zero cells are empty and rows without any non-zero
/// cell are skipped. Returns `i64::MIN` when no row contributes.
pub fn maximin(matrix: &Matrix, config: &AggregateConfig) -> Result<RunOutcome<i64>> {
    reduce_indexed(matrix.rows(), ReduceOp::Max, config, |i| {
        row_min_nonzero(matrix.row(i)).unwrap_or(i64::MIN)
    })
}

/// Cost class of an iteration in `uneven_workload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadClass {
    Light,
    Medium,
    Heavy,
}

impl WorkloadClass {
    pub fn of(iteration: usize) -> Self {
        match iteration % 10 {
            0..=2 => WorkloadClass::Light,
            3..=6 => WorkloadClass::Medium,
            _ => WorkloadClass::Heavy,
        }
    }
}

/// One iteration of a deliberately unbalanced loop.
///
/// Light iterations fill a vector with `sin * cos` and sum a tenth of it.
/// Medium iterations fill it with `sqrt * ln` and sum a fifth of the
/// products of mirrored elements. Heavy iterations add three `sin * cos`
/// terms per element and bubble-sort the first `min(100, size / 5)` elements
/// before summing a tenth.
pub fn uneven_workload(iteration: usize, vector_size: usize) -> f64 {
    let n = vector_size;
    match WorkloadClass::of(iteration) {
        WorkloadClass::Light => {
            let v: Vec<f64> = (0..n)
                .map(|i| {
                    let x = i as f64 * 0.1;
                    x.sin() * x.cos()
                })
                .collect();
            v[..n / 10].iter().sum()
        }
        WorkloadClass::Medium => {
            let v: Vec<f64> = (0..n)
                .map(|i| (i as f64 + 1.0).sqrt() * (i as f64 + 2.0).ln())
                .collect();
            (0..n / 5).map(|i| v[i] * v[n - i - 1]).sum()
        }
        WorkloadClass::Heavy => {
            let mut v: Vec<f64> = (0..n)
                .map(|i| {
                    let x = i as f64 * 0.01;
                    (0..3)
                        .map(|j| (x + j as f64).sin() * (x - j as f64).cos())
                        .sum::<f64>()
                })
                .collect();
            let sort_size = (n / 5).min(100);
            for _ in 0..sort_size {
                for j in 0..sort_size.saturating_sub(1) {
                    if v[j] > v[j + 1] {
                        v.swap(j, j + 1);
                    }
                }
            }
            v[..n / 10].iter().sum()
        }
    }
}

/// Runs `iterations` uneven iterations under the configured schedule and
/// returns the sum of their results.
pub fn run_uneven(
    iterations: usize,
    vector_size: usize,
    config: &AggregateConfig,
) -> Result<RunOutcome<f64>> {
    reduce_indexed(iterations, ReduceOp::Sum, config, |i| {
        uneven_workload(i, vector_size)
    })
}
