//! Cross-module tests for the combiner, schedules and workloads.
//!
//! Tests cover:
//! - Agreement of every merge discipline on integer and floating inputs
//! - Result independence from the scheduling policy
//! - Degenerate inputs and invalid configuration
//! - Named critical sections shared between concurrent runs

mod common;
use common::assert_close;
use par_aggregate::combiner::critical_section;
use par_aggregate::datagen::DataGen;
use par_aggregate::{
    distribute, manual_split, reduce_indexed, reduce_slice, AggregateConfig, MergeDiscipline,
    ReduceOp, SchedulePolicy, WorkRange,
};

use anyhow::Result;
use std::thread;

fn config(workers: usize, discipline: MergeDiscipline) -> AggregateConfig {
    AggregateConfig::builder()
        .num_workers(workers)
        .discipline(discipline)
        .build()
}

#[test]
fn sample_buffer_gives_same_answer_everywhere() -> Result<()> {
    let data = [3i64, -1, 4, 1, 5, 9, 2, 6];
    for discipline in MergeDiscipline::ALL {
        for policy in SchedulePolicy::ALL {
            let config = AggregateConfig::builder()
                .num_workers(4)
                .schedule(policy)
                .discipline(discipline)
                .build();
            assert_eq!(reduce_slice(&data, ReduceOp::Sum, &config)?.value, 29);
            assert_eq!(reduce_slice(&data, ReduceOp::Min, &config)?.value, -1);
            assert_eq!(reduce_slice(&data, ReduceOp::Max, &config)?.value, 9);
        }
    }
    Ok(())
}

#[test]
fn floating_sums_agree_within_tolerance() -> Result<()> {
    let data = DataGen::new(Some(2024)).random_doubles(1_000_000);
    let sequential = ReduceOp::Sum.fold(data.iter().copied());
    for discipline in MergeDiscipline::ALL {
        for workers in [1, 2, 4, 8] {
            let outcome = reduce_slice(&data, ReduceOp::Sum, &config(workers, discipline))?;
            assert_close(outcome.value, sequential, 1e-9);
            assert_eq!(outcome.items_processed, data.len());
        }
    }
    Ok(())
}

#[test]
fn min_max_match_manual_split() -> Result<()> {
    let data = DataGen::new(Some(5)).random_ints(100_003);
    for op in [ReduceOp::Min, ReduceOp::Max] {
        let expected = op.fold(data.iter().copied());
        for workers in [1, 3, 8] {
            assert_eq!(manual_split(&data, op, workers)?.value, expected);
            let builtin = config(workers, MergeDiscipline::Builtin);
            assert_eq!(reduce_slice(&data, op, &builtin)?.value, expected);
        }
    }
    Ok(())
}

#[test]
fn zero_length_input_returns_identity() -> Result<()> {
    for discipline in MergeDiscipline::ALL {
        let config = config(8, discipline);
        assert_eq!(reduce_indexed(0, ReduceOp::Sum, &config, |_| 1i64)?.value, 0);
        assert_eq!(reduce_indexed(0, ReduceOp::Min, &config, |_| 1i64)?.value, i64::MAX);
        assert_eq!(reduce_indexed(0, ReduceOp::Max, &config, |_| 1i64)?.value, i64::MIN);
    }
    Ok(())
}

#[test]
fn more_workers_than_items() -> Result<()> {
    let data = [10i64, 20, 30];
    for discipline in MergeDiscipline::ALL {
        let outcome = reduce_slice(&data, ReduceOp::Sum, &config(16, discipline))?;
        assert_eq!(outcome.value, 60);
    }
    Ok(())
}

#[test]
fn static_split_of_ten_over_three() -> Result<()> {
    let assignments = distribute(10, &AggregateConfig::with_workers(3))?;
    let flat: Vec<WorkRange> = assignments.into_iter().flatten().collect();
    assert_eq!(
        flat,
        vec![WorkRange::new(0, 3), WorkRange::new(3, 6), WorkRange::new(6, 10)]
    );
    Ok(())
}

#[test]
fn configuration_errors_are_reported_before_work() {
    let zero_workers = AggregateConfig::with_workers(0);
    assert!(reduce_slice(&[1i64], ReduceOp::Sum, &zero_workers).is_err());

    let zero_chunk = AggregateConfig::builder()
        .num_workers(2)
        .schedule(SchedulePolicy::Guided)
        .chunk_size(0)
        .build();
    assert!(reduce_slice(&[1i64], ReduceOp::Sum, &zero_chunk).is_err());
}

#[test]
fn concurrent_runs_sharing_a_section_stay_correct() -> Result<()> {
    let data: Vec<i64> = (1..=10_000).collect();
    let config = AggregateConfig::builder()
        .num_workers(4)
        .discipline(MergeDiscipline::Critical)
        .critical_section("tests.shared-section")
        .build();

    let results: Vec<i64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| reduce_slice(&data, ReduceOp::Sum, &config)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().map(|o| o.value))
            .collect::<Result<_>>()
    })?;
    assert!(results.iter().all(|&v| v == 50_005_000));
    assert!(!critical_section("tests.shared-section").is_locked());
    Ok(())
}

#[test]
fn panicking_worker_is_reported_as_error() {
    let result = reduce_indexed(100, ReduceOp::Sum, &config(4, MergeDiscipline::Atomic), |i| {
        if i == 99 {
            panic!("bad element");
        }
        i as i64
    });
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("panicked"));
}
