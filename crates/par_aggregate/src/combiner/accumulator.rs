//! Shared accumulators, one per merge discipline.
//!
//! Workers compute a private partial and call `merge` exactly once (or once
//! per item in the pipeline). The accumulator's value is only meaningful after
//! every worker has joined, which is why reading it consumes the accumulator.

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::reduce::{Element, ReduceOp};

/// A scalar shared by all workers of a run and written only through `merge`.
pub trait Accumulator<T: Element>: Send + Sync {
    /// Combines a worker's partial into the shared value.
    fn merge(&self, partial: T);

    /// Number of merges performed so far.
    fn merge_count(&self) -> usize;

    /// Consumes the accumulator after the join barrier and returns its value.
    fn into_value(self: Box<Self>) -> T;
}

// ============================================================================
// Atomic
// ============================================================================

/// Lock-free accumulator backed by a single `AtomicU64`.
///
/// The element's bit pattern is updated with a compare-and-swap loop, the
/// same primitive a hardware atomic add on a double compiles to.
#[derive(Debug)]
pub struct AtomicAccumulator<T: Element> {
    bits: AtomicU64,
    op: ReduceOp,
    merges: AtomicUsize,
    _element: std::marker::PhantomData<T>,
}

impl<T: Element> AtomicAccumulator<T> {
    pub fn new(op: ReduceOp) -> Self {
        Self {
            bits: AtomicU64::new(op.identity::<T>().to_bits()),
            op,
            merges: AtomicUsize::new(0),
            _element: std::marker::PhantomData,
        }
    }
}

impl<T: Element> Accumulator<T> for AtomicAccumulator<T> {
    fn merge(&self, partial: T) {
        let op = self.op;
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let next = op.combine(T::from_bits(current), partial).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    fn merge_count(&self) -> usize {
        self.merges.load(Ordering::Relaxed)
    }

    fn into_value(self: Box<Self>) -> T {
        T::from_bits(self.bits.into_inner())
    }
}

// ============================================================================
// Named critical section
// ============================================================================

type SectionRegistry = Mutex<HashMap<String, Arc<Mutex<()>>>>;

static CRITICAL_SECTIONS: OnceLock<SectionRegistry> = OnceLock::new();

/// Returns the process-wide lock registered under `name`, creating it on first
/// use. Every caller that uses the same name gets the same lock.
pub fn critical_section(name: &str) -> Arc<Mutex<()>> {
    let registry = CRITICAL_SECTIONS.get_or_init(|| Mutex::new(HashMap::new()));
    registry
        .lock()
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Accumulator whose merges happen inside a named critical section.
///
/// Only one worker in the whole process can be inside a section with a given
/// name, including workers of other runs that picked the same name. The
/// section is the only lock taken: the value is read and written with plain
/// loads and stores while it is held.
#[derive(Debug)]
pub struct CriticalAccumulator<T: Element> {
    section: Arc<Mutex<()>>,
    name: String,
    // Written only while `section` is held.
    bits: AtomicU64,
    op: ReduceOp,
    merges: AtomicUsize,
    _element: std::marker::PhantomData<T>,
}

impl<T: Element> CriticalAccumulator<T> {
    pub fn new(op: ReduceOp, section_name: &str) -> Self {
        Self {
            section: critical_section(section_name),
            name: section_name.to_string(),
            bits: AtomicU64::new(op.identity::<T>().to_bits()),
            op,
            merges: AtomicUsize::new(0),
            _element: std::marker::PhantomData,
        }
    }

    pub fn section_name(&self) -> &str {
        &self.name
    }
}

impl<T: Element> Accumulator<T> for CriticalAccumulator<T> {
    fn merge(&self, partial: T) {
        let _section = self.section.lock();
        let current = T::from_bits(self.bits.load(Ordering::Relaxed));
        self.bits
            .store(self.op.combine(current, partial).to_bits(), Ordering::Relaxed);
        self.merges.fetch_add(1, Ordering::Relaxed);
    }

    fn merge_count(&self) -> usize {
        self.merges.load(Ordering::Relaxed)
    }

    fn into_value(self: Box<Self>) -> T {
        T::from_bits(self.bits.into_inner())
    }
}

// ============================================================================
// Explicit lock object
// ============================================================================

/// A lock created before the parallel region and destroyed after it.
///
/// Unlike a named section, the lock is an ordinary value: its lifetime is the
/// lifetime of the owning accumulator, and it can be inspected while a run is
/// in progress.
#[derive(Debug)]
pub struct MergeLock<T> {
    inner: Mutex<T>,
    acquisitions: AtomicUsize,
}

impl<T> MergeLock<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Mutex::new(initial),
            acquisitions: AtomicUsize::new(0),
        }
    }

    /// Blocks until the lock is held by the caller.
    pub fn acquire(&self) -> MutexGuard<'_, T> {
        let guard = self.inner.lock();
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        guard
    }

    /// Releases a lock obtained from `acquire`.
    pub fn release(guard: MutexGuard<'_, T>) {
        drop(guard);
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    /// How many times the lock has been acquired.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::Relaxed)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Accumulator guarded by an explicit `MergeLock`.
#[derive(Debug)]
pub struct LockAccumulator<T: Element> {
    lock: MergeLock<T>,
    op: ReduceOp,
}

impl<T: Element> LockAccumulator<T> {
    pub fn new(op: ReduceOp) -> Self {
        Self {
            lock: MergeLock::new(op.identity()),
            op,
        }
    }

    pub fn lock(&self) -> &MergeLock<T> {
        &self.lock
    }
}

impl<T: Element> Accumulator<T> for LockAccumulator<T> {
    fn merge(&self, partial: T) {
        let mut guard = self.lock.acquire();
        *guard = self.op.combine(*guard, partial);
        MergeLock::release(guard);
    }

    fn merge_count(&self) -> usize {
        self.lock.acquisitions()
    }

    fn into_value(self: Box<Self>) -> T {
        self.lock.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hammer(acc: &dyn Accumulator<i64>, threads: usize, merges_per_thread: usize) {
        thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| {
                    for _ in 0..merges_per_thread {
                        acc.merge(1);
                    }
                });
            }
        });
    }

    #[test]
    fn no_lost_updates_under_contention() {
        let accumulators: Vec<Box<dyn Accumulator<i64>>> = vec![
            Box::new(AtomicAccumulator::new(ReduceOp::Sum)),
            Box::new(CriticalAccumulator::new(ReduceOp::Sum, "test.contention")),
            Box::new(LockAccumulator::new(ReduceOp::Sum)),
        ];
        for acc in accumulators {
            hammer(acc.as_ref(), 8, 10_000);
            assert_eq!(acc.merge_count(), 80_000);
            assert_eq!(acc.into_value(), 80_000);
        }
    }

    #[test]
    fn untouched_accumulator_holds_identity() {
        let min: Box<dyn Accumulator<f64>> = Box::new(AtomicAccumulator::new(ReduceOp::Min));
        assert_eq!(min.into_value(), f64::INFINITY);
        let max: Box<dyn Accumulator<i64>> = Box::new(LockAccumulator::new(ReduceOp::Max));
        assert_eq!(max.into_value(), i64::MIN);
    }

    #[test]
    fn atomic_min_max_with_negative_values() {
        let acc = Box::new(AtomicAccumulator::<i64>::new(ReduceOp::Min));
        for v in [3, -1, 4, -9, 2] {
            acc.merge(v);
        }
        assert_eq!(acc.into_value(), -9);
    }

    #[test]
    fn same_name_yields_same_section() {
        let a = critical_section("test.shared");
        let b = critical_section("test.shared");
        let c = critical_section("test.other");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn named_section_excludes_other_holders() {
        let acc = CriticalAccumulator::<i64>::new(ReduceOp::Sum, "test.exclusion");
        let held = critical_section(acc.section_name());
        let guard = held.lock();
        assert!(held.is_locked());
        assert!(critical_section("test.exclusion").try_lock().is_none());
        drop(guard);
        acc.merge(5);
        assert_eq!(Box::new(acc).into_value(), 5);
    }

    #[test]
    fn merge_holds_only_the_named_section() {
        let acc = CriticalAccumulator::<i64>::new(ReduceOp::Sum, "test.single_lock");
        let section = critical_section("test.single_lock");
        thread::scope(|scope| {
            let guard = section.lock();
            let merger = scope.spawn(|| acc.merge(7));
            thread::sleep(std::time::Duration::from_millis(20));
            assert!(!merger.is_finished());
            assert_eq!(acc.merge_count(), 0);
            drop(guard);
            merger.join().unwrap();
        });
        assert_eq!(acc.merge_count(), 1);
        assert_eq!(Box::new(acc).into_value(), 7);
    }

    #[test]
    fn explicit_lock_is_inspectable() {
        let acc = LockAccumulator::<i64>::new(ReduceOp::Sum);
        assert!(!acc.lock().is_locked());
        let guard = acc.lock().acquire();
        assert!(acc.lock().is_locked());
        MergeLock::release(guard);
        assert!(!acc.lock().is_locked());
        acc.merge(3);
        assert_eq!(acc.lock().acquisitions(), 2);
    }
}
