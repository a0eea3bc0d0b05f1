//! Worker management for parallel regions.
//!
//! - `pool`: per-run fixed-size worker group built on scoped threads

pub(crate) mod pool;

pub(crate) use pool::WorkerGroup;
