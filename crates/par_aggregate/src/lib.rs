pub mod combiner;
pub mod config;
pub mod datagen;
pub mod harness;
pub mod pipeline;
pub mod readers;
pub mod reduce;
pub mod schedule;
pub mod workloads;

mod workers;

pub use combiner::{manual_split, reduce_indexed, reduce_slice, MergeDiscipline, RunOutcome};
pub use config::{AggregateConfig, AggregateConfigBuilder, WaitStrategy};
pub use harness::{BenchmarkRecord, BenchmarkReport, Harness, Metadata, RunSample};
pub use pipeline::{run_pipeline, PipelineOutcome, PipelineQueue};
pub use readers::{RecordPair, RecordPairReader, RecordPairWriter, RecordSource};
pub use reduce::{Element, ReduceOp};
pub use schedule::{distribute, Schedule, SchedulePolicy, WorkRange};
