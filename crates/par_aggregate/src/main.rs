use anyhow::{ensure, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use env_logger::Env;
use log::info;
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::time::Duration;

use par_aggregate::datagen::{DataGen, MatrixKind};
use par_aggregate::harness::{Harness, Metadata, RunSample};
use par_aggregate::workloads::{
    dot_product, exact_sin_squared, integrate_sin_squared, maximin, run_uneven,
};
use par_aggregate::{
    manual_split, reduce_slice, run_pipeline, AggregateConfig, MergeDiscipline,
    RecordPairReader, RecordSource, ReduceOp, SchedulePolicy, WaitStrategy,
};

/// Parallel aggregation benchmarks: merge disciplines, loop schedules and a
/// streaming producer-consumer pipeline.
#[derive(Parser, Debug)]
#[command(name = "parbench", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Options shared by every timed sweep.
#[derive(ClapArgs, Debug, Clone)]
struct SweepArgs {
    /// Worker counts to sweep, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "1,2,4,8")]
    threads: Vec<usize>,

    /// Timed repetitions per configuration; the average is reported.
    #[arg(long, default_value_t = 3)]
    repetitions: usize,

    /// Seed for generated inputs. A random seed is used when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Write all records as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Min and max of random integers: built-in reduction vs manual split.
    Minmax {
        #[arg(long, value_delimiter = ',', default_value = "1000000,10000000,50000000")]
        sizes: Vec<usize>,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Integer dot product with a configurable merge discipline.
    Dot {
        #[arg(long, value_delimiter = ',', default_value = "100000,1000000,10000000")]
        sizes: Vec<usize>,
        #[arg(long, default_value = "atomic")]
        discipline: MergeDiscipline,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Left-rectangle integral of sin^2(x); sizes are interval counts.
    Integrate {
        #[arg(long, value_delimiter = ',', default_value = "1000000,10000000,100000000")]
        sizes: Vec<usize>,
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        #[arg(long, default_value_t = PI)]
        to: f64,
        #[arg(long, default_value = "builtin")]
        discipline: MergeDiscipline,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Maximum of row minimums of a dense random square matrix.
    Maximin {
        #[arg(long, value_delimiter = ',', default_value = "500,1000,2000")]
        sizes: Vec<usize>,
        #[arg(long, default_value = "critical")]
        discipline: MergeDiscipline,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Static, dynamic and guided schedules on unbalanced work.
    Schedule {
        #[arg(long, value_enum, default_value = "special")]
        workload: ScheduleWorkload,
        /// Matrix size for `special`, iteration count for `uneven`.
        #[arg(long, value_delimiter = ',', default_value = "1000,5000")]
        sizes: Vec<usize>,
        /// Chunk size used by every schedule.
        #[arg(long, default_value_t = 10)]
        chunk: usize,
        /// Per-iteration vector length for `uneven`.
        #[arg(long, default_value_t = 1000)]
        vector_size: usize,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Sum of random doubles under every merge discipline.
    Merge {
        #[arg(long, value_delimiter = ',', default_value = "1000000,10000000")]
        sizes: Vec<usize>,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Streaming dot products from a record-pair file.
    Pipeline {
        /// Record-pair file produced by `gen-vectors`.
        #[arg(long)]
        file: PathBuf,
        /// Number of pairs to stream, comma separated.
        #[arg(long, value_delimiter = ',', default_value = "100,500,1000")]
        pairs: Vec<usize>,
        #[arg(long, default_value = "atomic")]
        discipline: MergeDiscipline,
        /// Poll the queue every N milliseconds instead of waiting on a
        /// condition variable.
        #[arg(long)]
        poll_ms: Option<u64>,
        #[command(flatten)]
        sweep: SweepArgs,
    },
    /// Generate a record-pair file for the pipeline benchmark.
    GenVectors {
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 1000)]
        pairs: usize,
        #[arg(long, default_value_t = 100_000)]
        size: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduleWorkload {
    /// Maximin over diagonal, triangular and banded matrices.
    Special,
    /// Iterations whose cost depends on the iteration index.
    Uneven,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    let args = Args::parse();

    match args.command {
        Command::GenVectors {
            output,
            pairs,
            size,
            seed,
        } => DataGen::new(seed).write_vector_file(&output, pairs, size),
        Command::Minmax { sizes, sweep } => {
            run_sweep(&command_line, &sweep, |harness, data| bench_minmax(harness, data, &sizes))
        }
        Command::Dot {
            sizes,
            discipline,
            sweep,
        } => run_sweep(&command_line, &sweep, |harness, data| {
            bench_dot(harness, data, &sizes, discipline)
        }),
        Command::Integrate {
            sizes,
            from,
            to,
            discipline,
            sweep,
        } => run_sweep(&command_line, &sweep, |harness, _| {
            bench_integrate(harness, &sizes, from, to, discipline)
        }),
        Command::Maximin {
            sizes,
            discipline,
            sweep,
        } => run_sweep(&command_line, &sweep, |harness, data| {
            bench_maximin(harness, data, &sizes, discipline)
        }),
        Command::Schedule {
            workload,
            sizes,
            chunk,
            vector_size,
            sweep,
        } => run_sweep(&command_line, &sweep, |harness, data| match workload {
            ScheduleWorkload::Special => bench_special(harness, data, &sizes, chunk),
            ScheduleWorkload::Uneven => bench_uneven(harness, &sizes, chunk, vector_size),
        }),
        Command::Merge { sizes, sweep } => {
            run_sweep(&command_line, &sweep, |harness, data| bench_merge(harness, data, &sizes))
        }
        Command::Pipeline {
            file,
            pairs,
            discipline,
            poll_ms,
            sweep,
        } => {
            let wait_strategy = match poll_ms {
                Some(ms) => WaitStrategy::Poll(Duration::from_millis(ms)),
                None => WaitStrategy::Notify,
            };
            run_sweep(&command_line, &sweep, |harness, _| {
                bench_pipeline(harness, &file, &pairs, discipline, wait_strategy)
            })
        }
    }
}

/// Sets up the harness and data generator, runs `bench`, then prints the
/// comparison table and writes the optional JSON report.
fn run_sweep<F>(command_line: &str, sweep: &SweepArgs, bench: F) -> Result<()>
where
    F: FnOnce(&mut SweepHarness, &mut DataGen) -> Result<()>,
{
    ensure!(!sweep.threads.is_empty(), "--threads must list at least one worker count");
    let mut data = DataGen::new(sweep.seed);
    info!("Input seed: {}", data.seed());

    let metadata = Metadata::new(command_line, Some(data.seed()));
    let mut harness = SweepHarness {
        harness: Harness::new(metadata, sweep.repetitions)?,
        threads: sweep.threads.clone(),
    };
    bench(&mut harness, &mut data)?;

    let report = harness.harness.into_report();
    report.print_table();
    if let Some(path) = &sweep.report {
        report.write_json(path)?;
    }
    Ok(())
}

/// A harness bound to the worker counts requested on the command line.
struct SweepHarness {
    harness: Harness,
    threads: Vec<usize>,
}

impl SweepHarness {
    fn sweep<F, S>(&mut self, workload: &str, variant: &str, size: usize, run: F) -> Result<()>
    where
        F: FnMut(usize) -> Result<S>,
        S: Into<RunSample>,
    {
        self.harness.sweep(workload, variant, size, &self.threads, run)
    }
}

fn bench_minmax(harness: &mut SweepHarness, data: &mut DataGen, sizes: &[usize]) -> Result<()> {
    for &size in sizes {
        let values = data.random_ints(size);
        for op in [ReduceOp::Min, ReduceOp::Max] {
            harness.sweep("minmax", &format!("{op}-reduction"), size, |workers| {
                let config = AggregateConfig::builder()
                    .num_workers(workers)
                    .discipline(MergeDiscipline::Builtin)
                    .build();
                reduce_slice(&values, op, &config)
            })?;
            harness.sweep("minmax", &format!("{op}-manual"), size, |workers| {
                manual_split(&values, op, workers)
            })?;
        }
    }
    Ok(())
}

fn bench_dot(
    harness: &mut SweepHarness,
    data: &mut DataGen,
    sizes: &[usize],
    discipline: MergeDiscipline,
) -> Result<()> {
    for &size in sizes {
        let a = data.random_small_ints(size);
        let b = data.random_small_ints(size);
        harness.sweep("dot", discipline.as_str(), size, |workers| {
            let config = AggregateConfig::builder()
                .num_workers(workers)
                .discipline(discipline)
                .build();
            dot_product(&a, &b, &config)
        })?;
    }
    Ok(())
}

fn bench_integrate(
    harness: &mut SweepHarness,
    sizes: &[usize],
    from: f64,
    to: f64,
    discipline: MergeDiscipline,
) -> Result<()> {
    info!(
        "Exact integral of sin^2(x) over [{from}, {to}]: {:.10}",
        exact_sin_squared(from, to)
    );
    for &intervals in sizes {
        harness.sweep("integrate", discipline.as_str(), intervals, |workers| {
            let config = AggregateConfig::builder()
                .num_workers(workers)
                .discipline(discipline)
                .build();
            integrate_sin_squared(from, to, intervals, &config)
        })?;
    }
    Ok(())
}

fn bench_maximin(
    harness: &mut SweepHarness,
    data: &mut DataGen,
    sizes: &[usize],
    discipline: MergeDiscipline,
) -> Result<()> {
    for &size in sizes {
        let matrix = data.random_matrix(size, size);
        harness.sweep("maximin", discipline.as_str(), size, |workers| {
            let config = AggregateConfig::builder()
                .num_workers(workers)
                .discipline(discipline)
                .build();
            maximin(&matrix, &config)
        })?;
    }
    Ok(())
}

/// Every policy, static included, runs with the same chunk size.
fn schedule_config(workers: usize, policy: SchedulePolicy, chunk: usize) -> AggregateConfig {
    AggregateConfig::builder()
        .num_workers(workers)
        .schedule(policy)
        .chunk_size(chunk)
        .discipline(MergeDiscipline::Critical)
        .build()
}

fn bench_special(
    harness: &mut SweepHarness,
    data: &mut DataGen,
    sizes: &[usize],
    chunk: usize,
) -> Result<()> {
    for kind in MatrixKind::ALL {
        for &size in sizes {
            let matrix = data.special_matrix(size, kind);
            for policy in SchedulePolicy::ALL {
                let variant = format!("{kind}/{policy}");
                harness.sweep("schedule-special", &variant, size, |workers| {
                    let config = schedule_config(workers, policy, chunk);
                    maximin(&matrix, &config)
                })?;
            }
        }
    }
    Ok(())
}

fn bench_uneven(
    harness: &mut SweepHarness,
    sizes: &[usize],
    chunk: usize,
    vector_size: usize,
) -> Result<()> {
    for &iterations in sizes {
        for policy in SchedulePolicy::ALL {
            harness.sweep("schedule-uneven", policy.as_str(), iterations, |workers| {
                let config = schedule_config(workers, policy, chunk);
                run_uneven(iterations, vector_size, &config)
            })?;
        }
    }
    Ok(())
}

fn bench_merge(harness: &mut SweepHarness, data: &mut DataGen, sizes: &[usize]) -> Result<()> {
    for &size in sizes {
        let values = data.random_doubles(size);
        for discipline in MergeDiscipline::ALL {
            harness.sweep("merge", discipline.as_str(), size, |workers| {
                let config = AggregateConfig::builder()
                    .num_workers(workers)
                    .discipline(discipline)
                    .build();
                reduce_slice(&values, ReduceOp::Sum, &config)
            })?;
        }
    }
    Ok(())
}

fn bench_pipeline(
    harness: &mut SweepHarness,
    file: &Path,
    pairs: &[usize],
    discipline: MergeDiscipline,
    wait_strategy: WaitStrategy,
) -> Result<()> {
    let declared = RecordPairReader::open(file)?.header();
    info!(
        "{}: {} pairs of {} elements",
        file.display(),
        declared.records,
        declared.elements
    );
    for &requested in pairs {
        harness.sweep("pipeline", discipline.as_str(), requested, |workers| {
            let config = AggregateConfig::builder()
                .num_workers(workers)
                .discipline(discipline)
                .wait_strategy(wait_strategy)
                .build();
            run_pipeline(RecordPairReader::open(file)?, requested, &config)
        })?;
    }
    Ok(())
}
