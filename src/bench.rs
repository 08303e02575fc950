use crate::mandelbrot::MandelbrotParams;
use crate::schedule::{self, effective_chunk, Schedule, WorkerStats};
use anyhow::{bail, Context, Result};
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Configuration for a benchmark sweep
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Image sizes (pixels per side)
    pub sizes: Vec<usize>,
    /// Thread counts; one pool is built per entry
    pub threads: Vec<usize>,
    pub schedules: Vec<Schedule>,
    /// Chunk sizes; `None` uses each schedule's default chunk
    pub block_sizes: Vec<Option<usize>>,
    /// Timed repetitions per configuration
    pub runs: usize,
    /// Untimed repetitions before the timed ones
    pub warmup: usize,
    pub max_iterations: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sizes: vec![1000],
            threads: vec![1, 2, 4, 8],
            schedules: Schedule::all().to_vec(),
            block_sizes: vec![None],
            runs: 3,
            warmup: 1,
            max_iterations: 500,
        }
    }
}

impl SweepConfig {
    fn validate(&self) -> Result<()> {
        if self.sizes.is_empty() || self.threads.is_empty() || self.schedules.is_empty() {
            bail!("Sweep needs at least one size, thread count and method");
        }
        if self.block_sizes.is_empty() {
            bail!("Sweep needs at least one block size");
        }
        if self.threads.contains(&0) {
            bail!("Thread counts must be positive");
        }
        if self.sizes.contains(&0) {
            bail!("Image sizes must be positive");
        }
        if self.block_sizes.contains(&Some(0)) {
            bail!("Block sizes must be positive");
        }
        if self.runs == 0 {
            bail!("At least one timed run is required");
        }
        Ok(())
    }

    /// Number of rows a sweep produces
    pub fn row_count(&self) -> usize {
        self.sizes.len()
            * self.threads.len()
            * self.block_sizes.len()
            * self.schedules.len()
            * self.runs
    }
}

/// One timed run, in the CSV layout the charts read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRow {
    pub method: Schedule,
    pub threads: usize,
    pub size: usize,
    /// Requested chunk size; 0 stands for the schedule's default
    #[serde(rename = "blockSize")]
    pub block_size: usize,
    pub time_seconds: f64,
}

/// Render the Mandelbrot set once per configuration and run, timing each render.
pub fn run_sweep(config: &SweepConfig) -> Result<Vec<BenchmarkRow>> {
    config.validate()?;

    let mut rows = Vec::with_capacity(config.row_count());

    for &threads in &config.threads {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("mandelbrot-{idx}"))
            .build()
            .with_context(|| format!("Failed to build a pool of {threads} threads"))?;

        for &size in &config.sizes {
            let params = MandelbrotParams::new(size).with_max_iterations(config.max_iterations);

            for &block_size in &config.block_sizes {
                for &method in &config.schedules {
                    let chunk = effective_chunk(method, size, threads, block_size);
                    info!(%method, threads, size, chunk, "running configuration");

                    for _ in 0..config.warmup {
                        schedule::run(&pool, method, block_size, size, |row| params.row_iterations(row));
                    }

                    for run in 0..config.runs {
                        let start = Instant::now();
                        let stats = schedule::run(&pool, method, block_size, size, |row| {
                            params.row_iterations(row)
                        });
                        let elapsed = start.elapsed();

                        debug!(run, elapsed = ?elapsed, "timed run complete");
                        log_workers(&stats);

                        rows.push(BenchmarkRow {
                            method,
                            threads,
                            size,
                            block_size: block_size.unwrap_or(0),
                            time_seconds: elapsed.as_secs_f64(),
                        });
                    }
                }
            }
        }
    }

    Ok(rows)
}

fn log_workers(stats: &[WorkerStats]) {
    for worker in stats {
        debug!(
            worker = worker.worker,
            rows = worker.units,
            iterations = worker.work,
            elapsed = ?worker.elapsed,
            "worker finished"
        );
    }
}

/// Write rows as CSV, appending when asked.
///
/// The header is only written when the file ends up starting fresh.
pub fn write_rows(path: &Path, rows: &[BenchmarkRow], append: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let is_empty = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len()
        == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_empty)
        .from_writer(file);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Print benchmark results to console
pub fn print_results(rows: &[BenchmarkRow]) {
    println!("\n{:=<80}", "");
    println!("Benchmark Results");
    println!("{:=<80}\n", "");

    // Group by size and block size, then method and threads
    let mut grouped: BTreeMap<(usize, usize), BTreeMap<(&str, usize), Vec<f64>>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry((row.size, row.block_size))
            .or_default()
            .entry((row.method.name(), row.threads))
            .or_default()
            .push(row.time_seconds);
    }

    for ((size, block_size), by_method) in &grouped {
        println!("Size: {}  Block size: {}", size, block_size);
        println!("{:-<60}", "");
        println!(
            "  {:>8} {:>8} {:>12} {:>12} {:>10}",
            "Method", "Threads", "Mean", "Min", "Speedup"
        );
        println!("  {:-<57}", "");

        let mut baseline: Option<(&str, f64)> = None;
        for ((method, threads), times) in by_method {
            let mean = crate::builder::mean(times.iter().copied()).unwrap_or(0.0);
            let min = times.iter().copied().fold(f64::INFINITY, f64::min);

            // First entry per method has the fewest threads
            let base = match baseline {
                Some((name, base)) if name == *method => base,
                _ => {
                    baseline = Some((*method, mean));
                    mean
                }
            };
            let speedup = if mean > 0.0 { base / mean } else { 0.0 };

            println!(
                "  {:>8} {:>8} {:>12.2?} {:>12.2?} {:>9.2}x",
                method,
                threads,
                Duration::from_secs_f64(mean),
                Duration::from_secs_f64(min),
                speedup
            );
        }
        println!();
    }
}
