use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Loop scheduling methods, with OpenMP `schedule(...)` semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Schedule {
    /// Fixed assignment decided before the loop starts
    Static,
    /// Fixed-size chunks claimed from a shared counter
    Dynamic,
    /// Chunks shrinking with the remaining work
    Guided,
}

impl Schedule {
    pub fn all() -> &'static [Schedule] {
        &[Schedule::Static, Schedule::Dynamic, Schedule::Guided]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Schedule::Static => "Static",
            Schedule::Dynamic => "Dynamic",
            Schedule::Guided => "Guided",
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What one worker did during a scheduled loop
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStats {
    pub worker: usize,
    pub elapsed: Duration,
    /// Loop iterations (rows) processed
    pub units: usize,
    /// Sum of the values returned by the work function
    pub work: u64,
}

/// Chunk size actually used for a loop of `total` units.
///
/// Without an explicit chunk, static splits the loop into one contiguous
/// block per thread and the other methods hand out single units. Chunks
/// never exceed the loop length.
pub fn effective_chunk(schedule: Schedule, total: usize, threads: usize, chunk: Option<usize>) -> usize {
    match (schedule, chunk) {
        (_, Some(chunk)) => chunk.min(total).max(1),
        (Schedule::Static, None) => total.div_ceil(threads.max(1)).max(1),
        (_, None) => 1,
    }
}

/// Run `work` for every index in `0..total` on all threads of `pool`.
///
/// Each index is processed exactly once. Returns one entry per pool thread,
/// ordered by thread index.
pub fn run<F>(
    pool: &ThreadPool,
    schedule: Schedule,
    chunk: Option<usize>,
    total: usize,
    work: F,
) -> Vec<WorkerStats>
where
    F: Fn(usize) -> u64 + Sync,
{
    let threads = pool.current_num_threads();
    let chunk = effective_chunk(schedule, total, threads, chunk);
    let next = AtomicUsize::new(0);

    pool.broadcast(|ctx| {
        let start = Instant::now();
        let mut stats = WorkerStats {
            worker: ctx.index(),
            ..WorkerStats::default()
        };
        let mut process = |range: Range<usize>| {
            for idx in range {
                stats.work += work(idx);
                stats.units += 1;
            }
        };

        match schedule {
            Schedule::Static => {
                let stride = chunk.saturating_mul(ctx.num_threads());
                let mut begin = ctx.index().saturating_mul(chunk);
                while begin < total {
                    process(begin..begin.saturating_add(chunk).min(total));
                    begin = begin.saturating_add(stride);
                }
            }
            Schedule::Dynamic => loop {
                let begin = next.fetch_add(chunk, Ordering::Relaxed);
                if begin >= total {
                    break;
                }
                process(begin..begin.saturating_add(chunk).min(total));
            },
            Schedule::Guided => {
                while let Some(range) = claim_guided(&next, total, ctx.num_threads(), chunk) {
                    process(range);
                }
            }
        }

        stats.elapsed = start.elapsed();
        stats
    })
}

/// Claim `max(ceil(remaining / threads), min_chunk)` units, or `None` when done.
fn claim_guided(
    next: &AtomicUsize,
    total: usize,
    threads: usize,
    min_chunk: usize,
) -> Option<Range<usize>> {
    let mut begin = next.load(Ordering::Relaxed);
    loop {
        if begin >= total {
            return None;
        }
        let remaining = total - begin;
        let size = remaining
            .div_ceil(threads.max(1))
            .max(min_chunk)
            .min(remaining);
        match next.compare_exchange_weak(begin, begin + size, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return Some(begin..begin + size),
            Err(current) => begin = current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rayon::ThreadPoolBuilder;

    fn pool(threads: usize) -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
    }

    #[test]
    fn test_effective_chunk() {
        assert_eq!(effective_chunk(Schedule::Static, 10, 4, None), 3);
        assert_eq!(effective_chunk(Schedule::Static, 0, 4, None), 1);
        assert_eq!(effective_chunk(Schedule::Dynamic, 10, 4, None), 1);
        assert_eq!(effective_chunk(Schedule::Guided, 10, 4, Some(0)), 1);
        assert_eq!(effective_chunk(Schedule::Guided, 10, 4, Some(5)), 5);
        assert_eq!(effective_chunk(Schedule::Static, 10, 4, Some(usize::MAX)), 10);
        assert_eq!(effective_chunk(Schedule::Dynamic, 0, 4, Some(usize::MAX)), 1);
    }

    #[test]
    fn test_huge_chunk_runs_each_row_once() {
        let pool = pool(2);
        for &schedule in Schedule::all() {
            let stats = run(&pool, schedule, Some(usize::MAX), 10, |idx| idx as u64);
            assert_eq!(stats.iter().map(|s| s.units).sum::<usize>(), 10);
            assert_eq!(stats.iter().map(|s| s.work).sum::<u64>(), 45);
        }
    }

    #[test]
    fn test_static_blocks_are_contiguous() {
        let pool = pool(2);
        let stats = run(&pool, Schedule::Static, None, 10, |idx| idx as u64);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].worker, 0);
        assert_eq!(stats[0].units, 5);
        assert_eq!(stats[0].work, 0 + 1 + 2 + 3 + 4);
        assert_eq!(stats[1].work, 5 + 6 + 7 + 8 + 9);
    }

    #[test]
    fn test_static_round_robin_chunks() {
        let pool = pool(2);
        let stats = run(&pool, Schedule::Static, Some(2), 7, |idx| idx as u64);

        // worker 0: 0,1,4,5   worker 1: 2,3,6
        assert_eq!(stats[0].work, 10);
        assert_eq!(stats[1].work, 11);
    }

    #[test]
    fn test_guided_claims_shrink() {
        let next = AtomicUsize::new(0);
        let claims: Vec<Range<usize>> =
            std::iter::from_fn(|| claim_guided(&next, 100, 4, 2)).collect();

        assert_eq!(claims[0], 0..25);
        assert_eq!(claims[1], 25..44);
        assert!(claims.windows(2).all(|w| w[0].len() >= w[1].len()));
        assert_eq!(claims.last().map(|r| r.end), Some(100));
    }

    #[test]
    fn test_empty_loop() {
        let pool = pool(3);
        for &schedule in Schedule::all() {
            let stats = run(&pool, schedule, None, 0, |_| 1);
            assert_eq!(stats.len(), 3);
            assert!(stats.iter().all(|s| s.units == 0));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_every_index_once(
            schedule in prop::sample::select(Schedule::all().to_vec()),
            threads in 1usize..6,
            total in 0usize..400,
            chunk in prop::option::of(prop_oneof![1usize..20, Just(usize::MAX), (usize::MAX / 4)..usize::MAX]),
        ) {
            let pool = pool(threads);
            let visits: Vec<AtomicUsize> = (0..total).map(|_| AtomicUsize::new(0)).collect();

            let stats = run(&pool, schedule, chunk, total, |idx| {
                visits[idx].fetch_add(1, Ordering::Relaxed);
                idx as u64
            });

            prop_assert_eq!(stats.len(), threads);
            prop_assert!(visits.iter().all(|v| v.load(Ordering::Relaxed) == 1));
            prop_assert_eq!(stats.iter().map(|s| s.units).sum::<usize>(), total);
            prop_assert_eq!(
                stats.iter().map(|s| s.work).sum::<u64>(),
                (0..total as u64).sum::<u64>()
            );
        }
    }
}
