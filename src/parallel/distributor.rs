//! Work distribution strategies.

#[cfg(feature = "parallel")]
use crate::error::{NodalError, Result};

/// A unit of work handed to a distributor.
pub type Job<'a> = Box<dyn FnOnce() + Send + 'a>;

/// Runs a batch of independent jobs and returns once all of them finished.
pub trait WorkDistributor: Send + Sync {
    /// Run every job exactly once.
    fn execute<'a>(&self, jobs: Vec<Job<'a>>);

    /// Number of jobs that may run at the same time.
    fn concurrency(&self) -> usize;
}

/// Runs jobs one after the other on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialDistributor;

impl WorkDistributor for SerialDistributor {
    fn execute<'a>(&self, jobs: Vec<Job<'a>>) {
        for job in jobs {
            job();
        }
    }

    fn concurrency(&self) -> usize {
        1
    }
}

/// Runs jobs on a rayon thread pool.
#[cfg(feature = "parallel")]
#[derive(Debug, Default)]
pub struct RayonDistributor {
    /// Dedicated pool, the global pool is used when `None`
    pool: Option<rayon::ThreadPool>,
}

#[cfg(feature = "parallel")]
impl RayonDistributor {
    /// Use rayon's global thread pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a dedicated pool with `threads` workers, `0` picks the CPU count.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("nodal-load-{}", index))
            .build()
            .map_err(|err| NodalError::invalid_parameter("threads", err.to_string()))?;
        Ok(Self { pool: Some(pool) })
    }
}

#[cfg(feature = "parallel")]
impl WorkDistributor for RayonDistributor {
    fn execute<'a>(&self, jobs: Vec<Job<'a>>) {
        match &self.pool {
            Some(pool) => pool.scope(|scope| {
                for job in jobs {
                    scope.spawn(move |_| job());
                }
            }),
            None => rayon::scope(|scope| {
                for job in jobs {
                    scope.spawn(move |_| job());
                }
            }),
        }
    }

    fn concurrency(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

/// The thread pool distributor when available, the serial one otherwise.
pub fn default_distributor() -> Box<dyn WorkDistributor> {
    #[cfg(feature = "parallel")]
    {
        Box::new(RayonDistributor::new())
    }
    #[cfg(not(feature = "parallel"))]
    {
        Box::new(SerialDistributor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run_counting(distributor: &dyn WorkDistributor) -> usize {
        let counter = AtomicUsize::new(0);
        let jobs: Vec<Job<'_>> = (0..16)
            .map(|_| {
                let counter = &counter;
                Box::new(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                }) as Job<'_>
            })
            .collect();
        distributor.execute(jobs);
        counter.load(Ordering::Relaxed)
    }

    #[test]
    fn test_serial_runs_everything() {
        assert_eq!(run_counting(&SerialDistributor), 16);
        assert_eq!(SerialDistributor.concurrency(), 1);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_rayon_runs_everything() {
        assert_eq!(run_counting(&RayonDistributor::new()), 16);
        let pool = RayonDistributor::with_threads(3).unwrap();
        assert_eq!(pool.concurrency(), 3);
        assert_eq!(run_counting(&pool), 16);
    }

    #[test]
    fn test_jobs_may_borrow_mutably() {
        let mut values = vec![0usize; 8];
        let jobs: Vec<Job<'_>> = values
            .iter_mut()
            .enumerate()
            .map(|(i, value)| Box::new(move || *value = i * i) as Job<'_>)
            .collect();
        default_distributor().execute(jobs);
        assert_eq!(values[7], 49);
    }
}
