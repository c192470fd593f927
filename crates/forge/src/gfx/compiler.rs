//! Background pipeline compiler worker pool (§4.4).
//!
//! One thread per hardware thread drains a condvar-guarded work queue.
//! Shutdown flips a stopped flag and wakes every waiter rather than posting
//! sentinel items, mirroring the original's `runWorker` loop.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A unit of deferred pipeline compilation work.
pub enum CompileJob {
    /// Compile a standalone compute pipeline.
    Compute(Box<dyn FnOnce() + Send>),
    /// Compile a graphics pipeline base library.
    GraphicsBaseLibrary(Box<dyn FnOnce() + Send>),
    /// Compile or link one graphics pipeline variant.
    GraphicsVariant(Box<dyn FnOnce() + Send>),
}

impl CompileJob {
    fn run(self) {
        match self {
            Self::Compute(job) | Self::GraphicsBaseLibrary(job) | Self::GraphicsVariant(job) => job(),
        }
    }
}

struct SharedQueue {
    jobs: Mutex<VecDeque<CompileJob>>,
    cond: Condvar,
    stopped: Mutex<bool>,
}

/// A pool of background compiler threads.
pub struct CompilerPool {
    shared: Arc<SharedQueue>,
    threads: Vec<JoinHandle<()>>,
}

impl CompilerPool {
    /// Spawns `thread_count` worker threads (clamped to at least 1).
    pub fn new(thread_count: usize) -> Self {
        let shared = Arc::new(SharedQueue {
            jobs: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            stopped: Mutex::new(false),
        });

        let thread_count = thread_count.max(1);
        let threads = (0..thread_count)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || Self::run_worker(&shared))
            })
            .collect();

        Self { shared, threads }
    }

    /// Spawns one worker thread per available hardware thread.
    pub fn for_hardware_concurrency() -> Self {
        let count = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::new(count)
    }

    /// Queues `job` for a worker thread to pick up.
    pub fn submit(&self, job: CompileJob) {
        self.shared.jobs.lock().expect("compiler pool poisoned").push_back(job);
        self.shared.cond.notify_one();
    }

    fn run_worker(shared: &SharedQueue) {
        loop {
            let mut jobs = shared.jobs.lock().expect("compiler pool poisoned");
            jobs = shared
                .cond
                .wait_while(jobs, |jobs| jobs.is_empty() && !*shared.stopped.lock().expect("compiler pool poisoned"))
                .expect("compiler pool poisoned");

            let Some(job) = jobs.pop_front() else {
                return;
            };
            drop(jobs);
            job.run();
        }
    }
}

impl Drop for CompilerPool {
    fn drop(&mut self) {
        *self.shared.stopped.lock().expect("compiler pool poisoned") = true;
        self.shared.cond.notify_all();

        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn drains_every_submitted_job() {
        let pool = CompilerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.submit(CompileJob::GraphicsVariant(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })));
        }

        drop(pool); // join waits for in-flight jobs, but queued jobs must still run first
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
