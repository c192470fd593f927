//! Job shapes and the atomic work-distribution protocol (§4.1).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Process-wide unique identifier for a dispatched job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

fn next_job_id() -> JobId {
    JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
}

/// Handle to a dispatched job, shared between the caller and the scheduler.
pub type JobHandle = Arc<dyn JobEntry>;

/// Behavior every job shape implements so the scheduler can drive it generically.
pub trait JobEntry: Send + Sync {
    /// Stable identity used to key the dependency map.
    fn id(&self) -> JobId;

    /// `true` once every work item has been marked done.
    fn is_done(&self) -> bool;

    /// Claims up to `item_group` work items.
    ///
    /// Returns `(index, count, more_remaining)`. `count` may be zero if another
    /// worker claimed the last items first.
    fn get_work_items(&self) -> (u32, u32, bool);

    /// Marks `count` work items as finished. Returns `true` if the job is now done.
    fn notify_work_items(&self, count: u32) -> bool;

    /// Registers one more unmet dependency.
    fn add_dependency(&self);

    /// Resolves one dependency. Returns `true` if none remain.
    fn notify_dependency(&self) -> bool;

    /// Executes the work items `[index, index + count)`.
    fn execute(&self, index: u32, count: u32);
}

/// Shared atomic bookkeeping every job shape embeds.
struct JobCore {
    id: JobId,
    item_count: u32,
    item_group: u32,
    next: AtomicU32,
    done: AtomicU32,
    deps: Mutex<u32>,
}

impl JobCore {
    fn new(item_count: u32, item_group: u32) -> Self {
        Self {
            id: next_job_id(),
            item_count,
            item_group: item_group.max(1),
            next: AtomicU32::new(0),
            done: AtomicU32::new(0),
            deps: Mutex::new(0),
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire) == self.item_count
    }

    fn get_work_items(&self) -> (u32, u32, bool) {
        let mut next = self.next.load(Ordering::Acquire);
        loop {
            let size = (self.item_count - next).min(self.item_group);
            if size == 0 {
                return (next, 0, next < self.item_count);
            }
            match self.next.compare_exchange_weak(
                next,
                next + size,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return (next, size, next + size < self.item_count),
                Err(observed) => next = observed,
            }
        }
    }

    fn notify_work_items(&self, count: u32) -> bool {
        self.done.fetch_add(count, Ordering::Release) + count == self.item_count
    }

    fn add_dependency(&self) {
        *self.deps.lock().expect("job dependency counter poisoned") += 1;
    }

    fn notify_dependency(&self) -> bool {
        let mut deps = self.deps.lock().expect("job dependency counter poisoned");
        *deps -= 1;
        *deps == 0
    }
}

/// A job executing a single invocation (item count 1, group 1).
pub struct SimpleJob<F: Fn() + Send + Sync> {
    core: JobCore,
    proc: F,
}

impl<F: Fn() + Send + Sync> JobEntry for SimpleJob<F> {
    fn id(&self) -> JobId {
        self.core.id
    }
    fn is_done(&self) -> bool {
        self.core.is_done()
    }
    fn get_work_items(&self) -> (u32, u32, bool) {
        self.core.get_work_items()
    }
    fn notify_work_items(&self, count: u32) -> bool {
        self.core.notify_work_items(count)
    }
    fn add_dependency(&self) {
        self.core.add_dependency();
    }
    fn notify_dependency(&self) -> bool {
        self.core.notify_dependency()
    }
    fn execute(&self, _index: u32, _count: u32) {
        (self.proc)();
    }
}

/// Creates a [`SimpleJob`] wrapping `proc`.
pub fn simple<F: Fn() + Send + Sync + 'static>(proc: F) -> JobHandle {
    Arc::new(SimpleJob {
        core: JobCore::new(1, 1),
        proc,
    })
}

/// A job invoking `proc(index)` once per item across `[0, item_count)`.
pub struct BatchJob<F: Fn(u32) + Send + Sync> {
    core: JobCore,
    proc: F,
}

impl<F: Fn(u32) + Send + Sync> JobEntry for BatchJob<F> {
    fn id(&self) -> JobId {
        self.core.id
    }
    fn is_done(&self) -> bool {
        self.core.is_done()
    }
    fn get_work_items(&self) -> (u32, u32, bool) {
        self.core.get_work_items()
    }
    fn notify_work_items(&self, count: u32) -> bool {
        self.core.notify_work_items(count)
    }
    fn add_dependency(&self) {
        self.core.add_dependency();
    }
    fn notify_dependency(&self) -> bool {
        self.core.notify_dependency()
    }
    fn execute(&self, index: u32, count: u32) {
        for i in index..index + count {
            (self.proc)(i);
        }
    }
}

/// Creates a [`BatchJob`] over `[0, item_count)` with work claimed `item_group` at a time.
pub fn batch<F: Fn(u32) + Send + Sync + 'static>(proc: F, item_count: u32, item_group: u32) -> JobHandle {
    Arc::new(BatchJob {
        core: JobCore::new(item_count, item_group),
        proc,
    })
}

/// A job invoking `proc(first_index, count)` once per claimed group.
pub struct ComplexJob<F: Fn(u32, u32) + Send + Sync> {
    core: JobCore,
    proc: F,
}

impl<F: Fn(u32, u32) + Send + Sync> JobEntry for ComplexJob<F> {
    fn id(&self) -> JobId {
        self.core.id
    }
    fn is_done(&self) -> bool {
        self.core.is_done()
    }
    fn get_work_items(&self) -> (u32, u32, bool) {
        self.core.get_work_items()
    }
    fn notify_work_items(&self, count: u32) -> bool {
        self.core.notify_work_items(count)
    }
    fn add_dependency(&self) {
        self.core.add_dependency();
    }
    fn notify_dependency(&self) -> bool {
        self.core.notify_dependency()
    }
    fn execute(&self, index: u32, count: u32) {
        (self.proc)(index, count);
    }
}

/// Creates a [`ComplexJob`] over `[0, item_count)` with work claimed `item_group` at a time.
pub fn complex<F: Fn(u32, u32) + Send + Sync + 'static>(
    proc: F,
    item_count: u32,
    item_group: u32,
) -> JobHandle {
    Arc::new(ComplexJob {
        core: JobCore::new(item_count, item_group),
        proc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn batch_job_claims_disjoint_ranges() {
        let job = batch(|_| {}, 1000, 10);
        let mut total = 0;
        loop {
            let (_, count, more) = job.get_work_items();
            total += count;
            job.notify_work_items(count);
            if !more {
                break;
            }
        }
        assert_eq!(total, 1000);
        assert!(job.is_done());
    }

    #[test]
    fn simple_job_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let job = simple(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let (index, count, _) = job.get_work_items();
        job.execute(index, count);
        job.notify_work_items(count);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(job.is_done());
    }
}
