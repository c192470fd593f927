//! Worker pool and dependency dispatch for [`super::job`] shapes (§4.1, §5).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use super::job::{JobEntry, JobHandle, JobId};

struct State {
    queue: VecDeque<Option<JobHandle>>,
    dependencies: HashMap<JobId, Vec<JobHandle>>,
    pending: u64,
}

struct Inner {
    state: Mutex<State>,
    queue_cond: Condvar,
    pending_cond: Condvar,
}

/// A trait implemented for whatever `dispatch` accepts as a dependency list:
/// a single job, or any iterable collection of jobs.
pub trait JobDeps {
    /// Visits every job in the dependency list.
    fn for_each(self, f: impl FnMut(&JobHandle));
}

impl JobDeps for () {
    fn for_each(self, _f: impl FnMut(&JobHandle)) {}
}

impl JobDeps for &JobHandle {
    fn for_each(self, mut f: impl FnMut(&JobHandle)) {
        f(self);
    }
}

impl JobDeps for &[JobHandle] {
    fn for_each(self, mut f: impl FnMut(&JobHandle)) {
        for dep in self {
            f(dep);
        }
    }
}

impl JobDeps for &Vec<JobHandle> {
    fn for_each(self, f: impl FnMut(&JobHandle)) {
        self.as_slice().for_each(f);
    }
}

/// Work-stealing job scheduler with one worker thread per hardware thread.
pub struct JobScheduler {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    /// Spawns a scheduler with `worker_count` workers (`0` means hardware concurrency).
    pub fn new(worker_count: usize) -> Self {
        let worker_count = if worker_count == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            worker_count
        };

        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dependencies: HashMap::new(),
                pending: 0,
            }),
            queue_cond: Condvar::new(),
            pending_cond: Condvar::new(),
        });

        let workers = (0..worker_count)
            .map(|_| {
                let inner = Arc::clone(&inner);
                std::thread::spawn(move || run_worker(inner))
            })
            .collect();

        Self { inner, workers }
    }

    /// Enqueues `job`, deferring execution until every dependency in `deps`
    /// that is not already done has completed. `deps` may be a single
    /// `&JobHandle` or anything iterable over `&JobHandle`.
    pub fn dispatch(&self, job: JobHandle, deps: impl JobDeps) -> JobHandle {
        let mut state = self.inner.state.lock().expect("job scheduler poisoned");
        state.pending += 1;

        let mut waiting = false;
        deps.for_each(|dep| {
            if !dep.is_done() {
                job.add_dependency();
                state.dependencies.entry(dep.id()).or_default().push(Arc::clone(&job));
                waiting = true;
            }
        });

        if !waiting {
            state.queue.push_back(Some(Arc::clone(&job)));
            self.inner.queue_cond.notify_all();
        }

        job
    }

    /// Blocks the caller until `job` reports [`JobEntry::is_done`].
    pub fn wait(&self, job: &JobHandle) {
        let state = self.inner.state.lock().expect("job scheduler poisoned");
        let _state = self
            .inner
            .pending_cond
            .wait_while(state, |_| !job.is_done())
            .expect("job scheduler poisoned");
    }

    /// Blocks the caller until no dispatched jobs remain pending.
    pub fn wait_all(&self) {
        let state = self.inner.state.lock().expect("job scheduler poisoned");
        let _state = self
            .inner
            .pending_cond
            .wait_while(state, |s| s.pending != 0)
            .expect("job scheduler poisoned");
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.wait_all();
        {
            let mut state = self.inner.state.lock().expect("job scheduler poisoned");
            state.queue.push_back(None);
            self.inner.queue_cond.notify_all();
        }
        for worker in std::mem::take(&mut self.workers) {
            let _ = worker.join();
        }
    }
}

fn notify_job(inner: &Inner, state: &mut State, job: &JobHandle) {
    if let Some(dependents) = state.dependencies.remove(&job.id()) {
        let mut should_notify_queue = false;
        for dependent in dependents {
            if dependent.notify_dependency() {
                state.queue.push_back(Some(dependent));
                should_notify_queue = true;
            }
        }
        if should_notify_queue {
            inner.queue_cond.notify_all();
        }
    }

    state.pending -= 1;
    inner.pending_cond.notify_all();
}

fn run_worker(inner: Arc<Inner>) {
    loop {
        let mut state = inner.state.lock().expect("job scheduler poisoned");
        state = inner
            .queue_cond
            .wait_while(state, |s| s.queue.is_empty())
            .expect("job scheduler poisoned");

        let job = match state.queue.front() {
            Some(Some(job)) => Arc::clone(job),
            Some(None) => break,
            None => unreachable!("woke with a non-empty queue"),
        };

        let (index, count, more) = job.get_work_items();
        if !more {
            state.queue.pop_front();
        }
        drop(state);

        if count == 0 {
            continue;
        }

        let mut index = index;
        let mut count = count;
        let mut done;
        loop {
            job.execute(index, count);
            done = job.notify_work_items(count);
            let (next_index, next_count, _) = job.get_work_items();
            index = next_index;
            count = next_count;
            if count == 0 {
                break;
            }
        }

        if done {
            let mut state = inner.state.lock().expect("job scheduler poisoned");
            notify_job(&inner, &mut state, &job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::job::{batch, simple};
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn job_graph_respects_dependency_order() {
        let scheduler = JobScheduler::new(4);

        let a_count = Arc::new(AtomicU64::new(0));
        let a_count_job = Arc::clone(&a_count);
        let a = scheduler.dispatch(batch(move |_| {
            a_count_job.fetch_add(1, Ordering::SeqCst);
        }, 1000, 10), ());

        let b_started_after_a = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&b_started_after_a);
        let a_for_check = Arc::clone(&a);
        let b = scheduler.dispatch(
            simple(move || {
                flag.store(a_for_check.is_done(), Ordering::SeqCst);
            }),
            &a,
        );

        let c = scheduler.dispatch(simple(|| {}), &b);

        scheduler.wait(&c);
        assert!(a.is_done());
        assert!(b.is_done());
        assert!(c.is_done());
        assert!(b_started_after_a.load(Ordering::SeqCst));
        assert_eq!(a_count.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn wait_all_returns_only_when_every_job_is_done() {
        let scheduler = JobScheduler::new(2);
        let jobs: Vec<JobHandle> = (0..20).map(|_| scheduler.dispatch(simple(|| {}), ())).collect();
        scheduler.wait_all();
        assert!(jobs.iter().all(|j| j.is_done()));
    }
}
