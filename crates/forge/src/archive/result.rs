//! Build job result/progress bookkeeping (§4.6, §5 cancellation, §7).

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Condvar, Mutex};

use super::format::BuiltFile;

/// Outcome of a build job, stored atomically so any thread can observe or
/// set it. `InProgress` is never stored; it's synthesized by [`BuildJob::progress`]
/// implementations when the stored result is still `Success` but the job's
/// work items aren't all done yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    /// Completed successfully.
    Success,
    /// Still running.
    InProgress,
    /// Aborted via [`BuildJob::abort`].
    Aborted,
    /// Caller-supplied parameters were contradictory or unsupported.
    InvalidArgument,
    /// An input file was malformed.
    InvalidInput,
    /// Reading or writing external storage failed.
    IoError,
}

impl BuildResult {
    fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InProgress => 1,
            Self::Aborted => -1,
            Self::InvalidArgument => -2,
            Self::InvalidInput => -3,
            Self::IoError => -4,
        }
    }

    fn from_code(code: i32) -> Self {
        match code {
            1 => Self::InProgress,
            -1 => Self::Aborted,
            -2 => Self::InvalidArgument,
            -3 => Self::InvalidInput,
            -4 => Self::IoError,
            _ => Self::Success,
        }
    }

    /// `true` for any result other than `Success`/`InProgress`.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Aborted | Self::InvalidArgument | Self::InvalidInput | Self::IoError)
    }
}

impl From<crate::error::Error> for BuildResult {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::InvalidArgument(_) => Self::InvalidArgument,
            crate::error::Error::IoError(_) => Self::IoError,
            crate::error::Error::Aborted => Self::Aborted,
            _ => Self::InvalidInput,
        }
    }
}

/// A job's result, sticky once set to a failure: the first `store`/
/// `fail_if_success` past `Success` wins, matching the job's own
/// compare-and-swap in the original build tool.
#[derive(Debug)]
pub struct AtomicBuildResult(AtomicI32);

impl Default for AtomicBuildResult {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicBuildResult {
    /// Starts in the `Success` state.
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicI32::new(BuildResult::Success.code()))
    }

    /// Loads the current result.
    #[must_use]
    pub fn load(&self) -> BuildResult {
        BuildResult::from_code(self.0.load(Ordering::Acquire))
    }

    /// Sets `result` only if the current value is still `Success`; leaves an
    /// already-failed or aborted result untouched.
    pub fn fail_if_success(&self, result: BuildResult) {
        let success = BuildResult::Success.code();
        let _ = self.0.compare_exchange(success, result.code(), Ordering::AcqRel, Ordering::Acquire);
    }
}

/// Summed work-item progress across a build job (or the whole builder).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildProgress {
    /// Work items completed so far.
    pub completed: u32,
    /// Total work items, once known.
    pub total: u32,
}

impl BuildProgress {
    /// Adds another job's counts to this one.
    pub fn add(&mut self, other: Self) {
        self.completed += other.completed;
        self.total += other.total;
    }
}

/// Self-contained completion signal a build job's dispatched closure sets
/// once it's done, so `file_info`/`progress` can block without needing a
/// reference back to the scheduler that ran the work.
#[derive(Default)]
pub struct JobCompletion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl JobCompletion {
    /// A completion that hasn't fired yet.
    #[must_use]
    pub fn new() -> Self {
        Self { done: Mutex::new(false), cond: Condvar::new() }
    }

    /// Marks this job done and wakes any waiters.
    pub fn mark_done(&self) {
        *self.done.lock().expect("job completion poisoned") = true;
        self.cond.notify_all();
    }

    /// `true` once [`Self::mark_done`] has been called.
    #[must_use]
    pub fn is_done(&self) -> bool {
        *self.done.lock().expect("job completion poisoned")
    }

    /// Blocks until [`Self::mark_done`] has been called.
    pub fn wait(&self) {
        let done = self.done.lock().expect("job completion poisoned");
        let _done = self.cond.wait_while(done, |d| !*d).expect("job completion poisoned");
    }
}

/// A single file's worth of asynchronous build work (§4.6 "Job kinds").
///
/// Implementations dispatch their work against a [`crate::jobs::JobScheduler`]
/// at construction time; every other method only inspects already-running
/// state.
pub trait BuildJob: Send + Sync {
    /// Current status and work-item progress. Must return immediately.
    fn progress(&self) -> (BuildResult, BuildProgress);

    /// Blocks until this job's dispatched work completes, then returns the
    /// finished file (or the failure that prevented it).
    fn file_info(&self) -> (BuildResult, Option<BuiltFile>);

    /// Requests cancellation; has no effect once the job has already failed,
    /// aborted, or succeeded.
    fn abort(&self);
}
