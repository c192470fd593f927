//! Asynchronous I/O request state machine (§4.7).
//!
//! A request starts in [`IoStatus::Reset`], moves to [`IoStatus::Pending`]
//! once submitted, and terminates in [`IoStatus::Success`] or
//! [`IoStatus::Error`]. Completion callbacks registered via
//! [`IoRequest::execute_on_completion`] run once the request reaches a
//! terminal state — immediately, inline, if it already has.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};

/// Status of an [`IoRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// Completed successfully.
    Success,
    /// Completed with an error.
    Error,
    /// Submitted, not yet complete.
    Pending,
    /// Not yet submitted.
    Reset,
}

impl IoStatus {
    fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::Error,
            2 => Self::Pending,
            _ => Self::Reset,
        }
    }

    fn code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::Pending => 2,
            Self::Reset => 3,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// A batchable, waitable asynchronous I/O request.
pub struct IoRequest {
    status: AtomicU32,
    callbacks: Mutex<Vec<Box<dyn FnOnce(IoStatus) + Send>>>,
    cond: Condvar,
}

impl Default for IoRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl IoRequest {
    /// Creates a request in [`IoStatus::Reset`].
    pub fn new() -> Self {
        Self {
            status: AtomicU32::new(IoStatus::Reset.code()),
            callbacks: Mutex::new(Vec::new()),
            cond: Condvar::new(),
        }
    }

    /// Returns the current status. May be stale the instant it returns if
    /// the request is still pending.
    pub fn status(&self) -> IoStatus {
        IoStatus::from_code(self.status.load(Ordering::Acquire))
    }

    /// Marks the request as submitted.
    pub fn submit(&self) {
        self.set_status(IoStatus::Pending);
    }

    /// Blocks until the request reaches a terminal state, including the
    /// completion of every registered callback, and returns that status.
    pub fn wait(&self) -> IoStatus {
        let guard = self.callbacks.lock().expect("io request poisoned");
        let _guard = self
            .cond
            .wait_while(guard, |_| !self.status().is_terminal())
            .expect("io request poisoned");
        self.status()
    }

    /// Registers a completion callback. Runs immediately if the request has
    /// already reached a terminal state.
    pub fn execute_on_completion(&self, callback: impl FnOnce(IoStatus) + Send + 'static) {
        let mut callbacks = self.callbacks.lock().expect("io request poisoned");
        let status = self.status();

        if !status.is_terminal() {
            callbacks.push(Box::new(callback));
            return;
        }

        drop(callbacks);
        callback(status);
    }

    /// Transitions to a terminal status, waking waiters and draining every
    /// registered callback. Calling this twice with a terminal status is a
    /// programmer error; only the first transition has any effect.
    pub fn complete(&self, status: IoStatus) {
        debug_assert!(status.is_terminal());
        self.set_status(status);

        let callbacks = {
            let mut callbacks = self.callbacks.lock().expect("io request poisoned");
            self.cond.notify_all();
            std::mem::take(&mut *callbacks)
        };

        for callback in callbacks {
            callback(status);
        }
    }

    fn set_status(&self, status: IoStatus) {
        let _guard = self.callbacks.lock().expect("io request poisoned");
        self.status.store(status.code(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn callback_registered_before_completion_runs_on_complete() {
        let request = Arc::new(IoRequest::new());
        request.submit();

        let ran = Arc::new(AtomicBool::new(false));
        let ran_cb = Arc::clone(&ran);
        request.execute_on_completion(move |status| {
            assert_eq!(status, IoStatus::Success);
            ran_cb.store(true, Ordering::SeqCst);
        });

        assert!(!ran.load(Ordering::SeqCst));
        request.complete(IoStatus::Success);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn callback_registered_after_completion_runs_inline() {
        let request = IoRequest::new();
        request.submit();
        request.complete(IoStatus::Error);

        let ran = Arc::new(AtomicBool::new(false));
        let ran_cb = Arc::clone(&ran);
        request.execute_on_completion(move |status| {
            assert_eq!(status, IoStatus::Error);
            ran_cb.store(true, Ordering::SeqCst);
        });
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_blocks_until_completion() {
        let request = Arc::new(IoRequest::new());
        request.submit();

        let worker = {
            let request = Arc::clone(&request);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(10));
                request.complete(IoStatus::Success);
            })
        };

        assert_eq!(request.wait(), IoStatus::Success);
        worker.join().unwrap();
    }
}
