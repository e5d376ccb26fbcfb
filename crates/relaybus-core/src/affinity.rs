//! Thread-affinity execution
//!
//! Subscriptions registered with UI affinity must run on one designated
//! thread, usually the thread that owns the host's main loop. The bus only
//! needs two things from the host: whether the caller is already on that
//! thread, and a way to queue a job onto it.
//!
//! Two dispatchers are provided:
//! - [`ThreadDispatcher`] owns a dedicated, named worker thread.
//! - [`ManualDispatcher`] queues jobs for a host thread that drains them
//!   from its own loop with [`ManualDispatcher::run_pending`].

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use crate::types::AffinityJob;

/// Capability to run callbacks on one designated thread
pub trait AffinityDispatcher: Send + Sync {
    /// Whether the calling thread is the designated thread
    fn is_current(&self) -> bool;

    /// Queue a job for the designated thread
    ///
    /// Must not block waiting for the job to run.
    fn dispatch(&self, job: AffinityJob);
}

/// Dispatcher backed by a dedicated worker thread
pub struct ThreadDispatcher {
    sender: Mutex<Option<mpsc::Sender<AffinityJob>>>,
    thread_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadDispatcher {
    /// Spawn the worker thread
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<AffinityJob>();
        let handle = thread::Builder::new().name(name.into()).spawn(move || {
            for job in receiver {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("Affinity job panicked");
                }
            }
            tracing::debug!("Affinity thread exiting");
        })?;
        let thread_id = handle.thread().id();

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread_id,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Id of the worker thread
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Stop accepting jobs and wait for queued jobs to finish
    ///
    /// Calling this from the worker thread itself only closes the queue.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if thread::current().id() == self.thread_id {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("Affinity thread terminated abnormally");
            }
        }
    }
}

impl AffinityDispatcher for ThreadDispatcher {
    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn dispatch(&self, job: AffinityJob) {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => {
                if sender.send(job).is_err() {
                    tracing::warn!("Affinity thread is gone, job dropped");
                }
            }
            None => tracing::warn!("Affinity dispatcher shut down, job dropped"),
        }
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadDispatcher")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

/// Dispatcher whose queue is drained by the owning host thread
pub struct ManualDispatcher {
    owner: ThreadId,
    queue: Mutex<VecDeque<AffinityJob>>,
}

impl ManualDispatcher {
    /// Designate the calling thread as the affinity thread
    pub fn for_current_thread() -> Self {
        Self {
            owner: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of jobs waiting to run
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every queued job, including jobs queued while draining
    ///
    /// Returns the number of jobs run. Does nothing when called off the
    /// owning thread.
    pub fn run_pending(&self) -> usize {
        if !self.is_current() {
            tracing::warn!("run_pending called off the affinity thread");
            return 0;
        }

        let mut ran = 0;
        loop {
            // Pop under the lock, run outside it: jobs may queue more jobs.
            let job = self.queue.lock().pop_front();
            let Some(job) = job else { break };
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("Affinity job panicked");
            }
            ran += 1;
        }
        ran
    }
}

impl AffinityDispatcher for ManualDispatcher {
    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn dispatch(&self, job: AffinityJob) {
        self.queue.lock().push_back(job);
    }
}

impl std::fmt::Debug for ManualDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualDispatcher")
            .field("owner", &self.owner)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_thread_dispatcher_runs_on_worker() {
        let dispatcher = ThreadDispatcher::spawn("affinity-test").unwrap();
        assert!(!dispatcher.is_current());

        let (tx, rx) = mpsc::channel();
        let worker = dispatcher.thread_id();
        dispatcher.dispatch(Box::new(move || {
            tx.send(thread::current().id()).unwrap();
        }));

        let ran_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(ran_on, worker);
    }

    #[test]
    fn test_thread_dispatcher_survives_panicking_job() {
        let dispatcher = ThreadDispatcher::spawn("affinity-panic").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        dispatcher.dispatch(Box::new(|| panic!("boom")));
        let c = counter.clone();
        dispatcher.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_dispatcher_drops_after_shutdown() {
        let dispatcher = ThreadDispatcher::spawn("affinity-closed").unwrap();
        dispatcher.shutdown();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        dispatcher.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_dispatcher_queue() {
        let dispatcher = Arc::new(ManualDispatcher::for_current_thread());
        assert!(dispatcher.is_current());

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = counter.clone();
            dispatcher.dispatch(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(dispatcher.pending(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert_eq!(dispatcher.run_pending(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_manual_dispatcher_off_thread() {
        let dispatcher = Arc::new(ManualDispatcher::for_current_thread());
        dispatcher.dispatch(Box::new(|| {}));

        let d = dispatcher.clone();
        let (current, ran) = thread::spawn(move || (d.is_current(), d.run_pending()))
            .join()
            .unwrap();
        assert!(!current);
        assert_eq!(ran, 0);
        assert_eq!(dispatcher.pending(), 1);
    }
}
