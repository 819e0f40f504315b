//! Callback delivery thread.
//!
//! Platform callbacks never run on the thread that made the remote call.
//! Every callback is posted to a single delivery thread, in order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }
}

/// Single-threaded, ordered callback executor.
pub struct CallbackDispatcher {
    sender: Option<Sender<Job>>,
    pending: Arc<Pending>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl CallbackDispatcher {
    pub fn new() -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let pending = Arc::new(Pending::default());
        let worker_pending = Arc::clone(&pending);

        let worker = thread::Builder::new()
            .name("loopback-callbacks".to_string())
            .spawn(move || {
                for job in receiver {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        tracing::error!("Callback panicked on the delivery thread");
                    }
                    worker_pending.done();
                }
                tracing::trace!("Callback delivery thread exiting");
            })?;
        let worker_id = worker.thread().id();

        Ok(Self {
            sender: Some(sender),
            pending,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Queue `job` behind everything posted so far.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        self.pending.add();
        if sender.send(Box::new(job)).is_err() {
            tracing::warn!("Callback delivery thread is gone; dropping callback");
            self.pending.done();
        }
    }

    /// Block until every posted callback, including ones posted by
    /// callbacks, has run.
    pub fn flush(&self) {
        if self.is_delivery_thread() {
            tracing::warn!("flush() called from the delivery thread; ignoring");
            return;
        }
        let count = self
            .pending
            .count
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _drained = self
            .pending
            .drained
            .wait_while(count, |count| *count > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn is_delivery_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for CallbackDispatcher {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            // The last owner can be a callback on the worker itself.
            if thread::current().id() != self.worker_id && worker.join().is_err() {
                tracing::warn!("Callback delivery thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_callbacks_in_order_off_thread() {
        let dispatcher = CallbackDispatcher::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let caller = thread::current().id();

        for i in 0..5 {
            let seen = Arc::clone(&seen);
            dispatcher.post(move || {
                assert_ne!(thread::current().id(), caller);
                seen.lock().unwrap().push(i);
            });
        }
        dispatcher.flush();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn flush_waits_for_nested_posts() {
        let dispatcher = Arc::new(CallbackDispatcher::new().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_dispatcher = Arc::clone(&dispatcher);
        let inner_hits = Arc::clone(&hits);
        dispatcher.post(move || {
            let hits = Arc::clone(&inner_hits);
            inner_dispatcher.post(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        });
        dispatcher.flush();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn knows_its_delivery_thread() {
        let dispatcher = Arc::new(CallbackDispatcher::new().unwrap());
        assert!(!dispatcher.is_delivery_thread());

        let (tx, rx) = std::sync::mpsc::channel();
        let inner = Arc::clone(&dispatcher);
        dispatcher.post(move || {
            // flush() from a callback must return instead of deadlocking.
            inner.flush();
            tx.send(inner.is_delivery_thread()).unwrap();
        });
        dispatcher.flush();

        assert!(rx.recv().unwrap());
    }

    #[test]
    fn panicking_callback_does_not_wedge_flush() {
        let dispatcher = CallbackDispatcher::new().unwrap();
        dispatcher.post(|| panic!("boom"));
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&hits);
        dispatcher.post(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.flush();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
