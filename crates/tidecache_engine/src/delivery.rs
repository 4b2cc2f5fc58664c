//! Delivery targets: the execution contexts observer callbacks run on.
//!
//! A target only has to guarantee one thing: jobs dispatched to it run in
//! dispatch order. The provider relies on that for per-observer FIFO
//! delivery across successive reconciliations.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::mpsc;
use std::thread;
use tracing::warn;

/// A unit of work handed to a delivery target.
pub type DeliveryJob = Box<dyn FnOnce() + Send + 'static>;

/// An execution context for observer callbacks.
pub trait DeliveryTarget: Send + Sync {
    /// Schedules `job`. Jobs must run in the order they were dispatched.
    fn dispatch(&self, job: DeliveryJob);
}

/// Runs jobs inline on the dispatching thread.
///
/// For a provider this is the background reconciliation worker, so
/// callbacks must be quick and must not block.
#[derive(Debug, Default, Clone, Copy)]
pub struct Immediate;

impl DeliveryTarget for Immediate {
    fn dispatch(&self, job: DeliveryJob) {
        job();
    }
}

/// Runs jobs one after another on a dedicated thread.
///
/// The thread exits once the queue is dropped and every job dispatched
/// before that has run.
#[derive(Debug)]
pub struct SerialQueue {
    name: String,
    sender: mpsc::Sender<DeliveryJob>,
}

impl SerialQueue {
    /// Starts a queue backed by a new thread called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<DeliveryJob>();

        thread::Builder::new().name(name.clone()).spawn(move || {
            for job in receiver {
                job();
            }
        })?;

        Ok(Self { name, sender })
    }

    /// Returns the thread name of this queue.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DeliveryTarget for SerialQueue {
    fn dispatch(&self, job: DeliveryJob) {
        if self.sender.send(job).is_err() {
            warn!(queue = %self.name, "serial queue thread has stopped, delivery dropped");
        }
    }
}

/// A queue drained explicitly by its owner.
///
/// This models a main-thread style context: the owning loop calls
/// [`ManualQueue::run_pending`] whenever it is ready to process callbacks.
#[derive(Default)]
pub struct ManualQueue {
    jobs: Mutex<VecDeque<DeliveryJob>>,
}

impl ManualQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs queued jobs until the queue is empty, including jobs enqueued
    /// by the jobs themselves. Returns the number of jobs run.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // Lock released before running the job.
            let next = self.jobs.lock().pop_front();
            match next {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Returns the number of jobs waiting.
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Returns true if no job is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ManualQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualQueue")
            .field("pending", &self.len())
            .finish()
    }
}

impl DeliveryTarget for ManualQueue {
    fn dispatch(&self, job: DeliveryJob) {
        self.jobs.lock().push_back(job);
    }
}
