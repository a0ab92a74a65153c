//! Delayed, fire-and-forget delivery of blocks to peers

use std::{
    any::Any,
    cmp::{Ordering, Reverse},
    collections::BinaryHeap,
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

type Job = Box<dyn FnOnce() + Send + 'static>;
type PanicHook = Box<dyn Fn() + Send + Sync + 'static>;

/// Payload of a panic raised by a job.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

struct Entry {
    due: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    Running,
    Draining { deadline: Instant },
}

struct Queue {
    entries: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
    state: QueueState,
}

struct Shared {
    queue: Mutex<Queue>,
    cvar: Condvar,
    panic: Mutex<Option<PanicPayload>>,
    on_panic: PanicHook,
}

impl Shared {
    /// Keeps the first panic payload and fires the hook for every panic.
    fn record_panic(&self, payload: PanicPayload) {
        self.panic.lock().get_or_insert(payload);
        (self.on_panic)();
    }
}

/// What happened to the queue when a scheduler shut down.
#[derive(Debug)]
pub struct Teardown {
    /// Jobs which never ran.
    pub dropped: usize,
    /// First panic raised by a job, if any.
    pub panic: Option<PanicPayload>,
}

/// Timer pool which runs each scheduled job once its delay has elapsed.
///
/// Jobs with equal due times run in the order they were scheduled. There is
/// no other ordering between jobs, and nothing waits for a job to finish.
///
/// A panicking job does not take its worker down. The panic is kept for
/// [`DeliveryScheduler::shutdown`] and the scheduler's panic hook is called.
pub struct DeliveryScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

/// Cloneable handle used by mining threads to schedule deliveries.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl DeliveryScheduler {
    /// Starts a scheduler backed by `workers` threads.
    pub fn new(workers: usize) -> io::Result<Self> {
        Self::with_panic_hook(workers, || ())
    }

    /// Starts a scheduler which calls `on_panic` on the worker thread each
    /// time a job panics.
    pub fn with_panic_hook<F>(workers: usize, on_panic: F) -> io::Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                entries: BinaryHeap::new(),
                next_seq: 0,
                state: QueueState::Running,
            }),
            cvar: Condvar::new(),
            panic: Mutex::new(None),
            on_panic: Box::new(on_panic),
        });

        let mut scheduler = Self { shared, workers: Vec::with_capacity(workers) };
        for i in 0..workers.max(1) {
            let shared = Arc::clone(&scheduler.shared);
            let handle = thread::Builder::new()
                .name(format!("delivery-{i}"))
                .spawn(move || run_worker(&shared))?;
            scheduler.workers.push(handle);
        }

        Ok(scheduler)
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle { shared: Arc::clone(&self.shared) }
    }

    /// Stops accepting jobs, runs the jobs that fall due within `grace`, and
    /// drops the rest.
    pub fn shutdown(mut self, grace: Duration) -> Teardown {
        self.close(grace)
    }

    fn close(&mut self, grace: Duration) -> Teardown {
        {
            let mut queue = self.shared.queue.lock();
            if queue.state == QueueState::Running {
                queue.state =
                    QueueState::Draining { deadline: Instant::now() + grace };
            }
            self.shared.cvar.notify_all();
        }

        let mut worker_panic = None;
        for worker in self.workers.drain(..) {
            if let Err(payload) = worker.join() {
                worker_panic.get_or_insert(payload);
            }
        }

        let mut queue = self.shared.queue.lock();
        let dropped = queue.entries.len();
        queue.entries.clear();

        Teardown {
            dropped,
            panic: self.shared.panic.lock().take().or(worker_panic),
        }
    }
}

impl Drop for DeliveryScheduler {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.close(Duration::ZERO);
        }
    }
}

impl SchedulerHandle {
    /// Runs `job` on a scheduler thread after `delay`. Returns false, and
    /// drops `job`, if the scheduler is shutting down.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.state != QueueState::Running {
            return false;
        }

        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.push(Reverse(Entry {
            due: Instant::now() + delay,
            seq,
            job: Box::new(job),
        }));
        self.shared.cvar.notify_one();

        true
    }
}

fn run_worker(shared: &Shared) {
    let mut queue = shared.queue.lock();
    loop {
        let now = Instant::now();
        let next_due = queue.entries.peek().map(|Reverse(entry)| entry.due);

        if let QueueState::Draining { deadline } = queue.state {
            if next_due.map_or(true, |due| due > deadline) || now >= deadline {
                break;
            }
        }

        match next_due {
            Some(due) if due <= now => {
                if let Some(Reverse(entry)) = queue.entries.pop() {
                    MutexGuard::unlocked(&mut queue, || {
                        let job = AssertUnwindSafe(entry.job);
                        if let Err(payload) = panic::catch_unwind(job) {
                            shared.record_panic(payload);
                        }
                    });
                }
            }
            Some(due) => {
                let wake = match queue.state {
                    QueueState::Running => due,
                    QueueState::Draining { deadline } => due.min(deadline),
                };
                shared.cvar.wait_until(&mut queue, wake);
            }
            None => shared.cvar.wait(&mut queue),
        }
    }
}
