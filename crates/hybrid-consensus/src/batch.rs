// ORDERED BATCH RUNNER
// Runs indexed tasks on a bounded worker pool and emits results in index order.
//
// SAFETY INVARIANTS:
// 1. Exactly one result per index is emitted, in ascending index order, unless aborted
// 2. A result is emitted only after every lower index has been emitted
// 3. Abort stops dispatch and emission; undelivered results are dropped
// 4. One task failing does not affect its siblings

use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread;

enum Event {
    Done(usize),
    Abort,
}

/// Cancels a running batch.
///
/// Dropping the handle does not cancel anything.
#[derive(Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
    wake: Option<Sender<Event>>,
}

impl AbortHandle {
    fn new(wake: Option<Sender<Event>>) -> Self {
        AbortHandle {
            flag: Arc::new(AtomicBool::new(false)),
            wake,
        }
    }

    /// Handle for a batch whose results are already fully delivered.
    pub fn detached() -> Self {
        AbortHandle::new(None)
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Some(wake) = &self.wake {
            // The coordinator may already be gone.
            let _ = wake.send(Event::Abort);
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Deliver precomputed results through the same channel shape as [`run_ordered`].
pub fn completed<T: Send>(results: Vec<T>) -> (AbortHandle, Receiver<T>) {
    let (tx, rx) = mpsc::sync_channel(results.len());
    for result in results {
        // Capacity equals the number of results.
        let _ = tx.send(result);
    }
    (AbortHandle::detached(), rx)
}

/// Run `task(0..len)` in parallel, streaming results in index order.
///
/// The pool holds `min(available_parallelism, len)` threads. A single
/// coordinator thread dispatches indices and re-sequences completions.
pub fn run_ordered<T, F>(len: usize, task: F) -> (AbortHandle, Receiver<T>)
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    if len == 0 {
        return completed(Vec::new());
    }

    let (events_tx, events_rx) = mpsc::channel();
    let (out_tx, out_rx) = mpsc::sync_channel(len);
    let handle = AbortHandle::new(Some(events_tx.clone()));

    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(len);
    debug!("Starting ordered batch of {} tasks on {} workers", len, workers);

    let coordinator = Coordinator {
        len,
        workers,
        task: Arc::new(task),
        slots: Arc::new(Mutex::new((0..len).map(|_| None).collect())),
        flag: handle.flag.clone(),
        events_tx,
        events_rx,
        out_tx,
    };
    thread::spawn(move || coordinator.run());

    (handle, out_rx)
}

struct Coordinator<T, F> {
    len: usize,
    workers: usize,
    task: Arc<F>,
    slots: Arc<Mutex<Vec<Option<T>>>>,
    flag: Arc<AtomicBool>,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    out_tx: SyncSender<T>,
}

impl<T, F> Coordinator<T, F>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    fn run(self) {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("batch-worker-{}", i))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Worker pool unavailable ({}), running batch sequentially", e);
                self.run_sequential();
                return;
            }
        };

        for index in 0..self.len {
            if self.aborted() {
                return;
            }
            let task = Arc::clone(&self.task);
            let slots = Arc::clone(&self.slots);
            let flag = Arc::clone(&self.flag);
            let done = self.events_tx.clone();
            pool.spawn(move || {
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                let result = task(index);
                slots.lock()[index] = Some(result);
                let _ = done.send(Event::Done(index));
            });
        }

        self.reassemble();
    }

    fn reassemble(self) {
        let Coordinator {
            len,
            slots,
            flag,
            events_tx,
            events_rx,
            out_tx,
            ..
        } = self;
        // Workers and the abort handle hold the remaining senders.
        drop(events_tx);

        let mut ready = vec![false; len];
        let mut next = 0;
        while next < len {
            match events_rx.recv() {
                Ok(Event::Done(index)) => ready[index] = true,
                Ok(Event::Abort) | Err(_) => return,
            }
            while next < len && ready[next] {
                if flag.load(Ordering::SeqCst) {
                    return;
                }
                let Some(result) = slots.lock()[next].take() else {
                    return;
                };
                if out_tx.send(result).is_err() {
                    return;
                }
                next += 1;
            }
        }
    }

    fn run_sequential(self) {
        for index in 0..self.len {
            if self.aborted() {
                return;
            }
            if self.out_tx.send((self.task)(index)).is_err() {
                return;
            }
        }
    }

    fn aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
