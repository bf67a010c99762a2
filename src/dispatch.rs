use std::sync::{Arc, mpsc};

use log::warn;

/// Deferred listener invocation.
pub type Thunk = Box<dyn FnOnce() + Send + 'static>;

/// Generic work submission interface. Consumers that own their own
/// executor register with a submitter handle instead of a serial queue.
pub trait WorkSubmitter: Send + Sync {
    fn submit(&self, job: Thunk);
}

/// Execution context recorded at registration time.
/// Selects where a notification actually runs.
#[derive(Clone)]
pub enum ExecContext {
    /// Runs synchronously on the delivering thread.
    /// A hanging listener stalls the owning ingress thread.
    Inline,

    /// Deferred onto a serial callback queue, delivery
    /// returns immediately.
    Queue(SerialQueue),

    /// Deferred onto a consumer supplied executor.
    Submitter(Arc<dyn WorkSubmitter>),
}

impl ExecContext {
    /// Single dispatch point for all notification delivery.
    pub fn deliver(&self, thunk: Thunk) {
        match self {
            Self::Inline => thunk(),
            Self::Queue(queue) => queue.post(thunk),
            Self::Submitter(submitter) => submitter.submit(thunk),
        }
    }
}

/// Serial callback queue: a dedicated thread draining an unbounded
/// FIFO. Jobs posted from any thread run one at a time, in post order.
/// The thread exits once every handle is dropped.
#[derive(Clone)]
pub struct SerialQueue {
    tx: mpsc::Sender<Thunk>,
}

impl SerialQueue {
    pub fn new(name: &str) -> Self {
        let (tx, rx) = mpsc::channel::<Thunk>();

        let spawned = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            });

        if let Err(e) = spawned {
            warn!("failed to spawn serial queue \"{}\": {}", name, e);
        }

        Self { tx }
    }

    fn post(&self, thunk: Thunk) {
        // only fails when the queue thread is gone, nothing to notify
        let _ = self.tx.send(thunk);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn inline_runs_on_calling_thread() {
        let hit = Arc::new(Mutex::new(false));
        let flag = hit.clone();

        ExecContext::Inline.deliver(Box::new(move || {
            *flag.lock().unwrap() = true;
        }));

        assert!(*hit.lock().unwrap());
    }

    #[test]
    fn serial_queue_preserves_post_order() {
        let queue = SerialQueue::new("test-queue");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (done_tx, done_rx) = mpsc::channel();

        for i in 0..16 {
            let seen = seen.clone();
            let done_tx = done_tx.clone();
            ExecContext::Queue(queue.clone()).deliver(Box::new(move || {
                seen.lock().unwrap().push(i);
                let _ = done_tx.send(());
            }));
        }

        for _ in 0..16 {
            done_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("queued job never ran");
        }

        assert_eq!(*seen.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn submitter_receives_jobs() {
        struct Immediate;

        impl WorkSubmitter for Immediate {
            fn submit(&self, job: Thunk) {
                job();
            }
        }

        let hit = Arc::new(Mutex::new(0u32));
        let count = hit.clone();

        let ctx = ExecContext::Submitter(Arc::new(Immediate));
        ctx.deliver(Box::new(move || *count.lock().unwrap() += 1));

        assert_eq!(*hit.lock().unwrap(), 1);
    }
}
