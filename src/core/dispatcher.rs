//! # Task Dispatcher
//!
//! Fire-and-forget execution of remote work on the tokio runtime.
//!
//! Each dispatch bumps its kind's generation and spawns the work. Nothing is
//! cancelled: an older worker of the same kind runs to completion, and its
//! result carries the generation it was started with so the sink can
//! recognise it as stale. Every result, including a panic converted to
//! `InternalFailure`, reaches [`ResultSink::apply_result`] and nowhere else.

use futures::FutureExt;
use log::{debug, error};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::core::error::{ErrorKind, RemoteResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Search,
    Browse,
    ImageFetch,
    DetailFetch,
    Submit,
}

impl OpKind {
    pub const ALL: [OpKind; 5] = [
        OpKind::Search,
        OpKind::Browse,
        OpKind::ImageFetch,
        OpKind::DetailFetch,
        OpKind::Submit,
    ];

    fn index(self) -> usize {
        match self {
            OpKind::Search => 0,
            OpKind::Browse => 1,
            OpKind::ImageFetch => 2,
            OpKind::DetailFetch => 3,
            OpKind::Submit => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Search => "search",
            OpKind::Browse => "browse",
            OpKind::ImageFetch => "image-fetch",
            OpKind::DetailFetch => "detail-fetch",
            OpKind::Submit => "submit",
        }
    }
}

/// One dispatched unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OpKind,
    pub key: String,
    pub generation: u64,
}

#[derive(Debug)]
pub struct Completion<T> {
    pub op: Operation,
    pub result: RemoteResult<T>,
}

/// The single place where worker results touch shared state.
pub trait ResultSink<T>: Send + Sync {
    fn apply_result(&self, completion: Completion<T>);
}

/// Latest generation issued per kind. Lock-free so the sink can consult it
/// while holding its own lock.
#[derive(Default)]
pub struct Generations {
    latest: [AtomicU64; 5],
}

impl Generations {
    fn issue(&self, kind: OpKind) -> u64 {
        self.latest[kind.index()].fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest(&self, kind: OpKind) -> u64 {
        self.latest[kind.index()].load(Ordering::SeqCst)
    }

    pub fn is_current(&self, op: &Operation) -> bool {
        self.latest(op.kind) == op.generation
    }
}

#[derive(Default)]
struct Slots {
    in_flight: [AtomicUsize; 5],
    total: AtomicUsize,
    idle: Notify,
}

/// Marks one worker of `kind` in flight until dropped, whether the worker
/// finished, panicked, or was torn down with the runtime.
struct SlotGuard {
    slots: Arc<Slots>,
    kind: OpKind,
}

impl SlotGuard {
    fn acquire(slots: Arc<Slots>, kind: OpKind) -> Self {
        slots.in_flight[kind.index()].fetch_add(1, Ordering::SeqCst);
        slots.total.fetch_add(1, Ordering::SeqCst);
        Self { slots, kind }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.in_flight[self.kind.index()].fetch_sub(1, Ordering::SeqCst);
        if self.slots.total.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.slots.idle.notify_waiters();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

pub struct TaskDispatcher<T> {
    runtime: Handle,
    generations: Arc<Generations>,
    slots: Arc<Slots>,
    sink: Arc<dyn ResultSink<T>>,
}

impl<T: Send + 'static> TaskDispatcher<T> {
    pub fn new(runtime: Handle, generations: Arc<Generations>, sink: Arc<dyn ResultSink<T>>) -> Self {
        Self {
            runtime,
            generations,
            slots: Arc::new(Slots::default()),
            sink,
        }
    }

    /// Starts `work` in the background and returns the operation it runs as.
    pub fn dispatch<F>(&self, kind: OpKind, key: impl Into<String>, work: F) -> Operation
    where
        F: Future<Output = RemoteResult<T>> + Send + 'static,
    {
        let op = Operation {
            kind,
            key: key.into(),
            generation: self.generations.issue(kind),
        };
        debug!(
            "Dispatching {} {:?} (generation {})",
            kind.as_str(),
            op.key,
            op.generation
        );

        let guard = SlotGuard::acquire(self.slots.clone(), kind);
        let sink = self.sink.clone();
        let tagged = op.clone();

        self.runtime.spawn(async move {
            let _guard = guard;
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    error!(
                        "{} worker for {:?} panicked: {}",
                        tagged.kind.as_str(),
                        tagged.key,
                        panic_message(panic.as_ref())
                    );
                    Err(ErrorKind::InternalFailure)
                }
            };

            let label = format!("{} {:?}", tagged.kind.as_str(), tagged.key);
            let completion = Completion { op: tagged, result };
            if let Err(panic) =
                std::panic::catch_unwind(AssertUnwindSafe(|| sink.apply_result(completion)))
            {
                error!(
                    "Applying result of {} panicked: {}",
                    label,
                    panic_message(panic.as_ref())
                );
            }
        });

        op
    }

    pub fn is_busy(&self, kind: OpKind) -> bool {
        self.in_flight(kind) > 0
    }

    pub fn in_flight(&self, kind: OpKind) -> usize {
        self.slots.in_flight[kind.index()].load(Ordering::SeqCst)
    }

    pub fn latest(&self, kind: OpKind) -> u64 {
        self.generations.latest(kind)
    }

    /// Waits until no worker is in flight.
    pub async fn settle(&self) {
        loop {
            let notified = self.slots.idle.notified();
            if self.slots.total.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        generations: Arc<Generations>,
        seen: Mutex<Vec<(Operation, RemoteResult<u32>, bool)>>,
    }

    impl ResultSink<u32> for RecordingSink {
        fn apply_result(&self, completion: Completion<u32>) {
            let current = self.generations.is_current(&completion.op);
            self.seen
                .lock()
                .unwrap()
                .push((completion.op, completion.result, current));
        }
    }

    fn dispatcher() -> (TaskDispatcher<u32>, Arc<RecordingSink>) {
        let generations = Arc::new(Generations::default());
        let sink = Arc::new(RecordingSink {
            generations: generations.clone(),
            ..Default::default()
        });
        (
            TaskDispatcher::new(Handle::current(), generations, sink.clone()),
            sink,
        )
    }

    #[tokio::test]
    async fn test_generations_increase_per_kind() {
        let (dispatcher, _sink) = dispatcher();
        let a = dispatcher.dispatch(OpKind::Search, "bat", async { Ok(1) });
        let b = dispatcher.dispatch(OpKind::Search, "batman", async { Ok(2) });
        let c = dispatcher.dispatch(OpKind::Browse, "movie", async { Ok(3) });
        assert_eq!(a.generation, 1);
        assert_eq!(b.generation, 2);
        assert_eq!(c.generation, 1);
        assert_eq!(dispatcher.latest(OpKind::Search), 2);
        dispatcher.settle().await;
    }

    #[tokio::test]
    async fn test_late_result_of_superseded_op_is_marked_stale() {
        let (dispatcher, sink) = dispatcher();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        dispatcher.dispatch(OpKind::Search, "bat", async move {
            let _ = release_rx.await;
            Ok(1)
        });
        dispatcher.dispatch(OpKind::Search, "batman", async { Ok(2) });

        // Let the newer one finish first, then release the older one.
        tokio::time::sleep(Duration::from_millis(20)).await;
        release_tx.send(()).unwrap();
        dispatcher.settle().await;

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let (newer, _, newer_current) = &seen[0];
        let (older, _, older_current) = &seen[1];
        assert_eq!(newer.key, "batman");
        assert!(*newer_current);
        assert_eq!(older.key, "bat");
        assert!(!*older_current);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_failure_and_frees_slot() {
        let (dispatcher, sink) = dispatcher();
        dispatcher.dispatch(OpKind::DetailFetch, "42", async {
            if true {
                panic!("boom");
            }
            Ok(0)
        });
        dispatcher.settle().await;

        assert!(!dispatcher.is_busy(OpKind::DetailFetch));
        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, Err(ErrorKind::InternalFailure));
    }

    #[tokio::test]
    async fn test_busy_while_running() {
        let (dispatcher, _sink) = dispatcher();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        dispatcher.dispatch(OpKind::ImageFetch, "poster", async move {
            let _ = release_rx.await;
            Ok(7)
        });
        assert!(dispatcher.is_busy(OpKind::ImageFetch));
        assert!(!dispatcher.is_busy(OpKind::Search));
        release_tx.send(()).unwrap();
        dispatcher.settle().await;
        assert_eq!(dispatcher.in_flight(OpKind::ImageFetch), 0);
    }

    #[tokio::test]
    async fn test_settle_returns_immediately_when_idle() {
        let (dispatcher, _sink) = dispatcher();
        tokio::time::timeout(Duration::from_secs(1), dispatcher.settle())
            .await
            .expect("settle should not block when idle");
    }
}
