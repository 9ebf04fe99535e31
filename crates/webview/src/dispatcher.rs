//! Affinity Dispatcher
//!
//! One dedicated thread owns the host state and is the only thread that ever
//! calls into the engine. Every other thread posts closures to it.
//!
//! Design decisions:
//! 1. Single consumer, unbounded FIFO - a caller's tasks run in issue order
//! 2. Fire-and-forget - results travel back through a continuation or a oneshot
//! 3. Posting after shutdown is a silent no-op
//! 4. Posting from the affine thread runs inline when the state is free,
//!    otherwise right after the task currently holding it

use parking_lot::Mutex;
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::ops::Deref;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

/// Unit of work executed against the affine state
pub type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

enum Envelope<S> {
    Run(Task<S>),
    Stop,
}

thread_local! {
    /// State owned by this thread, if it is an affine thread
    static STATE: RefCell<Option<Box<dyn Any>>> = RefCell::new(None);

    /// Tasks posted on this thread while the state was unavailable
    static DEFERRED: RefCell<VecDeque<Box<dyn Any>>> = RefCell::new(VecDeque::new());
}

/// Cloneable, thread-safe handle for posting work to the affine thread
pub struct AffineHandle<S: 'static> {
    tx: mpsc::UnboundedSender<Envelope<S>>,
    thread_id: ThreadId,
}

impl<S: 'static> Clone for AffineHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            thread_id: self.thread_id,
        }
    }
}

impl<S: 'static> AffineHandle<S> {
    pub fn is_affine_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Run `f` on the affine thread
    pub fn run_affine<F>(&self, f: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let task: Task<S> = Box::new(f);
        if self.is_affine_thread() {
            execute(task);
            return;
        }
        if self.tx.send(Envelope::Run(task)).is_err() {
            tracing::debug!("Affine thread gone, dropping task");
        }
    }

    /// Run `f` on the affine thread and hand its result back through a oneshot
    pub fn call_affine<F, R>(&self, f: F) -> oneshot::Receiver<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.run_affine(move |state| {
            let _ = tx.send(f(state)); // Receiver may have given up
        });
        rx
    }

    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.call_affine(f).await.map_err(|_| Error::DispatcherGone)
    }

    /// Blocking variant of [`call`](Self::call) for threads outside any async runtime.
    ///
    /// Refuses to run on the affine thread itself, which would wait on its own queue.
    pub fn call_blocking<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_affine_thread() {
            return Err(Error::AffineReentry);
        }
        self.call_affine(f)
            .blocking_recv()
            .map_err(|_| Error::DispatcherGone)
    }
}

/// Owner of the affine thread
pub struct AffinityDispatcher<S: 'static> {
    handle: AffineHandle<S>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: 'static> AffinityDispatcher<S> {
    /// Start the affine thread. `init` builds the state on that thread, so
    /// the state never has to cross threads and need not be `Send`.
    pub fn spawn<F>(name: impl Into<String>, init: F) -> Result<Self>
    where
        F: FnOnce(AffineHandle<S>) -> S + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let init_tx = tx.clone();

        let worker = thread::Builder::new().name(name.into()).spawn(move || {
            let handle = AffineHandle {
                tx: init_tx,
                thread_id: thread::current().id(),
            };
            let state = init(handle);
            run_loop(state, rx);
        })?;

        let handle = AffineHandle {
            tx,
            thread_id: worker.thread().id(),
        };

        Ok(Self {
            handle,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn handle(&self) -> AffineHandle<S> {
        self.handle.clone()
    }

    /// Stop the affine thread after the task it is running.
    ///
    /// Tasks still queued are dropped. Joins the thread unless called from it.
    pub fn stop(&self) {
        let _ = self.handle.tx.send(Envelope::Stop);
        if self.handle.is_affine_thread() {
            return;
        }
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("Affine thread panicked");
            }
        }
    }
}

impl<S: 'static> Deref for AffinityDispatcher<S> {
    type Target = AffineHandle<S>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<S: 'static> Drop for AffinityDispatcher<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<S: 'static>(state: S, mut rx: mpsc::UnboundedReceiver<Envelope<S>>) {
    STATE.with(|slot| *slot.borrow_mut() = Some(Box::new(state)));
    drain_deferred::<S>();

    while let Some(envelope) = rx.blocking_recv() {
        match envelope {
            Envelope::Run(task) => execute(task),
            Envelope::Stop => break,
        }
    }
    rx.close();

    DEFERRED.with(|queue| queue.borrow_mut().clear());
    // Dropped here, on the thread that built it
    let state = STATE.with(|slot| slot.borrow_mut().take());
    drop(state);
    tracing::debug!("Affine thread stopped");
}

fn execute<S: 'static>(task: Task<S>) {
    match try_run(task) {
        Some(task) => defer(task),
        None => drain_deferred::<S>(),
    }
}

/// Run `task` against the installed state. Hands the task back when the state
/// is held by a task further up the stack or has not been installed yet.
fn try_run<S: 'static>(task: Task<S>) -> Option<Task<S>> {
    STATE.with(|slot| {
        let Ok(mut guard) = slot.try_borrow_mut() else {
            return Some(task);
        };
        match guard.as_mut().and_then(|state| (**state).downcast_mut::<S>()) {
            Some(state) => {
                task(state);
                None
            }
            None => Some(task),
        }
    })
}

fn defer<S: 'static>(task: Task<S>) {
    DEFERRED.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

fn drain_deferred<S: 'static>() {
    while let Some(task) = DEFERRED.with(|queue| queue.borrow_mut().pop_front()) {
        let Ok(task) = task.downcast::<Task<S>>() else {
            continue;
        };
        if let Some(task) = try_run(*task) {
            DEFERRED.with(|queue| queue.borrow_mut().push_front(Box::new(task)));
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        log: Vec<String>,
        handle: AffineHandle<Recorder>,
    }

    fn spawn_recorder() -> AffinityDispatcher<Recorder> {
        AffinityDispatcher::spawn("recorder-affine", |handle| Recorder {
            log: Vec::new(),
            handle,
        })
        .unwrap()
    }

    #[test]
    fn test_tasks_run_on_dedicated_thread() {
        let dispatcher = spawn_recorder();
        assert!(!dispatcher.is_affine_thread());

        let name = dispatcher
            .call_blocking(|_| thread::current().name().map(str::to_string))
            .unwrap();
        assert_eq!(name.as_deref(), Some("recorder-affine"));
    }

    #[test]
    fn test_fifo_order_from_one_caller() {
        let dispatcher = spawn_recorder();
        for i in 0..100 {
            dispatcher.run_affine(move |recorder| recorder.log.push(i.to_string()));
        }

        let log = dispatcher.call_blocking(|recorder| recorder.log.clone()).unwrap();
        let expected: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        assert_eq!(log, expected);
    }

    #[test]
    fn test_reentrant_post_runs_after_current_task() {
        let dispatcher = spawn_recorder();
        dispatcher.run_affine(|recorder| {
            recorder.log.push("outer-start".into());
            recorder
                .handle
                .run_affine(|recorder| recorder.log.push("nested".into()));
            recorder.log.push("outer-end".into());
        });
        dispatcher.run_affine(|recorder| recorder.log.push("next".into()));

        let log = dispatcher.call_blocking(|recorder| recorder.log.clone()).unwrap();
        assert_eq!(log, vec!["outer-start", "outer-end", "nested", "next"]);
    }

    #[test]
    fn test_posts_during_init_run_once_state_exists() {
        let dispatcher = AffinityDispatcher::spawn("recorder-init", |handle: AffineHandle<Recorder>| {
            handle.run_affine(|recorder| recorder.log.push("from-init".into()));
            Recorder {
                log: Vec::new(),
                handle,
            }
        })
        .unwrap();

        let log = dispatcher.call_blocking(|recorder| recorder.log.clone()).unwrap();
        assert_eq!(log, vec!["from-init"]);
    }

    #[test]
    fn test_blocking_call_from_affine_thread_is_refused() {
        let dispatcher = spawn_recorder();
        let refused = dispatcher
            .call_blocking(|recorder| {
                matches!(
                    recorder.handle.call_blocking(|_| ()),
                    Err(Error::AffineReentry)
                )
            })
            .unwrap();
        assert!(refused);
    }

    #[test]
    fn test_post_after_stop_is_noop() {
        let dispatcher = spawn_recorder();
        let handle = dispatcher.handle();
        dispatcher.stop();

        handle.run_affine(|recorder| recorder.log.push("late".into()));
        assert!(matches!(
            handle.call_blocking(|recorder| recorder.log.len()),
            Err(Error::DispatcherGone)
        ));
        assert!(matches!(
            tokio_test::block_on(handle.call(|recorder| recorder.log.len())),
            Err(Error::DispatcherGone)
        ));
    }

    #[tokio::test]
    async fn test_async_call() {
        let dispatcher = spawn_recorder();
        dispatcher.run_affine(|recorder| recorder.log.push("a".into()));
        let len = dispatcher.call(|recorder| recorder.log.len()).await.unwrap();
        assert_eq!(len, 1);
    }
}
