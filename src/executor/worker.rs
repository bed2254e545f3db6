// background worker: one thread draining a FIFO of tasks
use super::panic_handler::{PanicHandler, TaskStage};
use super::queue::TaskQueue;
use super::task::Task;
use crate::config::WorkerConfig;
use crate::error::{Error, Result, SubmitError};
use crate::sync::{GuardedCondvar, GuardedLock, GuardedLockGuard, SignalGate};
use crate::timeout::Timeout;
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// Lifecycle of a [`BackgroundWorker`].
///
/// `Idle --start--> Running --shutdown--> ShuttingDown --drained--> Stopped`.
/// Nothing leaves `Stopped`.
///
/// The worker thread publishes `Stopped` as its final step, so it may still
/// be returning from its entry point when the state is observed. A
/// successful [`BackgroundWorker::shutdown`] has also joined the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Created, not started. Submissions are buffered.
    Idle = 0,
    Running = 1,
    /// No new work accepted; the thread is draining what is queued.
    ShuttingDown = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::ShuttingDown,
            _ => WorkerState::Stopped,
        }
    }

    /// Whether submissions are still accepted.
    pub fn accepts_work(&self) -> bool {
        matches!(self, WorkerState::Idle | WorkerState::Running)
    }
}

/// Counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub submitted: u64,
    pub executed: u64,
    pub rejected: u64,
    pub panicked: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    executed: AtomicU64,
    rejected: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    queue: TaskQueue,
    thread: Option<JoinHandle<()>>,
    thread_id: Option<ThreadId>,
}

struct Shared {
    lock: GuardedLock<RefCell<Inner>>,
    work_available: GuardedCondvar,
    stopped: GuardedCondvar,
    // Written only while `lock` is held; read from anywhere.
    state: AtomicU8,
    counters: Counters,
    panic_handler: PanicHandler,
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn on_worker_thread(&self) -> bool {
        let guard = self.lock.lock();
        let current = thread::current().id();
        let on_worker = guard
            .try_borrow()
            .map(|inner| inner.thread_id == Some(current))
            .unwrap_or(false);
        on_worker
    }

    fn run_task(&self, task: Task) {
        let (id, mut runnable) = task.into_parts();

        let executed = self
            .panic_handler
            .contain(id, TaskStage::Execute, || runnable.execute())
            .is_ok();
        let cleaned = self
            .panic_handler
            .contain(id, TaskStage::Cleanup, move || runnable.cleanup())
            .is_ok();

        self.counters.executed.fetch_add(1, Ordering::Relaxed);
        if !(executed && cleaned) {
            self.counters.panicked.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(task_id = id.as_u64(), "task finished");
    }

    // main loop, runs on the worker thread
    fn run(&self) {
        tracing::debug!(
            worker = thread::current().name().unwrap_or("unnamed"),
            "background worker started"
        );

        loop {
            let next = {
                let mut guard = self.lock.lock();
                loop {
                    let mut inner = guard.borrow_mut();
                    if let Some(task) = inner.queue.pop_front() {
                        break Some(task);
                    }
                    if self.state() == WorkerState::ShuttingDown {
                        drop(inner);
                        tracing::debug!(
                            executed = self.counters.executed.load(Ordering::Relaxed),
                            "background worker stopped"
                        );
                        // Last thing the thread does; it only returns after this.
                        self.set_state(WorkerState::Stopped);
                        self.stopped.notify_all();
                        break None;
                    }
                    drop(inner);
                    self.work_available.wait(&mut guard);
                }
            };

            match next {
                Some(task) => self.run_task(task),
                None => break,
            }
        }
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("state", &self.state())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

/// Cloneable handle for feeding a worker.
///
/// Tasks can capture a submitter to queue follow-up work from inside their
/// execution function.
#[derive(Clone, Debug)]
pub struct Submitter {
    shared: Arc<Shared>,
}

impl Submitter {
    /// Queue `task`, or hand it back with the reason it was refused.
    ///
    /// Never waits for the task to run. Safe to call from a signal handler
    /// bracketed by the worker's gate, on a best-effort basis.
    pub fn try_submit(&self, task: Task) -> std::result::Result<(), SubmitError> {
        let shared = &*self.shared;
        let guard = shared.lock.lock();

        let mut inner = match guard.try_borrow_mut() {
            Ok(inner) => inner,
            Err(_) => return Err(Self::reject(&guard, shared, task, Error::Busy)),
        };

        if !shared.state().accepts_work() {
            drop(inner);
            return Err(Self::reject(&guard, shared, task, Error::Closed));
        }

        if let Err(task) = inner.queue.push_back(task) {
            drop(inner);
            return Err(Self::reject(&guard, shared, task, Error::AllocationFailure));
        }
        drop(inner);

        shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
        shared.work_available.notify_one();
        Ok(())
    }

    /// Queue an execution function, a cleanup function and their data.
    ///
    /// If the worker refuses, `cleanup(data)` runs right here before the
    /// error is returned, so the data is never leaked.
    pub fn submit<T, E, C>(&self, execute: E, cleanup: C, data: T) -> Result<()>
    where
        T: Send + 'static,
        E: FnOnce(&mut T) + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        self.submit_task(Task::with_cleanup(data, execute, cleanup))
    }

    /// Queue a closure with nothing to clean up.
    pub fn spawn<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_task(Task::new(f))
    }

    /// Like [`try_submit`](Self::try_submit) but discards a refused task.
    pub fn submit_task(&self, task: Task) -> Result<()> {
        self.try_submit(task).map_err(|err| {
            let (task, reason) = err.into_parts();
            task.discard();
            reason
        })
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn is_closed(&self) -> bool {
        !self.state().accepts_work()
    }

    fn reject(
        guard: &GuardedLockGuard<'_, RefCell<Inner>>,
        shared: &Shared,
        task: Task,
        reason: Error,
    ) -> SubmitError {
        shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
        // Nothing that may allocate or lock inside a signal handler.
        if guard.is_acquired() {
            tracing::debug!(task_id = task.id().as_u64(), %reason, "task rejected");
        }
        SubmitError::new(task, reason)
    }
}

/// Single-thread background executor.
///
/// Tasks run one at a time, in submission order, on a dedicated thread.
/// Producers never wait for execution. See [`WorkerState`] for the
/// lifecycle.
///
/// ```no_run
/// use bgworker::{BackgroundWorker, SignalGate, Timeout};
/// use std::sync::Arc;
///
/// let worker = BackgroundWorker::new(Arc::new(SignalGate::new()));
/// worker.start().unwrap();
/// worker.spawn(|| println!("sending event")).unwrap();
/// worker.shutdown(Timeout::from_millis(2000)).unwrap();
/// ```
pub struct BackgroundWorker {
    submitter: Submitter,
    config: WorkerConfig,
}

impl BackgroundWorker {
    /// A worker with the default configuration.
    pub fn new(gate: Arc<SignalGate>) -> Self {
        Self::build(gate, WorkerConfig::default())
    }

    pub fn with_config(gate: Arc<SignalGate>, config: WorkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(gate, config))
    }

    fn build(gate: Arc<SignalGate>, config: WorkerConfig) -> Self {
        let shared = Arc::new(Shared {
            lock: GuardedLock::new(gate, RefCell::new(Inner::default())),
            work_available: GuardedCondvar::new(),
            stopped: GuardedCondvar::new(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            counters: Counters::default(),
            panic_handler: PanicHandler::new(config.panic_strategy),
        });

        Self {
            submitter: Submitter { shared },
            config,
        }
    }

    /// Spawn the worker thread. Only valid once, from `Idle`.
    ///
    /// If the thread cannot be spawned the worker stays `Idle`.
    pub fn start(&self) -> Result<()> {
        let shared = &self.submitter.shared;
        let guard = shared.lock.lock();
        let mut inner = guard.try_borrow_mut().map_err(|_| Error::Busy)?;

        let state = shared.state();
        if state != WorkerState::Idle {
            tracing::warn!(?state, "start() called on a worker that is not idle");
            return Err(Error::AlreadyStarted);
        }

        let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        // The new thread blocks on the lock until this call returns.
        let worker = Arc::clone(shared);
        let handle = builder.spawn(move || worker.run())?;

        inner.thread_id = Some(handle.thread().id());
        inner.thread = Some(handle);
        shared.set_state(WorkerState::Running);
        Ok(())
    }

    /// See [`Submitter::try_submit`].
    pub fn try_submit(&self, task: Task) -> std::result::Result<(), SubmitError> {
        self.submitter.try_submit(task)
    }

    /// See [`Submitter::submit`].
    pub fn submit<T, E, C>(&self, execute: E, cleanup: C, data: T) -> Result<()>
    where
        T: Send + 'static,
        E: FnOnce(&mut T) + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        self.submitter.submit(execute, cleanup, data)
    }

    /// See [`Submitter::spawn`].
    pub fn spawn<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submitter.spawn(f)
    }

    /// A cloneable handle for submitting from other threads or tasks.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Stop accepting work, let the thread drain the queue, and wait up to
    /// `timeout` for it to exit.
    ///
    /// `Err(TimedOut)` leaves the thread running; calling again waits again.
    /// Once stopped, further calls return `Ok(())` at once. A worker that
    /// never started stops immediately and its buffered tasks are cleaned up
    /// without executing.
    pub fn shutdown<T: Into<Timeout>>(&self, timeout: T) -> Result<()> {
        let timeout = timeout.into();
        let deadline = timeout.deadline();
        let shared = &*self.submitter.shared;

        let mut guard = shared.lock.lock();
        let orphaned = {
            let mut inner = guard.try_borrow_mut().map_err(|_| Error::Busy)?;
            match shared.state() {
                WorkerState::Idle => {
                    shared.set_state(WorkerState::Stopped);
                    inner.queue.take_all()
                }
                WorkerState::Running => {
                    shared.set_state(WorkerState::ShuttingDown);
                    Default::default()
                }
                WorkerState::ShuttingDown | WorkerState::Stopped => Default::default(),
            }
        };
        shared.work_available.notify_all();

        if !orphaned.is_empty() {
            drop(guard);
            tracing::debug!(count = orphaned.len(), "discarding tasks of a worker that never started");
            orphaned.into_iter().for_each(Task::discard);
            return Ok(());
        }

        if !guard.is_acquired() {
            // Cannot wait inside a signal handler.
            return match shared.state() {
                WorkerState::Stopped => Ok(()),
                _ => Err(Error::TimedOut),
            };
        }

        let current = thread::current().id();
        if guard.borrow().thread_id == Some(current) {
            tracing::debug!("shutdown requested from the worker thread, not waiting");
            return Err(Error::TimedOut);
        }

        while shared.state() != WorkerState::Stopped {
            let timed_out = match deadline {
                Some(deadline) => shared.stopped.wait_until(&mut guard, deadline),
                None => {
                    shared.stopped.wait(&mut guard);
                    false
                }
            };
            if timed_out && shared.state() != WorkerState::Stopped {
                drop(guard);
                tracing::warn!(?timeout, "background worker did not stop in time");
                return Err(Error::TimedOut);
            }
        }

        let handle = guard.borrow_mut().thread.take();
        drop(guard);

        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("background worker thread panicked");
            }
        }
        Ok(())
    }

    /// Wait until every task submitted before this call has finished.
    pub fn flush<T: Into<Timeout>>(&self, timeout: T) -> Result<()> {
        let timeout = timeout.into();
        if self.submitter.shared.on_worker_thread() {
            return Err(Error::TimedOut);
        }

        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        self.submitter.spawn(move || {
            let _ = tx.send(());
        })?;

        // A discarded marker drops its sender.
        match timeout.duration() {
            None => rx.recv().map_err(|_| Error::Closed),
            Some(d) => rx.recv_timeout(d).map_err(|e| match e {
                crossbeam_channel::RecvTimeoutError::Timeout => Error::TimedOut,
                crossbeam_channel::RecvTimeoutError::Disconnected => Error::Closed,
            }),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.submitter.state()
    }

    /// Number of queued tasks not yet picked up. Diagnostics only.
    pub fn pending(&self) -> usize {
        let guard = self.submitter.shared.lock.lock();
        let pending = guard.try_borrow().map(|inner| inner.queue.len()).unwrap_or(0);
        pending
    }

    pub fn stats(&self) -> WorkerStats {
        self.submitter.shared.counters.snapshot()
    }

    /// Panics caught in task code so far.
    pub fn panic_count(&self) -> usize {
        self.submitter.shared.panic_handler.panic_count()
    }

    pub fn gate(&self) -> &Arc<SignalGate> {
        self.submitter.shared.lock.gate()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }
}

impl fmt::Debug for BackgroundWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundWorker")
            .field("state", &self.state())
            .field("thread_name", &self.config.thread_name)
            .finish()
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        match self.shutdown(self.config.drop_timeout) {
            Ok(()) => {}
            Err(Error::TimedOut) => {
                // Detach; the thread still drains what is queued.
                let guard = self.submitter.shared.lock.lock();
                let handle = guard
                    .try_borrow_mut()
                    .ok()
                    .and_then(|mut inner| inner.thread.take());
                drop(guard);
                drop(handle);
                tracing::debug!("background worker detached");
            }
            Err(err) => tracing::debug!(%err, "background worker shutdown on drop failed"),
        }
    }
}
