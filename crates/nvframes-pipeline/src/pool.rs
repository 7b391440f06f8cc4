//! Fixed-size worker pools with per-worker bounded queues.
//!
//! Each worker owns one OS thread named `<stage>-<index>`, one FIFO queue and
//! one [`StageHandler`] built inside that thread. Tasks are dispatched round
//! robin regardless of load. A worker accepts at most `queue_depth` tasks
//! (queued or executing); [`WorkerPool::submit`] blocks while the target
//! worker is full, which is the backpressure the producer relies on.
//!
//! A handler error or panic halts the pool: the faulting worker tears down
//! and exits, and every later or blocked `submit` and every `join` fails with
//! [`Error::StageHalted`].

use crate::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Sizing of a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers (N).
    pub workers: usize,
    /// Tasks a single worker may hold, queued or executing (Q).
    pub queue_depth: usize,
}

impl PoolConfig {
    pub fn new(workers: usize, queue_depth: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::invalid_config("a pool needs at least one worker"));
        }
        if queue_depth == 0 {
            return Err(Error::invalid_config("queue depth must be at least 1"));
        }
        Ok(Self {
            workers,
            queue_depth,
        })
    }

    /// Maximum number of tasks the pool holds at once (Q x N).
    pub fn in_flight_limit(&self) -> usize {
        self.workers * self.queue_depth
    }
}

/// Stage-specific behaviour of one worker.
///
/// The handler is created on the worker's own thread, so it does not need to
/// be `Send`. `setup` runs before the worker accepts tasks and `teardown` runs
/// exactly once when the worker exits, whether it was stopped or halted.
pub trait StageHandler {
    type Task: Send + 'static;

    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn handle(&mut self, task: Self::Task) -> Result<()>;

    fn teardown(&mut self) {}
}

enum Message<T> {
    Task(T),
    Stop,
}

struct State {
    in_flight: Vec<usize>,
    outstanding: usize,
    running: usize,
    fault: Option<String>,
    stopped: bool,
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
}

impl Shared {
    fn new(workers: usize) -> Self {
        Self {
            state: Mutex::new(State {
                in_flight: vec![0; workers],
                outstanding: 0,
                running: workers,
                fault: None,
                stopped: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn complete(&self, index: usize, fault: Option<String>) {
        let mut state = self.state.lock();
        state.in_flight[index] = state.in_flight[index].saturating_sub(1);
        state.outstanding = state.outstanding.saturating_sub(1);
        if let Some(reason) = fault {
            state.fault.get_or_insert(reason);
        }
        self.changed.notify_all();
    }

    fn exited(&self) {
        let mut state = self.state.lock();
        state.running = state.running.saturating_sub(1);
        self.changed.notify_all();
    }
}

/// A started pool of workers processing tasks of type `T`.
pub struct WorkerPool<T: Send + 'static> {
    name: String,
    config: PoolConfig,
    senders: Vec<Sender<Message<T>>>,
    cursor: AtomicUsize,
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn the workers and wait for every handler to finish `setup`.
    ///
    /// `factory(index)` is called on worker `index`'s thread. If any worker
    /// fails to start, the already-started workers are stopped and the first
    /// failure is returned.
    pub fn start<H, F>(name: impl Into<String>, config: PoolConfig, factory: F) -> Result<Self>
    where
        H: StageHandler<Task = T>,
        F: Fn(usize) -> Result<H> + Send + Sync + 'static,
    {
        let config = PoolConfig::new(config.workers, config.queue_depth)?;
        let name = name.into();
        let factory = Arc::new(factory);
        let shared = Arc::new(Shared::new(config.workers));

        let mut pool = Self {
            name: name.clone(),
            config,
            senders: Vec::with_capacity(config.workers),
            cursor: AtomicUsize::new(0),
            shared: shared.clone(),
            handles: Mutex::new(Vec::with_capacity(config.workers)),
        };

        let mut ready = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let (tx, rx) = crossbeam_channel::unbounded();
            let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
            let worker = Worker {
                stage: name.clone(),
                index,
                rx,
                shared: shared.clone(),
            };
            let factory = factory.clone();
            let thread_name = format!("{name}-{index}");

            let spawned = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker.run(factory.as_ref(), ready_tx));
            match spawned {
                Ok(handle) => {
                    pool.senders.push(tx);
                    pool.handles.lock().push(handle);
                    ready.push(ready_rx);
                }
                Err(source) => {
                    // Workers that were never spawned will never report exit.
                    shared.state.lock().running = index;
                    let _ = pool.stop();
                    return Err(Error::Spawn {
                        name: thread_name,
                        source,
                    });
                }
            }
        }

        for (index, ready_rx) in ready.into_iter().enumerate() {
            let outcome = ready_rx
                .recv()
                .unwrap_or_else(|_| Err("worker exited during setup".to_string()));
            if let Err(reason) = outcome {
                let _ = pool.stop();
                return Err(Error::Setup {
                    stage: name,
                    index,
                    reason,
                });
            }
        }

        debug!(
            "Started {} pool: {} workers, queue depth {}",
            name, config.workers, config.queue_depth
        );
        Ok(pool)
    }

    /// Stage name used for thread names and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Hand `task` to the next worker in round robin order.
    ///
    /// Blocks while that worker already holds `queue_depth` tasks.
    pub fn submit(&self, task: T) -> Result<()> {
        let workers = self.senders.len();
        let index = self
            .cursor
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                Some((c + 1) % workers)
            })
            .unwrap_or_else(|c| c);

        {
            let mut state = self.shared.state.lock();
            loop {
                if let Some(reason) = &state.fault {
                    return Err(Error::halted(&self.name, reason.clone()));
                }
                if state.stopped {
                    return Err(Error::halted(&self.name, "pool stopped"));
                }
                if state.in_flight[index] < self.config.queue_depth {
                    break;
                }
                self.shared.changed.wait(&mut state);
            }
            state.in_flight[index] += 1;
            state.outstanding += 1;
        }

        if self.senders[index].send(Message::Task(task)).is_err() {
            let reason = format!("worker {index} is gone");
            self.shared.complete(index, Some(reason.clone()));
            return Err(Error::halted(&self.name, reason));
        }
        Ok(())
    }

    /// Block until every submitted task has been handled.
    pub fn join(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(reason) = &state.fault {
                return Err(Error::halted(&self.name, reason.clone()));
            }
            if state.outstanding == 0 {
                return Ok(());
            }
            if state.running == 0 {
                return Err(Error::halted(&self.name, "all workers exited"));
            }
            self.shared.changed.wait(&mut state);
        }
    }

    /// Drain the queues, tear the handlers down and join the threads.
    ///
    /// Queued tasks are handled before a worker exits. Calling `stop` again is
    /// a no-op that reports the same fault, if any.
    pub fn stop(&self) -> Result<()> {
        let handles = std::mem::take(&mut *self.handles.lock());
        if !handles.is_empty() {
            {
                let mut state = self.shared.state.lock();
                state.stopped = true;
                self.shared.changed.notify_all();
            }
            for sender in &self.senders {
                let _ = sender.send(Message::Stop);
            }
            for handle in handles {
                if handle.join().is_err() {
                    warn!("{} worker thread panicked outside its handler", self.name);
                }
            }
            debug!("Stopped {} pool", self.name);
        }

        match &self.shared.state.lock().fault {
            Some(reason) => Err(Error::halted(&self.name, reason.clone())),
            None => Ok(()),
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct Worker<T> {
    stage: String,
    index: usize,
    rx: Receiver<Message<T>>,
    shared: Arc<Shared>,
}

impl<T: Send + 'static> Worker<T> {
    fn run<H, F>(self, factory: &F, ready: Sender<std::result::Result<(), String>>)
    where
        H: StageHandler<Task = T>,
        F: Fn(usize) -> Result<H>,
    {
        let built = catch_unwind(AssertUnwindSafe(|| {
            let mut handler = factory(self.index)?;
            handler.setup()?;
            Ok::<_, Error>(handler)
        }));
        let mut handler = match built {
            Ok(Ok(handler)) => {
                let _ = ready.send(Ok(()));
                handler
            }
            Ok(Err(e)) => {
                let _ = ready.send(Err(e.to_string()));
                self.shared.exited();
                return;
            }
            Err(payload) => {
                let _ = ready.send(Err(format!("panicked: {}", panic_message(&payload))));
                self.shared.exited();
                return;
            }
        };
        drop(ready);

        while let Ok(message) = self.rx.recv() {
            let task = match message {
                Message::Task(task) => task,
                Message::Stop => break,
            };

            // The task is consumed by `handle`, so anything it references is
            // released before the slot is given back.
            let fault = match catch_unwind(AssertUnwindSafe(|| handler.handle(task))) {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("worker {} failed: {}", self.index, e)),
                Err(payload) => Some(format!(
                    "worker {} panicked: {}",
                    self.index,
                    panic_message(&payload)
                )),
            };
            let halted = fault.is_some();
            if let Some(reason) = &fault {
                error!("{} {}", self.stage, reason);
            }
            self.shared.complete(self.index, fault);
            if halted {
                break;
            }
        }

        if catch_unwind(AssertUnwindSafe(|| handler.teardown())).is_err() {
            warn!("{}-{} panicked during teardown", self.stage, self.index);
        }
        self.shared.exited();
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl StageHandler for Noop {
        type Task = u32;

        fn handle(&mut self, _task: u32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_pool_config_validation() {
        assert!(PoolConfig::new(0, 4).is_err());
        assert!(PoolConfig::new(4, 0).is_err());
        assert_eq!(PoolConfig::new(3, 4).unwrap().in_flight_limit(), 12);
    }

    #[test]
    fn test_join_on_idle_pool() {
        let pool = WorkerPool::start("idle", PoolConfig::new(2, 2).unwrap(), |_| Ok(Noop)).unwrap();
        pool.join().unwrap();
        pool.stop().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent_and_rejects_submits() {
        let pool = WorkerPool::start("stop", PoolConfig::new(2, 1).unwrap(), |_| Ok(Noop)).unwrap();
        pool.submit(1).unwrap();
        pool.stop().unwrap();
        pool.stop().unwrap();
        assert!(matches!(pool.submit(2), Err(Error::StageHalted { .. })));
    }

    #[test]
    fn test_setup_failure_is_reported() {
        let result = WorkerPool::<u32>::start("broken", PoolConfig::new(3, 1).unwrap(), |index| {
            if index == 1 {
                Err(Error::invalid_config("no compressor"))
            } else {
                Ok(Noop)
            }
        });
        match result {
            Err(Error::Setup { stage, index, reason }) => {
                assert_eq!(stage, "broken");
                assert_eq!(index, 1);
                assert!(reason.contains("no compressor"));
            }
            other => panic!("expected setup error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&payload), "unknown panic");
    }
}
