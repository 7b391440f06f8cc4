//! Behaviour of the bounded worker pool under load and failure.

use crossbeam_channel::{Receiver, Sender};
use nvframes_pipeline::{Error, PoolConfig, Result, StageHandler, WorkerPool};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Handler that waits for one token from the gate per task.
struct Gated {
    gate: Receiver<()>,
    handled: Arc<AtomicUsize>,
}

impl StageHandler for Gated {
    type Task = usize;

    fn handle(&mut self, _task: usize) -> Result<()> {
        let _ = self.gate.recv();
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn gated_pool(
    workers: usize,
    depth: usize,
) -> (Arc<WorkerPool<usize>>, Sender<()>, Arc<AtomicUsize>) {
    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    let pool = WorkerPool::start(
        "gated",
        PoolConfig::new(workers, depth).unwrap(),
        move |_| {
            Ok(Gated {
                gate: gate_rx.clone(),
                handled: counter.clone(),
            })
        },
    )
    .unwrap();
    (Arc::new(pool), gate_tx, handled)
}

#[test]
fn test_submit_blocks_after_n_times_q_tasks() {
    let (workers, depth) = (2, 3);
    let (pool, gate, handled) = gated_pool(workers, depth);

    for task in 0..workers * depth {
        pool.submit(task).unwrap();
    }

    let returned = Arc::new(AtomicBool::new(false));
    let submitter = {
        let pool = pool.clone();
        let returned = returned.clone();
        thread::spawn(move || {
            pool.submit(workers * depth).unwrap();
            returned.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(200));
    assert!(!returned.load(Ordering::SeqCst), "submit N*Q+1 should block");
    assert_eq!(handled.load(Ordering::SeqCst), 0);

    // Release tasks one at a time until the target worker has room.
    while !returned.load(Ordering::SeqCst) {
        gate.send(()).unwrap();
        thread::sleep(Duration::from_millis(20));
    }
    submitter.join().unwrap();
    assert!(returned.load(Ordering::SeqCst));
    assert!(handled.load(Ordering::SeqCst) >= 1);

    for _ in 0..workers * depth + 1 {
        gate.send(()).unwrap();
    }
    pool.join().unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), workers * depth + 1);
    pool.stop().unwrap();
}

struct Recording {
    index: usize,
    seen: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl StageHandler for Recording {
    type Task = usize;

    fn handle(&mut self, task: usize) -> Result<()> {
        // Uneven work so completion order differs from submission order.
        thread::sleep(Duration::from_millis(((task * 7) % 5) as u64));
        self.seen.lock().push((task, self.index));
        Ok(())
    }
}

#[test]
fn test_round_robin_ignores_completion_speed() {
    let workers = 3;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let pool = WorkerPool::start("rr", PoolConfig::new(workers, 2).unwrap(), move |index| {
        Ok(Recording {
            index,
            seen: recorded.clone(),
        })
    })
    .unwrap();

    for task in 0..30 {
        pool.submit(task).unwrap();
    }
    pool.join().unwrap();
    pool.stop().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 30);
    for &(task, worker) in seen.iter() {
        assert_eq!(worker, task % workers, "task {task} ran on worker {worker}");
    }
}

#[test]
fn test_each_worker_handles_tasks_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let pool = WorkerPool::start("fifo", PoolConfig::new(2, 4).unwrap(), move |index| {
        Ok(Recording {
            index,
            seen: recorded.clone(),
        })
    })
    .unwrap();
    for task in 0..20 {
        pool.submit(task).unwrap();
    }
    pool.join().unwrap();
    drop(pool);

    let seen = seen.lock();
    for worker in 0..2 {
        let tasks: Vec<usize> = seen
            .iter()
            .filter(|(_, w)| *w == worker)
            .map(|(t, _)| *t)
            .collect();
        let mut sorted = tasks.clone();
        sorted.sort_unstable();
        assert_eq!(tasks, sorted);
    }
}

struct Lifecycle {
    fail_on: Option<usize>,
    panic_on: Option<usize>,
    teardowns: Arc<AtomicUsize>,
}

impl StageHandler for Lifecycle {
    type Task = usize;

    fn handle(&mut self, task: usize) -> Result<()> {
        if self.panic_on == Some(task) {
            panic!("bad frame {task}");
        }
        if self.fail_on == Some(task) {
            return Err(Error::invalid_config(format!("task {task} rejected")));
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn lifecycle_pool(
    fail_on: Option<usize>,
    panic_on: Option<usize>,
) -> (WorkerPool<usize>, Arc<AtomicUsize>) {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let counter = teardowns.clone();
    let pool = WorkerPool::start("stage", PoolConfig::new(2, 2).unwrap(), move |_| {
        Ok(Lifecycle {
            fail_on,
            panic_on,
            teardowns: counter.clone(),
        })
    })
    .unwrap();
    (pool, teardowns)
}

#[test]
fn test_handler_error_halts_pool() {
    let (pool, teardowns) = lifecycle_pool(Some(3), None);
    for task in 0..4 {
        pool.submit(task).unwrap();
    }

    match pool.join() {
        Err(Error::StageHalted { stage, reason }) => {
            assert_eq!(stage, "stage");
            assert!(reason.contains("task 3 rejected"), "{reason}");
        }
        other => panic!("expected halt, got {other:?}"),
    }
    assert!(matches!(pool.submit(9), Err(Error::StageHalted { .. })));
    assert!(pool.stop().is_err());
    assert_eq!(teardowns.load(Ordering::SeqCst), 2);
}

#[test]
fn test_handler_panic_halts_pool() {
    let (pool, teardowns) = lifecycle_pool(None, Some(0));
    pool.submit(0).unwrap();

    match pool.join() {
        Err(Error::StageHalted { reason, .. }) => assert!(reason.contains("bad frame 0")),
        other => panic!("expected halt, got {other:?}"),
    }
    drop(pool);
    assert_eq!(teardowns.load(Ordering::SeqCst), 2);
}

#[test]
fn test_blocked_submit_wakes_on_halt() {
    struct FailAfterGate {
        gate: Receiver<()>,
    }

    impl StageHandler for FailAfterGate {
        type Task = usize;

        fn handle(&mut self, _task: usize) -> Result<()> {
            let _ = self.gate.recv();
            Err(Error::invalid_config("compressor lost"))
        }
    }

    let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
    let pool = Arc::new(
        WorkerPool::start("halting", PoolConfig::new(1, 1).unwrap(), move |_| {
            Ok(FailAfterGate {
                gate: gate_rx.clone(),
            })
        })
        .unwrap(),
    );
    pool.submit(0).unwrap();

    let blocked = {
        let pool = pool.clone();
        thread::spawn(move || pool.submit(1))
    };
    thread::sleep(Duration::from_millis(100));
    gate_tx.send(()).unwrap();

    assert!(matches!(
        blocked.join().unwrap(),
        Err(Error::StageHalted { .. })
    ));
}

#[test]
fn test_stop_drains_queued_tasks() {
    let (pool, gate, handled) = gated_pool(2, 4);
    for task in 0..8 {
        pool.submit(task).unwrap();
    }
    for _ in 0..8 {
        gate.send(()).unwrap();
    }
    pool.stop().unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), 8);
}

#[test]
fn test_worker_threads_are_named() {
    struct Named {
        names: Arc<Mutex<Vec<String>>>,
    }

    impl StageHandler for Named {
        type Task = ();

        fn setup(&mut self) -> Result<()> {
            let name = thread::current().name().unwrap_or_default().to_string();
            self.names.lock().push(name);
            Ok(())
        }

        fn handle(&mut self, _task: ()) -> Result<()> {
            Ok(())
        }
    }

    let names = Arc::new(Mutex::new(Vec::new()));
    let recorded = names.clone();
    let pool = WorkerPool::start("encode", PoolConfig::new(3, 1).unwrap(), move |_| {
        Ok(Named {
            names: recorded.clone(),
        })
    })
    .unwrap();
    pool.stop().unwrap();

    let mut names = names.lock().clone();
    names.sort();
    assert_eq!(names, vec!["encode-0", "encode-1", "encode-2"]);
}
