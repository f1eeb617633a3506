use runloop::{Lane, RunLoop, TaskInfo};

use crossbeam::channel;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Occupies the consumer thread until the returned sender is dropped.
fn block_loop(rl: &RunLoop) -> channel::Sender<()> {
    let (release_tx, release_rx) = channel::bounded::<()>(0);
    let (inside_tx, inside_rx) = channel::bounded(0);

    rl.spawn("gate", move || {
        let _ = inside_tx.send(());
        let _ = release_rx.recv();
    });
    inside_rx.recv().unwrap();

    release_tx
}

#[test]
fn test_sync_runs_before_returning() {
    let rl = RunLoop::new();
    let n = Arc::new(Mutex::new(0));

    let counter = n.clone();
    rl.sync("increment", move || {
        *counter.lock().unwrap() += 1;
    });

    assert_eq!(*n.lock().unwrap(), 1, "sync must return after the op ran");
    rl.wait();
    assert_eq!(rl.pending(), 0);
}

#[test]
fn test_sync_returns_value() {
    let rl = RunLoop::new();

    let value = rl.sync("compute", || 6 * 7);

    assert_eq!(value, 42);
}

#[test]
fn test_async_does_not_block() {
    let rl = RunLoop::new();
    let n = Arc::new(Mutex::new(0));
    let (wait_tx, wait_rx) = channel::bounded::<()>(0);
    let (done_tx, done_rx) = channel::bounded(1);

    let counter = n.clone();
    rl.spawn("blocked", move || {
        let _ = wait_rx.recv();
        *counter.lock().unwrap() += 1;
        let _ = done_tx.send(());
    });

    assert_eq!(*n.lock().unwrap(), 0, "async must return before the op ran");
    drop(wait_tx);
    done_rx.recv().unwrap();

    assert_eq!(*n.lock().unwrap(), 1);
}

#[test]
fn test_sync_e_returns_error() {
    let rl = RunLoop::new();
    let n = Arc::new(Mutex::new(0));

    let counter = n.clone();
    let result: Result<(), String> = rl.sync_e("fallible", move || {
        *counter.lock().unwrap() += 1;
        Err("Yup".to_string())
    });

    assert_eq!(*n.lock().unwrap(), 1);
    assert_eq!(result, Err("Yup".to_string()));
}

#[test]
fn test_sync_e_returns_ok() {
    let rl = RunLoop::new();

    let result: Result<u32, String> = rl.sync_e("fallible", || Ok(7));

    assert_eq!(result, Ok(7));
}

#[test]
fn test_fifo_within_lane() {
    let rl = RunLoop::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let release = block_loop(&rl);
    for i in 0..50 {
        let order = order.clone();
        rl.spawn(TaskInfo::new("push").with("i", i.to_string()), move || {
            order.lock().unwrap().push(i);
        });
    }
    assert_eq!(rl.queued(), 50);
    drop(release);
    rl.wait();

    assert_eq!(*order.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn test_queued_tasks_run_one_at_a_time() {
    let rl = RunLoop::new();
    let n = Arc::new(Mutex::new(0));
    let (wait_tx, wait_rx) = channel::unbounded::<()>();
    let (done_tx, done_rx) = channel::unbounded();

    for _ in 0..50 {
        let counter = n.clone();
        let wait_rx = wait_rx.clone();
        let done_tx = done_tx.clone();
        rl.spawn("step", move || {
            wait_rx.recv().unwrap();
            *counter.lock().unwrap() += 1;
            done_tx.send(()).unwrap();
        });
    }

    assert_eq!(*n.lock().unwrap(), 0);
    for i in 0..50 {
        wait_tx.send(()).unwrap();
        done_rx.recv().unwrap();
        assert_eq!(*n.lock().unwrap(), i + 1, "exactly one task per release");
    }
    rl.wait();
}

#[test]
fn test_priority_runs_before_waiting_normal_tasks() {
    let rl = RunLoop::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let priority = rl.priority();

    let release = block_loop(&rl);
    for (handle, label) in [(&rl, "n1"), (&priority, "p1"), (&rl, "n2"), (&priority, "p2")] {
        let order = order.clone();
        handle.spawn(label, move || order.lock().unwrap().push(label));
    }
    drop(release);
    rl.wait();

    assert_eq!(*order.lock().unwrap(), vec!["p1", "p2", "n1", "n2"]);
}

#[test]
fn test_priority_arriving_mid_task_runs_next() {
    let rl = RunLoop::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let (release_tx, release_rx) = channel::bounded::<()>(0);
    let (inside_tx, inside_rx) = channel::bounded(0);
    let o1 = order.clone();
    rl.spawn("n1", move || {
        let _ = inside_tx.send(());
        let _ = release_rx.recv();
        o1.lock().unwrap().push("n1");
    });
    let o2 = order.clone();
    rl.spawn("n2", move || o2.lock().unwrap().push("n2"));

    inside_rx.recv().unwrap();
    let o3 = order.clone();
    rl.priority().spawn("p1", move || o3.lock().unwrap().push("p1"));
    drop(release_tx);
    rl.wait();

    assert_eq!(*order.lock().unwrap(), vec!["n1", "p1", "n2"]);
}

#[test]
fn test_priority_sync() {
    let rl = RunLoop::new();
    let release = block_loop(&rl);

    let n = Arc::new(AtomicUsize::new(0));
    let counter = n.clone();
    rl.spawn("normal", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let observed = Arc::new(AtomicUsize::new(usize::MAX));
    let reader = n.clone();
    let slot = observed.clone();
    let priority = rl.priority();
    let waiter = thread::spawn(move || {
        priority.sync("read", move || {
            slot.store(reader.load(Ordering::SeqCst), Ordering::SeqCst);
        })
    });

    while rl.queued() < 2 {
        thread::sleep(Duration::from_millis(1));
    }
    drop(release);
    waiter.join().unwrap();
    rl.wait();

    assert_eq!(observed.load(Ordering::SeqCst), 0, "priority sync overtakes normal task");
    assert_eq!(n.load(Ordering::SeqCst), 1);
}

#[test]
fn test_derived_handles_target_lanes() {
    let rl = RunLoop::new();

    assert_eq!(rl.lane(), Lane::Normal);
    assert_eq!(rl.priority().lane(), Lane::Priority);
    assert_eq!(rl.priority().normal().lane(), Lane::Normal);
    assert_eq!(rl.priority().name(), rl.name());
}

#[test]
fn test_wait_drains_all_tasks() {
    let rl = RunLoop::new();
    let n = Arc::new(AtomicUsize::new(0));

    for _ in 0..1000 {
        let counter = n.clone();
        rl.spawn("increment", move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }
    rl.wait();

    assert_eq!(n.load(Ordering::Relaxed), 1000);
    assert_eq!(rl.pending(), 0);
    assert_eq!(rl.queued(), 0);
}

#[test]
fn test_concurrent_producers_are_serialized() {
    let rl = RunLoop::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let total = Arc::new(Mutex::new(0usize));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let rl = rl.clone();
            let inside = inside.clone();
            let total = total.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    let inside = inside.clone();
                    let total = total.clone();
                    rl.spawn("critical", move || {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0, "tasks overlapped");
                        *total.lock().unwrap() += 1;
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    rl.wait();

    assert_eq!(*total.lock().unwrap(), 1000);
}

#[test]
fn test_expecting_extends_wait() {
    let rl = RunLoop::new();
    let finished = Arc::new(AtomicUsize::new(0));

    rl.expecting();
    assert_eq!(rl.pending(), 1);

    let handle = rl.clone();
    let flag = finished.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        flag.store(1, Ordering::SeqCst);
        handle.done_expecting();
    });

    rl.wait();
    assert_eq!(finished.load(Ordering::SeqCst), 1, "wait returned before done_expecting");
    worker.join().unwrap();
}

#[test]
fn test_expecting_from_a_task() {
    let rl = RunLoop::new();
    let finished = Arc::new(AtomicUsize::new(0));

    let handle = rl.clone();
    let flag = finished.clone();
    rl.spawn("hand-off", move || {
        handle.expecting();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag.store(1, Ordering::SeqCst);
            handle.done_expecting();
        });
    });

    rl.wait();
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
#[should_panic(expected = "done_expecting called without a matching expecting")]
fn test_unbalanced_done_expecting_panics() {
    let rl = RunLoop::new();
    rl.done_expecting();
}
