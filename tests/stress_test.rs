//! Stress tests for the background worker

use bgworker::prelude::*;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
#[ignore] // Run with --ignored flag
fn stress_test_many_producers_global_fifo() {
    let producers = num_cpus::get().max(4);
    const PER_PRODUCER: usize = 5_000;

    let worker = BackgroundWorker::new(Arc::new(SignalGate::new()));
    worker.start().unwrap();

    // Each producer's own sequence must come out in order.
    let seen = Arc::new(Mutex::new(vec![Vec::with_capacity(PER_PRODUCER); producers]));

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let submitter = worker.submitter();
            let seen = seen.clone();
            thread::spawn(move || {
                for n in 0..PER_PRODUCER {
                    let seen = seen.clone();
                    submitter.spawn(move || seen.lock()[p].push(n)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    worker.shutdown(Timeout::INFINITE).unwrap();

    for per_producer in seen.lock().iter() {
        assert_eq!(per_producer.len(), PER_PRODUCER);
        assert!(per_producer.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
#[ignore]
fn stress_test_submit_races_shutdown() {
    for _ in 0..50 {
        let worker = BackgroundWorker::new(Arc::new(SignalGate::new()));
        worker.start().unwrap();

        let executed = Arc::new(AtomicUsize::new(0));
        let cleaned = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let submitter = worker.submitter();
                let executed = executed.clone();
                let cleaned = cleaned.clone();
                let accepted = accepted.clone();
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..200 {
                        let result = submitter.submit(
                            |e: &mut (Arc<AtomicUsize>, Arc<AtomicUsize>)| {
                                e.0.fetch_add(1, Ordering::SeqCst);
                            },
                            |(_, c)| {
                                c.fetch_add(1, Ordering::SeqCst);
                            },
                            (executed.clone(), cleaned.clone()),
                        );
                        match result {
                            Ok(()) => {
                                accepted.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(Error::Closed) => break,
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                        if rng.gen_bool(0.1) {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_micros(rand::thread_rng().gen_range(0..500)));
        worker.shutdown(Timeout::INFINITE).unwrap();

        for handle in handles {
            handle.join().unwrap();
        }

        // Every task cleaned exactly once; only accepted ones executed.
        assert_eq!(executed.load(Ordering::SeqCst), accepted.load(Ordering::SeqCst));
        assert!(cleaned.load(Ordering::SeqCst) >= executed.load(Ordering::SeqCst));
        assert_eq!(worker.pending(), 0);
    }
}

#[test]
#[ignore]
fn stress_test_signal_handler_bursts() {
    let gate = Arc::new(SignalGate::new());
    let worker = BackgroundWorker::new(gate.clone());
    worker.start().unwrap();

    let lock = Arc::new(GuardedLock::new(gate.clone(), AtomicUsize::new(0)));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let lock = lock.clone();
            thread::spawn(move || {
                for _ in 0..10_000 {
                    lock.lock().fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for _ in 0..100 {
        let held = lock.lock();
        {
            let _scope = gate.enter();
            // Must not wait on ourselves.
            lock.lock().fetch_add(1, Ordering::Relaxed);
        }
        drop(held);
        thread::yield_now();
    }

    for handle in handles {
        handle.join().unwrap();
    }
    worker.shutdown(Timeout::INFINITE).unwrap();

    assert_eq!(lock.lock().load(Ordering::Relaxed), 40_100);
}
