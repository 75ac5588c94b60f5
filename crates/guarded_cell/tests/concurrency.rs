// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, reason = "This is a test module")]

//! Integration tests for sharing a `GuardedCell` between threads.

use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use guarded_cell::{CellOptions, Completion, Error, GuardedCell, LifecycleState, Operation};

const SIZE: usize = 4096;
const THREADS: usize = 8;
const ITERATIONS: usize = 200;

#[test]
fn readers_never_observe_torn_writes() {
    let cell = GuardedCell::with_size(CellOptions::default(), SIZE).unwrap();
    cell.write(&[0xAA; SIZE]).unwrap();

    thread::scope(|scope| {
        for index in 0..THREADS {
            let cell = &cell;

            scope.spawn(move || {
                let pattern = if index % 2 == 0 { 0xAA } else { 0x55 };
                let mut out = vec![0; SIZE];

                for _ in 0..ITERATIONS {
                    assert_eq!(cell.write(&[pattern; SIZE]), Ok(Completion::COMPLETED));
                    assert_eq!(cell.read(&mut out), Ok(Completion::COMPLETED));

                    let first = out[0];
                    assert!(first == 0xAA || first == 0x55);
                    assert!(out.iter().all(|b| *b == first), "read observed a torn write");
                }
            });
        }
    });

    assert_eq!(cell.state(), LifecycleState::Initialized);
}

#[test]
fn racing_frees_succeed_exactly_once() {
    let cell = GuardedCell::with_size(CellOptions::default(), 64).unwrap();
    let barrier = Barrier::new(THREADS);
    let successes = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                barrier.wait();

                match cell.free() {
                    Ok(_) => {
                        successes.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(error) => assert!(matches!(error, Error::InvalidState { .. })),
                }
            });
        }
    });

    assert_eq!(successes.load(Ordering::Relaxed), 1);
    assert_eq!(cell.state(), LifecycleState::Unallocated);
}

#[test]
fn racing_destroys_succeed_exactly_once() {
    let cell = GuardedCell::from_bytes(CellOptions::default(), &[1; 64]).unwrap();
    let barrier = Barrier::new(THREADS);
    let successes = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                barrier.wait();

                match cell.destroy() {
                    Ok(_) => {
                        successes.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(error) => assert_eq!(
                        error,
                        Error::InvalidState {
                            operation: Operation::Destroy,
                            state: LifecycleState::Destroyed,
                        }
                    ),
                }
            });
        }
    });

    assert_eq!(successes.load(Ordering::Relaxed), 1);
    assert_eq!(cell.state(), LifecycleState::Destroyed);
}

#[test]
fn destroyed_cell_rejects_contending_callers() {
    let cell = GuardedCell::from_bytes(CellOptions::default(), &[1; 8]).unwrap();
    cell.destroy().unwrap();

    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                barrier.wait();
                let mut out = [0; 8];

                for _ in 0..ITERATIONS {
                    assert_eq!(
                        cell.destroy(),
                        Err(Error::InvalidState {
                            operation: Operation::Destroy,
                            state: LifecycleState::Destroyed,
                        })
                    );
                    assert_eq!(
                        cell.read(&mut out),
                        Err(Error::InvalidState {
                            operation: Operation::Read,
                            state: LifecycleState::Destroyed,
                        })
                    );
                }
            });
        }
    });
}

#[test]
fn resizes_and_reads_interleave_safely() {
    let cell = GuardedCell::from_bytes(CellOptions::default(), &[7; 16]).unwrap();

    thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..ITERATIONS {
                let size = 1 + round % 32;
                cell.resize(size).unwrap();
                cell.write(&[7; 32][..size]).unwrap();
            }
        });

        scope.spawn(|| {
            for _ in 0..ITERATIONS {
                // A read may land between a growing resize and the next write.
                if let Ok((bytes, _)) = cell.read_to_vec() {
                    assert!(bytes.iter().all(|b| *b == 7));
                }
            }
        });
    });
}

#[test]
fn single_threaded_cell_rejects_or_serves_each_call() {
    let cell = GuardedCell::with_size(CellOptions::new().concurrent(false), 256).unwrap();
    cell.write(&[0x11; 256]).unwrap();

    let served = AtomicUsize::new(0);
    let rejected = AtomicUsize::new(0);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                let mut out = [0; 256];

                for _ in 0..ITERATIONS {
                    match cell.read(&mut out) {
                        Ok(_) => {
                            assert!(out.iter().all(|b| *b == 0x11));
                            served.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(Error::ConcurrentAccess) => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(error) => panic!("unexpected error: {error}"),
                    }
                }
            });
        }
    });

    assert_eq!(
        served.load(Ordering::Relaxed) + rejected.load(Ordering::Relaxed),
        THREADS * ITERATIONS
    );
    assert!(served.load(Ordering::Relaxed) > 0);
}
