// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Concurrency tests using parking_lot's built-in deadlock detector.
//!
//! These verify that per-account locking and the ascending-id lock order
//! for transfers hold up under contention: opposite-direction transfers,
//! exhausting withdrawals, and batch jobs racing interactive traffic.

use bankledger::{AccountId, CustomerId, Ledger, LedgerError, OpenAccount};
use parking_lot::deadlock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

fn savings(ledger: &Ledger, customer: u32, balance: Decimal) -> AccountId {
    ledger
        .open_account(OpenAccount::savings(CustomerId(customer)).with_opening_balance(balance))
        .unwrap()
}

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
/// Returns a handle to stop the detector.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(100));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                eprintln!("\n=== DEADLOCK DETECTED ===");
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("\nDeadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}", t.thread_id());
                        eprintln!("Backtrace:\n{:#?}", t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

/// Stops the deadlock detector.
fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150)); // Let detector thread exit
}

// === Tests ===

/// Concurrent withdrawals that together exceed the available balance:
/// exactly enough succeed to exhaust the margin above the floor, the rest
/// fail with InsufficientFunds, and the floor is never breached.
#[test]
fn concurrent_withdrawals_exhaust_exactly_the_available_margin() {
    let detector = start_deadlock_detector();
    let ledger = Arc::new(Ledger::new());
    let id = ledger
        .open_account(
            OpenAccount::savings(CustomerId(1))
                .with_min_balance(dec!(10.00))
                .with_opening_balance(dec!(100.00)),
        )
        .unwrap();

    // Available margin is 90.00; ten threads each try to take 30.00.
    let succeeded = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        let succeeded = succeeded.clone();
        handles.push(thread::spawn(move || {
            match ledger.withdraw(id, dec!(30.00), "race") {
                Ok(_) => {
                    succeeded.fetch_add(1, Ordering::SeqCst);
                }
                Err(LedgerError::InsufficientFunds) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }));
    }
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(succeeded.load(Ordering::SeqCst), 3);
    assert_eq!(ledger.snapshot(id).unwrap().balance, dec!(10.00));
}

/// Two threads hammer transfers in opposite directions between the same two
/// accounts. The ascending-id lock order must prevent deadlock, and the
/// total across both accounts is conserved.
#[test]
fn no_deadlock_opposite_direction_transfers() {
    let detector = start_deadlock_detector();
    let ledger = Arc::new(Ledger::new());
    let a = savings(&ledger, 1, dec!(10000.00));
    let b = savings(&ledger, 2, dec!(10000.00));

    const TRANSFERS_PER_THREAD: usize = 200;

    let forward = {
        let ledger = ledger.clone();
        thread::spawn(move || {
            for _ in 0..TRANSFERS_PER_THREAD {
                let _ = ledger.transfer(a, b, dec!(5.00), "forward");
            }
        })
    };
    let backward = {
        let ledger = ledger.clone();
        thread::spawn(move || {
            for _ in 0..TRANSFERS_PER_THREAD {
                let _ = ledger.transfer(b, a, dec!(5.00), "backward");
            }
        })
    };

    forward.join().expect("Thread panicked");
    backward.join().expect("Thread panicked");

    stop_deadlock_detector(detector);

    // Same branch, so no fees: money only moved, never vanished.
    let total = ledger.snapshot(a).unwrap().balance + ledger.snapshot(b).unwrap().balance;
    assert_eq!(total, dec!(20000.00));
}

/// Transfers between disjoint account pairs proceed in parallel; each pair's
/// total is conserved independently.
#[test]
fn no_deadlock_disjoint_transfer_pairs() {
    let detector = start_deadlock_detector();
    let ledger = Arc::new(Ledger::new());

    const PAIRS: usize = 4;
    const OPS: usize = 100;

    let mut accounts = Vec::new();
    for pair in 0..PAIRS {
        let left = savings(&ledger, (pair * 2 + 1) as u32, dec!(1000.00));
        let right = savings(&ledger, (pair * 2 + 2) as u32, dec!(1000.00));
        accounts.push((left, right));
    }

    let mut handles = Vec::new();
    for &(left, right) in &accounts {
        let ledger = ledger.clone();
        handles.push(thread::spawn(move || {
            for i in 0..OPS {
                if i % 2 == 0 {
                    let _ = ledger.transfer(left, right, dec!(3.00), "ping");
                } else {
                    let _ = ledger.transfer(right, left, dec!(3.00), "pong");
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    for (left, right) in accounts {
        let total = ledger.snapshot(left).unwrap().balance + ledger.snapshot(right).unwrap().balance;
        assert_eq!(total, dec!(2000.00));
    }
}

/// Mixed deposits, withdrawals, transfers, and reads across many accounts.
#[test]
fn no_deadlock_mixed_operations() {
    let detector = start_deadlock_detector();
    let ledger = Arc::new(Ledger::new());

    const NUM_THREADS: usize = 16;
    const NUM_ACCOUNTS: u32 = 8;
    const OPS_PER_THREAD: usize = 200;

    for customer in 1..=NUM_ACCOUNTS {
        savings(&ledger, customer, dec!(10000.00));
    }

    let mut handles = Vec::with_capacity(NUM_THREADS);
    for thread_id in 0..NUM_THREADS {
        let ledger = ledger.clone();
        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD {
                let id = AccountId(((thread_id + i) % NUM_ACCOUNTS as usize) as u32 + 1);
                let other = AccountId((id.0 % NUM_ACCOUNTS) + 1);
                match i % 5 {
                    0 => {
                        ledger.deposit(id, dec!(1.00), "mix").unwrap();
                    }
                    1 => {
                        let _ = ledger.withdraw(id, dec!(0.50), "mix");
                    }
                    2 => {
                        if id != other {
                            let _ = ledger.transfer(id, other, dec!(2.00), "mix");
                        }
                    }
                    3 => {
                        let _ = ledger.snapshot(id);
                    }
                    _ => {
                        let _ = ledger.statement(id);
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    // Every journal record still chains correctly per account.
    for snapshot in ledger.accounts() {
        let statement = ledger.statement(snapshot.id).unwrap();
        for pair in statement.windows(2) {
            assert_eq!(pair[0].balance_after, pair[1].balance_before);
        }
        assert_eq!(
            statement.last().map(|r| r.balance_after).unwrap_or_default(),
            snapshot.balance
        );
    }
}

/// Interest accrual scanning while deposits keep landing.
#[test]
fn no_deadlock_batch_during_interactive_traffic() {
    let detector = start_deadlock_detector();
    let ledger = Arc::new(Ledger::new());

    const NUM_ACCOUNTS: u32 = 50;
    for customer in 1..=NUM_ACCOUNTS {
        savings(&ledger, customer, dec!(1000.00));
    }

    let running = Arc::new(AtomicBool::new(true));
    let mut handles = Vec::new();

    for writer in 0..4 {
        let ledger = ledger.clone();
        let running = running.clone();
        handles.push(thread::spawn(move || {
            let mut i = 0usize;
            while running.load(Ordering::SeqCst) && i < 500 {
                let id = AccountId(((writer * 13 + i) % NUM_ACCOUNTS as usize) as u32 + 1);
                let _ = ledger.deposit(id, dec!(0.25), "traffic");
                i += 1;
                thread::yield_now();
            }
        }));
    }

    let accrual = {
        let ledger = ledger.clone();
        thread::spawn(move || ledger.accrue_interest("2026-07"))
    };
    let outcome = accrual.join().expect("Batch thread panicked");
    running.store(false, Ordering::SeqCst);
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    assert_eq!(outcome.processed, NUM_ACCOUNTS as usize);
    assert_eq!(outcome.failed, 0);
}

/// High contention on a single account with many threads.
#[test]
fn no_deadlock_high_contention_single_account() {
    let detector = start_deadlock_detector();
    let ledger = Arc::new(Ledger::new());
    let id = savings(&ledger, 1, dec!(0.00));

    const NUM_THREADS: usize = 50;
    const OPS_PER_THREAD: usize = 100;

    let mut handles = Vec::with_capacity(NUM_THREADS);
    for _ in 0..NUM_THREADS {
        let ledger = ledger.clone();
        handles.push(thread::spawn(move || {
            for i in 0..OPS_PER_THREAD {
                if i % 3 == 0 {
                    ledger.deposit(id, dec!(10.00), "spin").unwrap();
                } else if i % 3 == 1 {
                    let _ = ledger.withdraw(id, dec!(1.00), "spin");
                } else {
                    let _ = ledger.snapshot(id);
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    stop_deadlock_detector(detector);

    let balance = ledger.snapshot(id).unwrap().balance;
    assert!(balance >= Decimal::ZERO);
    println!(
        "High contention test passed: {} threads × {} ops, final balance {}",
        NUM_THREADS, OPS_PER_THREAD, balance
    );
}
