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

//! Property-based tests for the ledger invariants.
//!
//! These verify properties that should hold for any sequence of valid
//! operations: journal arithmetic, balance floors, transfer conservation,
//! and EMI schedule totals.

use bankledger::{
    BranchId, CustomerId, Ledger, LedgerError, OpenAccount, TransactionKind, calculate_emi,
    emi_schedule,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Positive amount between 0.01 and 10,000.00 with two decimal places.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Annual interest rate between 0.00% and 24.00%.
fn arb_rate() -> impl Strategy<Value = Decimal> {
    (0i64..=2_400i64).prop_map(|bp| Decimal::new(bp, 2))
}

// =============================================================================
// Journal Arithmetic
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Every journal record's closing balance is its opening balance
    /// adjusted by the amount, and consecutive records chain.
    #[test]
    fn journal_arithmetic_holds_for_any_op_sequence(
        deposits in prop::collection::vec(arb_amount(), 1..10),
        withdrawals in prop::collection::vec(arb_amount(), 0..10),
    ) {
        let ledger = Ledger::new();
        let id = ledger
            .open_account(OpenAccount::savings(CustomerId(1)))
            .unwrap();

        for amount in &deposits {
            ledger.deposit(id, *amount, "prop").unwrap();
        }
        for amount in &withdrawals {
            // May fail with InsufficientFunds; the journal must stay clean.
            let _ = ledger.withdraw(id, *amount, "prop");
        }

        let statement = ledger.statement(id).unwrap();
        for record in &statement {
            match record.kind.is_credit() {
                Some(true) => prop_assert_eq!(
                    record.balance_after,
                    record.balance_before + record.amount
                ),
                Some(false) => prop_assert_eq!(
                    record.balance_after,
                    record.balance_before - record.amount
                ),
                None => {}
            }
            prop_assert!(record.amount > Decimal::ZERO);
        }
        for pair in statement.windows(2) {
            prop_assert_eq!(pair[0].balance_after, pair[1].balance_before);
        }
        prop_assert_eq!(
            statement.last().map(|r| r.balance_after).unwrap_or_default(),
            ledger.snapshot(id).unwrap().balance
        );
    }

    /// A savings balance never ends below its minimum balance, whatever the
    /// withdrawal pattern.
    #[test]
    fn savings_floor_is_never_breached(
        min_balance in (0i64..=50_000i64).prop_map(|c| Decimal::new(c, 2)),
        withdrawals in prop::collection::vec(arb_amount(), 1..20),
    ) {
        let ledger = Ledger::new();
        let opening = min_balance + Decimal::new(100_000, 2);
        let id = ledger
            .open_account(
                OpenAccount::savings(CustomerId(1))
                    .with_min_balance(min_balance)
                    .with_opening_balance(opening),
            )
            .unwrap();

        for amount in &withdrawals {
            let _ = ledger.withdraw(id, *amount, "prop");
        }

        prop_assert!(ledger.snapshot(id).unwrap().balance >= min_balance);
    }

    /// A failed withdrawal leaves the balance exactly where it was.
    #[test]
    fn failed_withdrawal_has_no_effect(
        balance in arb_amount(),
        excess in arb_amount(),
    ) {
        let ledger = Ledger::new();
        let id = ledger
            .open_account(OpenAccount::savings(CustomerId(1)).with_opening_balance(balance))
            .unwrap();

        let result = ledger.withdraw(id, balance + excess, "prop");
        prop_assert_eq!(result, Err(LedgerError::InsufficientFunds));
        prop_assert_eq!(ledger.snapshot(id).unwrap().balance, balance);
    }
}

// =============================================================================
// Transfer Conservation
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Transfers between same-branch accounts conserve the combined total,
    /// and every TransferOut is paired with a TransferIn that points back.
    #[test]
    fn transfers_conserve_total_and_pair_up(
        amounts in prop::collection::vec(arb_amount(), 1..15),
        opening_a in arb_amount(),
        opening_b in arb_amount(),
    ) {
        let ledger = Ledger::new();
        let a = ledger
            .open_account(OpenAccount::savings(CustomerId(1)).with_opening_balance(opening_a))
            .unwrap();
        let b = ledger
            .open_account(OpenAccount::savings(CustomerId(2)).with_opening_balance(opening_b))
            .unwrap();

        for (i, amount) in amounts.iter().enumerate() {
            let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
            let _ = ledger.transfer(from, to, *amount, "prop");
        }

        let total = ledger.snapshot(a).unwrap().balance + ledger.snapshot(b).unwrap().balance;
        prop_assert_eq!(total, opening_a + opening_b);

        for account in [a, b] {
            for record in ledger.statement(account).unwrap() {
                if record.kind == TransactionKind::TransferOut {
                    let pair_id = record.paired_with.expect("transfer-out must be paired");
                    let pair = ledger.journal().get(pair_id).expect("paired leg must exist");
                    prop_assert_eq!(pair.kind, TransactionKind::TransferIn);
                    prop_assert_eq!(pair.paired_with, Some(record.id));
                    prop_assert_eq!(pair.amount, record.amount);
                }
            }
        }
    }

    /// Inter-branch transfers siphon exactly amount+fee from the source and
    /// deliver exactly the amount.
    #[test]
    fn inter_branch_fee_arithmetic(
        amount in arb_amount(),
    ) {
        let ledger = Ledger::new();
        let fee = ledger.policy().inter_branch_fee;
        let opening = amount + fee + Decimal::ONE;
        let a = ledger
            .open_account(
                OpenAccount::savings(CustomerId(1))
                    .with_branch(BranchId(1))
                    .with_opening_balance(opening),
            )
            .unwrap();
        let b = ledger
            .open_account(OpenAccount::savings(CustomerId(2)).with_branch(BranchId(2)))
            .unwrap();

        let receipt = ledger.transfer(a, b, amount, "prop").unwrap();
        prop_assert_eq!(receipt.fee, fee);
        prop_assert_eq!(ledger.snapshot(a).unwrap().balance, opening - amount - fee);
        prop_assert_eq!(ledger.snapshot(b).unwrap().balance, amount);
    }
}

// =============================================================================
// EMI Schedules
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The schedule always has exactly `tenure` rows, its principal parts
    /// sum to the loan principal, and the final balance is exactly zero.
    #[test]
    fn emi_schedule_totals(
        principal in (10_000i64..=100_000_000i64).prop_map(|c| Decimal::new(c, 2)),
        rate in arb_rate(),
        tenure in 1u32..=120,
    ) {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let rows: Vec<_> = emi_schedule(principal, rate, tenure, start)
            .unwrap()
            .collect();

        prop_assert_eq!(rows.len(), tenure as usize);
        prop_assert_eq!(rows.last().unwrap().remaining, Decimal::ZERO);

        let principal_sum: Decimal = rows.iter().map(|row| row.principal).sum();
        prop_assert_eq!(principal_sum, principal);

        for row in &rows {
            prop_assert!(row.interest >= Decimal::ZERO);
            prop_assert!(row.principal >= Decimal::ZERO);
            prop_assert!(row.remaining >= Decimal::ZERO);
        }
    }

    /// Zero-rate EMI is flat division, rounded to the cent.
    #[test]
    fn zero_rate_emi_is_flat(
        principal in (10_000i64..=100_000_000i64).prop_map(|c| Decimal::new(c, 2)),
        tenure in 1u32..=120,
    ) {
        let emi = calculate_emi(principal, Decimal::ZERO, tenure).unwrap();
        let flat = principal / Decimal::from(tenure);
        prop_assert!((emi - flat).abs() <= Decimal::new(1, 2));
    }

    /// The EMI always covers at least the first month's interest, so an
    /// EMI-sized payment always reduces the principal.
    #[test]
    fn emi_exceeds_first_month_interest(
        principal in (100_000i64..=100_000_000i64).prop_map(|c| Decimal::new(c, 2)),
        rate in (1i64..=2_400i64).prop_map(|bp| Decimal::new(bp, 2)),
        tenure in 1u32..=120,
    ) {
        let emi = calculate_emi(principal, rate, tenure).unwrap();
        let first_interest = principal * rate / Decimal::from(1200);
        prop_assert!(emi > first_interest);
    }
}
