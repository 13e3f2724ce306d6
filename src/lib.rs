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

//! # Bank Ledger
//!
//! This library provides a transactional banking ledger: accounts with
//! balance rules, an append-only transaction journal, atomic transfers with
//! fees, periodic batch jobs (interest accrual, dormancy marking, loan
//! penalties), and a loan book with EMI schedules.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Account store, journal, and transfer orchestrator
//! - [`LoanBook`]: Loan records, disbursement, and payment application
//! - [`Policy`]: Fees, dormancy window, batch sizing, penalty tiers
//! - [`LedgerError`]: Error types for every operation
//!
//! ## Example
//!
//! ```
//! use bankledger::{CustomerId, Ledger, OpenAccount};
//! use rust_decimal_macros::dec;
//!
//! let ledger = Ledger::new();
//!
//! let payer = ledger
//!     .open_account(OpenAccount::savings(CustomerId(1)).with_opening_balance(dec!(500.00)))
//!     .unwrap();
//! let payee = ledger
//!     .open_account(OpenAccount::savings(CustomerId(2)))
//!     .unwrap();
//!
//! ledger.deposit(payer, dec!(250.00), "payroll").unwrap();
//! ledger.transfer(payer, payee, dec!(50.00), "rent split").unwrap();
//!
//! assert_eq!(ledger.snapshot(payer).unwrap().balance, dec!(700.00));
//! assert_eq!(ledger.snapshot(payee).unwrap().balance, dec!(50.00));
//! ```
//!
//! ## Thread Safety
//!
//! Every balance-mutating operation is an atomic unit under per-account
//! mutual exclusion; operations on disjoint accounts run in parallel, and
//! transfers take both locks in a consistent global order so opposite
//! transfers cannot deadlock.

pub mod account;
mod base;
mod batch;
mod engine;
pub mod error;
mod journal;
pub mod loan;
mod policy;
mod transaction;
mod transfer;

pub use account::{Account, AccountSnapshot, AccountStatus, AccountType, OpenAccount};
pub use base::{
    AccountId, BranchId, CustomerId, LoanId, MONEY_PRECISION, TransactionId, TransferId,
    account_number, transaction_reference, transfer_reference,
};
pub use batch::BatchOutcome;
pub use engine::{Ledger, TransferReceipt, TxReceipt};
pub use error::LedgerError;
pub use journal::{AuditEvent, AuditKind, TransactionJournal};
pub use loan::{
    EmiSchedule, Installment, Loan, LoanBook, LoanPayment, LoanSnapshot, LoanStatus,
    PaymentReceipt, calculate_emi, emi_schedule,
};
pub use policy::{PenaltyTier, Policy};
pub use transaction::{TransactionKind, TransactionRecord};
pub use transfer::{Transfer, TransferStatus};
