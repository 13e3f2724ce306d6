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

//! Account state and balance rules.
//!
//! Status state machine:
//!
//  Active ──dormancy job──► Dormant ──reactivate──► Active
//  Active ──freeze────────► Frozen  ──reactivate──► Active
//  any non-Closed ──close──► Closed (terminal)
//!
//! Only `Active` accounts accept deposits and withdrawals. A withdrawal may
//! never take the balance below the account's floor: `min_balance` for
//! savings, `min_balance - overdraft_limit` for current accounts. Fixed
//! deposits do not support withdrawals at all.

use crate::base::{AccountId, BranchId, CustomerId};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account product type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Savings,
    Current,
    FixedDeposit,
}

/// Account lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Dormant,
    Frozen,
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Active => "active",
            AccountStatus::Dormant => "dormant",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Parameters for opening a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccount {
    pub owner: CustomerId,
    pub branch: BranchId,
    pub account_type: AccountType,
    pub currency: String,
    /// Annual interest rate in percent.
    pub interest_rate: Decimal,
    pub min_balance: Decimal,
    /// How far below `min_balance` a current account may go. Must be zero
    /// for other account types.
    pub overdraft_limit: Decimal,
    pub opening_balance: Decimal,
}

impl OpenAccount {
    pub fn savings(owner: CustomerId) -> Self {
        Self {
            owner,
            branch: BranchId(1),
            account_type: AccountType::Savings,
            currency: "USD".to_string(),
            interest_rate: dec!(3.50),
            min_balance: Decimal::ZERO,
            overdraft_limit: Decimal::ZERO,
            opening_balance: Decimal::ZERO,
        }
    }

    pub fn current(owner: CustomerId) -> Self {
        Self {
            owner,
            branch: BranchId(1),
            account_type: AccountType::Current,
            currency: "USD".to_string(),
            interest_rate: Decimal::ZERO,
            min_balance: Decimal::ZERO,
            overdraft_limit: Decimal::ZERO,
            opening_balance: Decimal::ZERO,
        }
    }

    pub fn fixed_deposit(owner: CustomerId) -> Self {
        Self {
            owner,
            branch: BranchId(1),
            account_type: AccountType::FixedDeposit,
            currency: "USD".to_string(),
            interest_rate: dec!(6.50),
            min_balance: Decimal::ZERO,
            overdraft_limit: Decimal::ZERO,
            opening_balance: Decimal::ZERO,
        }
    }

    pub fn with_branch(mut self, branch: BranchId) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    pub fn with_interest_rate(mut self, rate: Decimal) -> Self {
        self.interest_rate = rate;
        self
    }

    pub fn with_min_balance(mut self, min_balance: Decimal) -> Self {
        self.min_balance = min_balance;
        self
    }

    pub fn with_overdraft_limit(mut self, limit: Decimal) -> Self {
        self.overdraft_limit = limit;
        self
    }

    pub fn with_opening_balance(mut self, balance: Decimal) -> Self {
        self.opening_balance = balance;
        self
    }

    /// Validates the parameters before any account is created.
    pub(crate) fn validate(&self) -> Result<(), LedgerError> {
        if self.min_balance < Decimal::ZERO
            || self.interest_rate < Decimal::ZERO
            || self.opening_balance < Decimal::ZERO
        {
            return Err(LedgerError::InvalidAmount);
        }
        if self.overdraft_limit < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if self.overdraft_limit > Decimal::ZERO && self.account_type != AccountType::Current {
            return Err(LedgerError::UnsupportedOperation(
                "overdraft limit on a non-current account",
            ));
        }
        // The balance invariant must hold from the first moment.
        if self.opening_balance < self.min_balance - self.overdraft_limit {
            return Err(LedgerError::InsufficientFunds);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct AccountData {
    pub(crate) id: AccountId,
    pub(crate) owner: CustomerId,
    pub(crate) branch: BranchId,
    pub(crate) account_type: AccountType,
    pub(crate) currency: String,
    pub(crate) balance: Decimal,
    pub(crate) interest_rate: Decimal,
    pub(crate) min_balance: Decimal,
    pub(crate) overdraft_limit: Decimal,
    pub(crate) status: AccountStatus,
    pub(crate) opened_at: DateTime<Utc>,
    /// Last customer-initiated movement. Interest postings do not count,
    /// so idle accounts still go dormant while earning interest.
    pub(crate) last_activity: DateTime<Utc>,
}

impl AccountData {
    fn assert_invariants(&self) {
        debug_assert!(
            self.status == AccountStatus::Closed || self.balance >= self.floor(),
            "Invariant violated: account {} balance {} below floor {}",
            self.id,
            self.balance,
            self.floor()
        );
    }

    /// The lowest balance a withdrawal may leave behind.
    pub(crate) fn floor(&self) -> Decimal {
        match self.account_type {
            AccountType::Current => self.min_balance - self.overdraft_limit,
            AccountType::Savings | AccountType::FixedDeposit => self.min_balance,
        }
    }

    /// Funds available for withdrawal above the floor.
    pub(crate) fn available(&self) -> Decimal {
        self.balance - self.floor()
    }

    pub(crate) fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.status == AccountStatus::Active {
            Ok(())
        } else {
            Err(LedgerError::InvalidAccountState {
                account: self.id,
                status: self.status,
            })
        }
    }

    /// Increases the balance. Returns `(balance_before, balance_after)`.
    pub(crate) fn credit(&mut self, amount: Decimal) -> Result<(Decimal, Decimal), LedgerError> {
        self.ensure_active()?;
        let movement = self.apply_credit(amount)?;
        self.last_activity = Utc::now();
        Ok(movement)
    }

    /// Interest posting: same balance effect as [`credit`](Self::credit),
    /// but does not reset the dormancy clock.
    pub(crate) fn post_interest(
        &mut self,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal), LedgerError> {
        self.ensure_active()?;
        self.apply_credit(amount)
    }

    fn apply_credit(&mut self, amount: Decimal) -> Result<(Decimal, Decimal), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let before = self.balance;
        self.balance += amount;
        self.assert_invariants();
        Ok((before, self.balance))
    }

    /// Decreases the balance, enforcing the floor rule for the account type.
    /// Returns `(balance_before, balance_after)`.
    pub(crate) fn debit(&mut self, amount: Decimal) -> Result<(Decimal, Decimal), LedgerError> {
        self.ensure_active()?;
        if self.account_type == AccountType::FixedDeposit {
            return Err(LedgerError::UnsupportedOperation(
                "withdrawal from a fixed deposit",
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        if amount > self.available() {
            return Err(LedgerError::InsufficientFunds);
        }
        let before = self.balance;
        self.balance -= amount;
        self.last_activity = Utc::now();
        self.assert_invariants();
        Ok((before, self.balance))
    }

    /// Rolls an in-flight atomic unit back to a previously observed balance.
    pub(crate) fn restore_balance(&mut self, balance: Decimal) {
        self.balance = balance;
    }
}

/// A ledger account. Mutable state lives behind a per-account mutex so
/// concurrent operations on the same account serialize, while operations on
/// different accounts proceed in parallel.
#[derive(Debug)]
pub struct Account {
    id: AccountId,
    inner: Mutex<AccountData>,
}

impl Account {
    pub(crate) fn open(id: AccountId, spec: &OpenAccount, now: DateTime<Utc>) -> Self {
        Self {
            id,
            inner: Mutex::new(AccountData {
                id,
                owner: spec.owner,
                branch: spec.branch,
                account_type: spec.account_type,
                currency: spec.currency.clone(),
                balance: spec.opening_balance,
                interest_rate: spec.interest_rate,
                min_balance: spec.min_balance,
                overdraft_limit: spec.overdraft_limit,
                status: AccountStatus::Active,
                opened_at: now,
                last_activity: now,
            }),
        }
    }

    /// The account id is immutable, so it is readable without the lock.
    /// Transfer lock ordering depends on this.
    pub fn id(&self) -> AccountId {
        self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AccountData> {
        self.inner.lock()
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    pub fn status(&self) -> AccountStatus {
        self.inner.lock().status
    }

    /// Point-in-time copy of the account state.
    pub fn snapshot(&self) -> AccountSnapshot {
        let data = self.inner.lock();
        AccountSnapshot {
            id: data.id,
            owner: data.owner,
            branch: data.branch,
            account_type: data.account_type,
            currency: data.currency.clone(),
            balance: data.balance,
            interest_rate: data.interest_rate,
            min_balance: data.min_balance,
            overdraft_limit: data.overdraft_limit,
            status: data.status,
            opened_at: data.opened_at,
            last_activity: data.last_activity,
        }
    }
}

/// Immutable view of an account, safe to hand out across threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub owner: CustomerId,
    pub branch: BranchId,
    pub account_type: AccountType,
    pub currency: String,
    pub balance: Decimal,
    pub interest_rate: Decimal,
    pub min_balance: Decimal,
    pub overdraft_limit: Decimal,
    pub status: AccountStatus,
    pub opened_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}
