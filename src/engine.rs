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

//! The ledger engine.
//!
//! [`Ledger`] is the central component: it owns the account store, the
//! transaction journal, and the transfer log, and exposes the account
//! operations and the transfer orchestrator.
//!
//! # Atomic units
//!
//! Every balance-affecting operation runs as one atomic unit: the account
//! lock (both account locks, for transfers) is held from the first
//! validation to the last journal append, so no concurrent operation can
//! observe a stale balance or a half-applied transfer. Validation failures
//! return before anything is written; a failure after the source debit of a
//! transfer restores the debited balance before the locks release.
//!
//! # Lock ordering
//!
//! Transfers and reversals acquire both account locks in ascending
//! [`AccountId`] order, so two opposite-direction transfers between the same
//! pair of accounts cannot deadlock. Operations on disjoint accounts run
//! fully in parallel.

use crate::account::{Account, AccountSnapshot, AccountStatus, OpenAccount};
use crate::base::{AccountId, TransactionId, TransferId};
use crate::batch::PeriodMarker;
use crate::error::LedgerError;
use crate::journal::{AuditEvent, AuditKind, AuditTrail, TransactionJournal};
use crate::policy::Policy;
use crate::transaction::{TransactionKind, TransactionRecord};
use crate::transfer::{Transfer, TransferLog, TransferStatus};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Outcome of a deposit or withdrawal: the journaled transaction and the
/// balance it left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction: TransactionId,
    pub balance: Decimal,
}

/// Outcome of a transfer or reversal: the transfer record plus its
/// debit-side and credit-side transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer: TransferId,
    pub debit: TransactionId,
    pub credit: TransactionId,
    pub fee: Decimal,
}

/// Transactional ledger over an in-memory account store.
pub struct Ledger {
    /// Accounts indexed by id.
    pub(crate) accounts: DashMap<AccountId, Arc<Account>>,
    /// Append-only record of every balance movement.
    pub(crate) journal: TransactionJournal,
    pub(crate) transfers: TransferLog,
    pub(crate) audit: AuditTrail,
    /// Interest-accrual progress per period label, for idempotent re-runs.
    pub(crate) interest_markers: DashMap<String, PeriodMarker>,
    pub(crate) policy: Policy,
    next_account: AtomicU32,
}

impl Ledger {
    /// Creates an empty ledger with the default [`Policy`].
    pub fn new() -> Self {
        Self::with_policy(Policy::default())
    }

    pub fn with_policy(policy: Policy) -> Self {
        Self {
            accounts: DashMap::new(),
            journal: TransactionJournal::new(),
            transfers: TransferLog::default(),
            audit: AuditTrail::default(),
            interest_markers: DashMap::new(),
            policy,
            next_account: AtomicU32::new(0),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub(crate) fn account(&self, id: AccountId) -> Result<Arc<Account>, LedgerError> {
        self.accounts
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::AccountNotFound(id))
    }

    // === Account lifecycle ===

    /// Opens an account. A nonzero opening balance is journaled as the
    /// account's first deposit.
    pub fn open_account(&self, spec: OpenAccount) -> Result<AccountId, LedgerError> {
        spec.validate()?;
        let id = AccountId(self.next_account.fetch_add(1, Ordering::Relaxed) + 1);
        let account = Arc::new(Account::open(id, &spec, Utc::now()));

        if spec.opening_balance > Decimal::ZERO {
            let tx_id = self.journal.next_id();
            self.journal.append(Arc::new(TransactionRecord::new(
                tx_id,
                id,
                TransactionKind::Deposit,
                spec.opening_balance,
                Decimal::ZERO,
                spec.opening_balance,
                None,
                Some("opening deposit".to_string()),
            )))?;
        }

        self.accounts.insert(id, account);
        self.audit.record(
            id,
            AuditKind::AccountOpened,
            format!("opened for customer {}", spec.owner),
        );
        info!(account = %id, owner = %spec.owner, "account opened");
        Ok(id)
    }

    /// Closes an account. Terminal: a closed account never transitions again.
    pub fn close_account(&self, id: AccountId) -> Result<(), LedgerError> {
        self.transition(id, AccountStatus::Closed, |status| {
            status != AccountStatus::Closed
        })
    }

    /// Administrative freeze. Blocks all movement until reactivated.
    pub fn freeze(&self, id: AccountId) -> Result<(), LedgerError> {
        self.transition(id, AccountStatus::Frozen, |status| {
            status == AccountStatus::Active
        })
    }

    /// Returns a dormant or frozen account to active.
    pub fn reactivate(&self, id: AccountId) -> Result<(), LedgerError> {
        self.transition(id, AccountStatus::Active, |status| {
            matches!(status, AccountStatus::Dormant | AccountStatus::Frozen)
        })
    }

    fn transition(
        &self,
        id: AccountId,
        target: AccountStatus,
        allowed_from: impl Fn(AccountStatus) -> bool,
    ) -> Result<(), LedgerError> {
        let account = self.account(id)?;
        let mut data = account.lock();
        if !allowed_from(data.status) {
            return Err(LedgerError::InvalidAccountState {
                account: id,
                status: data.status,
            });
        }
        let previous = data.status;
        data.status = target;
        drop(data);
        self.audit.record(
            id,
            AuditKind::StatusChanged,
            format!("{previous} -> {target}"),
        );
        info!(account = %id, %previous, status = %target, "account status changed");
        Ok(())
    }

    // === Account operations ===

    /// Credits an account. Fails with [`LedgerError::AccountNotFound`],
    /// [`LedgerError::InvalidAccountState`] when the account is not active,
    /// or [`LedgerError::InvalidAmount`] for non-positive amounts.
    pub fn deposit(
        &self,
        id: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<TxReceipt, LedgerError> {
        let account = self.account(id)?;
        let mut data = account.lock();
        let (before, after) = data.credit(amount)?;
        let tx_id = self.journal.next_id();
        self.journal.append(Arc::new(TransactionRecord::new(
            tx_id,
            id,
            TransactionKind::Deposit,
            amount,
            before,
            after,
            None,
            Some(description.to_string()),
        )))?;
        Ok(TxReceipt {
            transaction: tx_id,
            balance: after,
        })
    }

    /// Debits an account under the floor rule for its type: savings may not
    /// go below the minimum balance, current accounts may additionally use
    /// their overdraft limit, and fixed deposits do not support withdrawal.
    pub fn withdraw(
        &self,
        id: AccountId,
        amount: Decimal,
        performed_by: &str,
    ) -> Result<TxReceipt, LedgerError> {
        let account = self.account(id)?;
        let mut data = account.lock();
        let (before, after) = data.debit(amount)?;
        let tx_id = self.journal.next_id();
        self.journal.append(Arc::new(TransactionRecord::new(
            tx_id,
            id,
            TransactionKind::Withdrawal,
            amount,
            before,
            after,
            None,
            Some(performed_by.to_string()),
        )))?;
        Ok(TxReceipt {
            transaction: tx_id,
            balance: after,
        })
    }

    // === Transfer orchestrator ===

    /// Moves `amount` between two accounts as one atomic unit, charging the
    /// policy fee on top of the debit when the branches differ.
    ///
    /// Validation order: source exists and is active, destination exists and
    /// is active, currencies match, amount is positive, and the source can
    /// cover amount plus fee under its withdrawal floor. Nothing is written
    /// until every check has passed.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        if from == to {
            return Err(LedgerError::UnsupportedOperation(
                "transfer within the same account",
            ));
        }
        let source = self.account(from)?;
        let destination = self.account(to)?;

        // Ascending-id lock order keeps opposite-direction transfers from
        // deadlocking.
        let (mut src, mut dst) = if from < to {
            let s = source.lock();
            let d = destination.lock();
            (s, d)
        } else {
            let d = destination.lock();
            let s = source.lock();
            (s, d)
        };

        src.ensure_active()?;
        dst.ensure_active()?;
        if src.currency != dst.currency {
            return Err(LedgerError::UnsupportedOperation(
                "currency mismatch between accounts",
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }
        let fee = self.policy.transfer_fee(src.branch, dst.branch);

        let (source_before, source_after) = src.debit(amount + fee)?;
        let (dest_before, dest_after) = match dst.credit(amount) {
            Ok(movement) => movement,
            Err(error) => {
                // Roll the unit back; the locks are still held, so the
                // intermediate debit was never visible.
                src.restore_balance(source_before);
                let id = self.transfers.next_id();
                self.transfers.insert(Transfer {
                    id,
                    from,
                    to,
                    amount,
                    fee,
                    status: TransferStatus::Failed,
                    debit_tx: None,
                    credit_tx: None,
                    created_at: Utc::now(),
                });
                warn!(transfer = %id, %from, %to, %error, "transfer rolled back");
                return Err(error);
            }
        };

        let debit_id = self.journal.next_id();
        let credit_id = self.journal.next_id();
        let after_out = source_before - amount;

        self.journal.append(Arc::new(TransactionRecord::new(
            debit_id,
            from,
            TransactionKind::TransferOut,
            amount,
            source_before,
            after_out,
            Some(credit_id),
            Some(description.to_string()),
        )))?;
        if fee > Decimal::ZERO {
            let fee_id = self.journal.next_id();
            self.journal.append(Arc::new(TransactionRecord::new(
                fee_id,
                from,
                TransactionKind::Fee,
                fee,
                after_out,
                source_after,
                None,
                Some("inter-branch transfer fee".to_string()),
            )))?;
        }
        self.journal.append(Arc::new(TransactionRecord::new(
            credit_id,
            to,
            TransactionKind::TransferIn,
            amount,
            dest_before,
            dest_after,
            Some(debit_id),
            Some(description.to_string()),
        )))?;

        let transfer_id = self.transfers.next_id();
        self.transfers.insert(Transfer {
            id: transfer_id,
            from,
            to,
            amount,
            fee,
            status: TransferStatus::Completed,
            debit_tx: Some(debit_id),
            credit_tx: Some(credit_id),
            created_at: Utc::now(),
        });
        debug!(transfer = %transfer_id, %from, %to, %amount, %fee, "transfer completed");

        Ok(TransferReceipt {
            transfer: transfer_id,
            debit: debit_id,
            credit: credit_id,
            fee,
        })
    }

    /// Undoes a completed transfer: debits the destination by the amount,
    /// refunds amount plus fee to the source, and links the two reversal
    /// records. Only completed transfers reverse, and only once.
    pub fn reverse_transfer(&self, id: TransferId) -> Result<TransferReceipt, LedgerError> {
        let transfer = self
            .transfers
            .get(id)
            .ok_or(LedgerError::TransferNotFound(id))?;
        if transfer.status != TransferStatus::Completed {
            return Err(LedgerError::InvalidTransferState {
                transfer: id,
                status: transfer.status,
            });
        }

        let source = self.account(transfer.from)?;
        let destination = self.account(transfer.to)?;
        let (mut src, mut dst) = if transfer.from < transfer.to {
            let s = source.lock();
            let d = destination.lock();
            (s, d)
        } else {
            let d = destination.lock();
            let s = source.lock();
            (s, d)
        };

        // Re-check under the account locks: concurrent reversals of the same
        // transfer serialize on them, so only one sees Completed.
        let status = self
            .transfers
            .get(id)
            .ok_or(LedgerError::TransferNotFound(id))?
            .status;
        if status != TransferStatus::Completed {
            return Err(LedgerError::InvalidTransferState {
                transfer: id,
                status,
            });
        }

        dst.ensure_active()?;
        src.ensure_active()?;
        let refund = transfer.amount + transfer.fee;

        let (dest_before, dest_after) = dst.debit(transfer.amount)?;
        let (source_before, source_after) = match src.credit(refund) {
            Ok(movement) => movement,
            Err(error) => {
                dst.restore_balance(dest_before);
                return Err(error);
            }
        };

        let debit_id = self.journal.next_id();
        let credit_id = self.journal.next_id();
        let detail = format!("reversal of transfer {id}");

        self.journal.append(Arc::new(TransactionRecord::new(
            debit_id,
            transfer.to,
            TransactionKind::Reversal,
            transfer.amount,
            dest_before,
            dest_after,
            Some(credit_id),
            Some(detail.clone()),
        )))?;
        self.journal.append(Arc::new(TransactionRecord::new(
            credit_id,
            transfer.from,
            TransactionKind::Reversal,
            refund,
            source_before,
            source_after,
            Some(debit_id),
            Some(detail),
        )))?;

        if let Some(mut entry) = self.transfers.get_mut(id) {
            entry.status = TransferStatus::Reversed;
        }
        self.audit.record(
            transfer.from,
            AuditKind::TransferReversed,
            format!("transfer {id} reversed"),
        );
        info!(transfer = %id, "transfer reversed");

        Ok(TransferReceipt {
            transfer: id,
            debit: debit_id,
            credit: credit_id,
            fee: transfer.fee,
        })
    }

    // === Read-only queries ===

    pub fn snapshot(&self, id: AccountId) -> Option<AccountSnapshot> {
        self.accounts.get(&id).map(|entry| entry.snapshot())
    }

    /// Snapshots of every account, ordered by id.
    pub fn accounts(&self) -> Vec<AccountSnapshot> {
        let mut snapshots: Vec<AccountSnapshot> = self
            .accounts
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// The account's transaction history, in posting order.
    pub fn statement(
        &self,
        id: AccountId,
    ) -> Result<Vec<Arc<TransactionRecord>>, LedgerError> {
        if !self.accounts.contains_key(&id) {
            return Err(LedgerError::AccountNotFound(id));
        }
        Ok(self.journal.for_account(id))
    }

    pub fn journal(&self) -> &TransactionJournal {
        &self.journal
    }

    pub fn get_transfer(&self, id: TransferId) -> Option<Transfer> {
        self.transfers.get(id)
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }

    /// Sum of all account balances, closed accounts included.
    pub fn total_balance(&self) -> Decimal {
        self.accounts
            .iter()
            .map(|entry| entry.value().balance())
            .sum()
    }

    /// Removes and returns all queued audit events, oldest first.
    pub fn drain_audit(&self) -> Vec<AuditEvent> {
        self.audit.drain()
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
