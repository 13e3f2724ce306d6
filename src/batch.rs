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

//! Batch jobs: interest accrual, dormancy marking, loan penalties.
//!
//! All three share the same shape: scan the eligible set in ascending id
//! order, apply the per-item operation under that item's own lock, and
//! commit progress at every chunk boundary. A single item's failure is
//! logged and counted, never fatal to the scan, and no lock is held across
//! the scan itself, so interactive operations keep flowing while a job runs.
//!
//! Interest accrual and penalty application record a per-period marker:
//! re-running a completed period is a no-op, and re-running an interrupted
//! one resumes after the last committed chunk instead of double-applying.

use crate::account::{AccountStatus, AccountType};
use crate::base::{AccountId, LoanId, round_money};
use crate::engine::{Ledger, TxReceipt};
use crate::error::LedgerError;
use crate::journal::AuditKind;
use crate::loan::{LoanBook, LoanStatus};
use crate::policy::Policy;
use crate::transaction::{TransactionKind, TransactionRecord};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tally of one batch run. `processed` counts every examined item, so
/// `processed = succeeded + failed + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Progress of a batch job within one period. `last_done` is the highest id
/// whose chunk has been committed; a restart resumes after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PeriodMarker {
    last_done: Option<u32>,
    completed: bool,
}

impl PeriodMarker {
    fn up_to(id: u32) -> Self {
        Self {
            last_done: Some(id),
            completed: false,
        }
    }

    fn complete() -> Self {
        Self {
            last_done: None,
            completed: true,
        }
    }

    fn is_complete(&self) -> bool {
        self.completed
    }

    /// Whether the given id was already handled by a committed chunk.
    fn covers(&self, id: u32) -> bool {
        self.completed || self.last_done.is_some_and(|last| id <= last)
    }
}

impl Ledger {
    /// Posts periodic interest to every eligible account.
    ///
    /// Eligible: savings and fixed deposits with a positive rate, not closed
    /// and not dormant. Frozen accounts stay in the scan so their posting
    /// failure is logged and counted rather than silently dropped. Accrual
    /// is `round(balance × rate / (100 × periods_per_year), 2)`; amounts
    /// below [`Policy::negligible_interest`] are skipped.
    ///
    /// `period` labels the accrual period (e.g. `"2026-03"`). Each period
    /// runs at most once to completion.
    pub fn accrue_interest(&self, period: &str) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let marker = self
            .interest_markers
            .get(period)
            .map(|m| *m)
            .unwrap_or_default();

        let mut ids: Vec<AccountId> = self
            .accounts
            .iter()
            .filter(|entry| {
                let data = entry.value().lock();
                matches!(
                    data.account_type,
                    AccountType::Savings | AccountType::FixedDeposit
                ) && data.interest_rate > Decimal::ZERO
                    && !matches!(data.status, AccountStatus::Closed | AccountStatus::Dormant)
            })
            .map(|entry| entry.id())
            .collect();
        ids.sort_unstable();

        if marker.is_complete() {
            outcome.processed = ids.len();
            outcome.skipped = ids.len();
            info!(period, "interest accrual already completed for this period");
            return outcome;
        }

        let chunk_size = self.policy.batch_chunk_size.max(1);
        for chunk in ids.chunks(chunk_size) {
            for &id in chunk {
                outcome.processed += 1;
                if marker.covers(id.0) {
                    outcome.skipped += 1;
                    continue;
                }
                match self.apply_interest(id, period) {
                    Ok(Some(_)) => outcome.succeeded += 1,
                    Ok(None) => outcome.skipped += 1,
                    Err(error) => {
                        warn!(account = %id, %error, "interest accrual failed, continuing");
                        outcome.failed += 1;
                    }
                }
            }
            if let Some(last) = chunk.last() {
                self.interest_markers
                    .insert(period.to_string(), PeriodMarker::up_to(last.0));
                debug!(period, through = last.0, "interest chunk committed");
            }
        }

        self.interest_markers
            .insert(period.to_string(), PeriodMarker::complete());
        info!(period, ?outcome, "interest accrual finished");
        outcome
    }

    fn apply_interest(
        &self,
        id: AccountId,
        period: &str,
    ) -> Result<Option<TxReceipt>, LedgerError> {
        let account = self.account(id)?;
        let mut data = account.lock();
        let periods = Decimal::from(self.policy.interest_periods_per_year.max(1));
        let accrual = round_money(data.balance * data.interest_rate / (dec!(100) * periods));
        if accrual < self.policy.negligible_interest || accrual <= Decimal::ZERO {
            return Ok(None);
        }
        let (before, after) = data.post_interest(accrual)?;
        let tx_id = self.journal.next_id();
        self.journal.append(Arc::new(TransactionRecord::new(
            tx_id,
            id,
            TransactionKind::Interest,
            accrual,
            before,
            after,
            None,
            Some(format!("interest {period}")),
        )))?;
        Ok(Some(TxReceipt {
            transaction: tx_id,
            balance: after,
        }))
    }

    /// Transitions active accounts with no customer-initiated movement in
    /// the trailing [`Policy::dormancy_after_days`] window to dormant, with
    /// an audit entry per transition. Fixed deposits never go dormant.
    ///
    /// Naturally idempotent: an account already dormant leaves the eligible
    /// set, so re-running for the same `as_of` is harmless.
    pub fn mark_dormant(&self, as_of: DateTime<Utc>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let window = Duration::days(self.policy.dormancy_after_days);

        let mut ids: Vec<AccountId> = self.accounts.iter().map(|entry| entry.id()).collect();
        ids.sort_unstable();

        let chunk_size = self.policy.batch_chunk_size.max(1);
        for chunk in ids.chunks(chunk_size) {
            for &id in chunk {
                outcome.processed += 1;
                let Ok(account) = self.account(id) else {
                    outcome.failed += 1;
                    continue;
                };
                let mut data = account.lock();
                let idle = data.status == AccountStatus::Active
                    && data.account_type != AccountType::FixedDeposit
                    && as_of.signed_duration_since(data.last_activity) >= window;
                if !idle {
                    outcome.skipped += 1;
                    continue;
                }
                data.status = AccountStatus::Dormant;
                drop(data);
                self.audit.record(
                    id,
                    AuditKind::StatusChanged,
                    format!(
                        "dormant after {} days without activity",
                        self.policy.dormancy_after_days
                    ),
                );
                outcome.succeeded += 1;
            }
            debug!(through = chunk.last().map(|id| id.0), "dormancy chunk committed");
        }

        info!(?outcome, "dormancy marking finished");
        outcome
    }
}

impl LoanBook {
    /// Adds a late penalty to every active loan whose due date has passed.
    ///
    /// The penalty is a percentage of the EMI tiered by days overdue (see
    /// [`Policy::penalty_rate`]) and lands on the outstanding balance. One
    /// loan's failure is logged and isolated. Runs at most once per `as_of`
    /// date; an interrupted run resumes after the last committed chunk.
    pub fn apply_overdue_penalties(&self, as_of: NaiveDate, policy: &Policy) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let period = as_of.to_string();
        let marker = self
            .penalty_markers
            .get(&period)
            .map(|m| *m)
            .unwrap_or_default();

        let mut ids: Vec<LoanId> = self
            .loans
            .iter()
            .filter(|entry| entry.value().status() == LoanStatus::Active)
            .map(|entry| entry.id())
            .collect();
        ids.sort_unstable();

        if marker.is_complete() {
            outcome.processed = ids.len();
            outcome.skipped = ids.len();
            info!(%as_of, "penalty run already completed for this date");
            return outcome;
        }

        let chunk_size = policy.batch_chunk_size.max(1);
        for chunk in ids.chunks(chunk_size) {
            for &id in chunk {
                outcome.processed += 1;
                if marker.covers(id.0) {
                    outcome.skipped += 1;
                    continue;
                }
                match self.apply_penalty(id, as_of, policy) {
                    Ok(Some(_)) => outcome.succeeded += 1,
                    Ok(None) => outcome.skipped += 1,
                    Err(error) => {
                        warn!(loan = %id, %error, "penalty application failed, continuing");
                        outcome.failed += 1;
                    }
                }
            }
            if let Some(last) = chunk.last() {
                self.penalty_markers
                    .insert(period.clone(), PeriodMarker::up_to(last.0));
                debug!(%as_of, through = last.0, "penalty chunk committed");
            }
        }

        self.penalty_markers
            .insert(period, PeriodMarker::complete());
        info!(%as_of, ?outcome, "penalty run finished");
        outcome
    }

    fn apply_penalty(
        &self,
        id: LoanId,
        as_of: NaiveDate,
        policy: &Policy,
    ) -> Result<Option<Decimal>, LedgerError> {
        let loan = self.loan(id)?;
        let mut data = loan.lock();
        if data.status != LoanStatus::Active {
            return Ok(None);
        }
        let Some(due) = data.next_due else {
            return Err(LedgerError::Unexpected(format!(
                "active loan {id} has no due date"
            )));
        };
        let days_overdue = as_of.signed_duration_since(due).num_days();
        let rate = policy.penalty_rate(days_overdue);
        if rate <= Decimal::ZERO {
            return Ok(None);
        }
        let penalty = round_money(data.emi * rate / dec!(100));
        if penalty <= Decimal::ZERO {
            return Ok(None);
        }
        data.outstanding += penalty;
        data.penalties += penalty;
        debug!(loan = %id, days_overdue, %penalty, "late penalty applied");
        Ok(Some(penalty))
    }
}
