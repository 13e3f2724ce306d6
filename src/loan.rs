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

//! Loan servicing: EMI math, disbursement, payments, outstanding tracking.
//!
//! Loan lifecycle:
//!
//  Pending ──approve──► Approved ──disburse──► Active ──paid off──► Closed
//                                                │
//                                                └──mark_defaulted──► Defaulted
//!
//! The loan book owns loan and payment records. It references accounts but
//! never mutates them directly; disbursement credits the linked account
//! through the ledger's own deposit operation.

use crate::base::{AccountId, CustomerId, LoanId, round_money};
use crate::batch::PeriodMarker;
use crate::engine::{Ledger, TxReceipt};
use crate::error::LedgerError;
use chrono::{Months, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

/// Loan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Active,
    Closed,
    Defaulted,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Active => "active",
            LoanStatus::Closed => "closed",
            LoanStatus::Defaulted => "defaulted",
        };
        f.write_str(s)
    }
}

/// One applied payment, immutable once recorded. `amount` is the portion
/// actually applied (interest + penalty + principal); overpayment beyond the
/// outstanding balance is not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanPayment {
    pub paid_on: NaiveDate,
    pub amount: Decimal,
    pub interest: Decimal,
    pub penalty: Decimal,
    pub principal: Decimal,
}

/// What a payment did to the loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub interest: Decimal,
    pub penalty: Decimal,
    pub principal: Decimal,
    pub outstanding: Decimal,
    pub status: LoanStatus,
}

/// Computes the equated monthly installment for a loan.
///
/// Standard amortization: `P·r·(1+r)^n / ((1+r)^n − 1)` with `r` the monthly
/// rate (`annual_rate / 12 / 100`). A zero rate degenerates to flat division.
/// Deterministic and pure; rounds half-up to two places.
pub fn calculate_emi(
    principal: Decimal,
    annual_rate: Decimal,
    tenure_months: u32,
) -> Result<Decimal, LedgerError> {
    if principal <= Decimal::ZERO || annual_rate < Decimal::ZERO || tenure_months == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    if annual_rate.is_zero() {
        return Ok(round_money(principal / Decimal::from(tenure_months)));
    }
    let monthly_rate = annual_rate / dec!(1200);
    let factor = compound(Decimal::ONE + monthly_rate, tenure_months);
    Ok(round_money(
        principal * monthly_rate * factor / (factor - Decimal::ONE),
    ))
}

/// `base^n` by repeated multiplication. Tenures are small (a few hundred
/// months at most), so the loop beats pulling in a maths feature.
fn compound(base: Decimal, n: u32) -> Decimal {
    let mut acc = Decimal::ONE;
    for _ in 0..n {
        acc *= base;
    }
    acc
}

/// One row of an EMI schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Installment {
    pub number: u32,
    pub due_date: NaiveDate,
    pub emi: Decimal,
    pub interest: Decimal,
    pub principal: Decimal,
    pub remaining: Decimal,
}

/// Lazy, restartable amortization schedule: clone it to restart from the
/// beginning. Yields exactly `tenure_months` rows; the final row's principal
/// absorbs the rounding drift so the remaining balance lands on zero.
#[derive(Debug, Clone)]
pub struct EmiSchedule {
    emi: Decimal,
    monthly_rate: Decimal,
    remaining: Decimal,
    start: NaiveDate,
    tenure: u32,
    next: u32,
}

impl EmiSchedule {
    pub fn emi(&self) -> Decimal {
        self.emi
    }
}

impl Iterator for EmiSchedule {
    type Item = Installment;

    fn next(&mut self) -> Option<Installment> {
        if self.next > self.tenure {
            return None;
        }
        let number = self.next;
        self.next += 1;
        let due_date = self.start + Months::new(number);
        let interest = round_money(self.remaining * self.monthly_rate);

        if number == self.tenure {
            // Final installment: clear whatever is left.
            let principal = self.remaining;
            self.remaining = Decimal::ZERO;
            return Some(Installment {
                number,
                due_date,
                emi: round_money(principal + interest),
                interest,
                principal,
                remaining: Decimal::ZERO,
            });
        }

        let principal = round_money(self.emi - interest).clamp(Decimal::ZERO, self.remaining);
        self.remaining -= principal;
        Some(Installment {
            number,
            due_date,
            emi: self.emi,
            interest,
            principal,
            remaining: self.remaining,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.tenure + 1 - self.next) as usize;
        (left, Some(left))
    }
}

/// Builds the amortization schedule for a loan starting at `start`; the
/// first installment falls due one month later.
pub fn emi_schedule(
    principal: Decimal,
    annual_rate: Decimal,
    tenure_months: u32,
    start: NaiveDate,
) -> Result<EmiSchedule, LedgerError> {
    let emi = calculate_emi(principal, annual_rate, tenure_months)?;
    Ok(EmiSchedule {
        emi,
        monthly_rate: annual_rate / dec!(1200),
        remaining: principal,
        start,
        tenure: tenure_months,
        next: 1,
    })
}

#[derive(Debug)]
pub(crate) struct LoanData {
    pub(crate) id: LoanId,
    pub(crate) customer: CustomerId,
    pub(crate) account: AccountId,
    pub(crate) principal: Decimal,
    pub(crate) annual_rate: Decimal,
    pub(crate) tenure_months: u32,
    pub(crate) emi: Decimal,
    pub(crate) total_paid: Decimal,
    /// Principal not yet repaid, plus accrued penalties. Never negative;
    /// reaching zero closes the loan.
    pub(crate) outstanding: Decimal,
    pub(crate) penalties: Decimal,
    pub(crate) status: LoanStatus,
    pub(crate) next_due: Option<NaiveDate>,
    pub(crate) payments: Vec<LoanPayment>,
}

/// A loan. Like accounts, mutable state sits behind a per-loan mutex.
#[derive(Debug)]
pub struct Loan {
    id: LoanId,
    inner: Mutex<LoanData>,
}

impl Loan {
    pub fn id(&self) -> LoanId {
        self.id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LoanData> {
        self.inner.lock()
    }

    pub fn status(&self) -> LoanStatus {
        self.inner.lock().status
    }

    pub fn outstanding(&self) -> Decimal {
        self.inner.lock().outstanding
    }

    pub fn snapshot(&self) -> LoanSnapshot {
        let data = self.inner.lock();
        LoanSnapshot {
            id: data.id,
            customer: data.customer,
            account: data.account,
            principal: data.principal,
            annual_rate: data.annual_rate,
            tenure_months: data.tenure_months,
            emi: data.emi,
            total_paid: data.total_paid,
            outstanding: data.outstanding,
            penalties: data.penalties,
            status: data.status,
            next_due: data.next_due,
        }
    }

    /// Payments applied so far, oldest first.
    pub fn payments(&self) -> Vec<LoanPayment> {
        self.inner.lock().payments.clone()
    }
}

/// Immutable view of a loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanSnapshot {
    pub id: LoanId,
    pub customer: CustomerId,
    pub account: AccountId,
    pub principal: Decimal,
    pub annual_rate: Decimal,
    pub tenure_months: u32,
    pub emi: Decimal,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    pub penalties: Decimal,
    pub status: LoanStatus,
    pub next_due: Option<NaiveDate>,
}

/// The loan store. Owns loan and payment records exclusively.
#[derive(Debug, Default)]
pub struct LoanBook {
    pub(crate) loans: DashMap<LoanId, Arc<Loan>>,
    pub(crate) penalty_markers: DashMap<String, PeriodMarker>,
    next_loan: AtomicU32,
}

impl LoanBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn loan(&self, id: LoanId) -> Result<Arc<Loan>, LedgerError> {
        self.loans
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(LedgerError::LoanNotFound(id))
    }

    /// Registers a loan application. The EMI is computed and fixed here;
    /// the loan starts pending with the full principal outstanding.
    pub fn open_loan(
        &self,
        customer: CustomerId,
        account: AccountId,
        principal: Decimal,
        annual_rate: Decimal,
        tenure_months: u32,
    ) -> Result<LoanId, LedgerError> {
        let emi = calculate_emi(principal, annual_rate, tenure_months)?;
        let id = LoanId(self.next_loan.fetch_add(1, Ordering::Relaxed) + 1);
        self.loans.insert(
            id,
            Arc::new(Loan {
                id,
                inner: Mutex::new(LoanData {
                    id,
                    customer,
                    account,
                    principal,
                    annual_rate,
                    tenure_months,
                    emi,
                    total_paid: Decimal::ZERO,
                    outstanding: principal,
                    penalties: Decimal::ZERO,
                    status: LoanStatus::Pending,
                    next_due: None,
                    payments: Vec::new(),
                }),
            }),
        );
        info!(loan = %id, %customer, %principal, %emi, "loan application registered");
        Ok(id)
    }

    pub fn approve(&self, id: LoanId, approved_by: &str) -> Result<(), LedgerError> {
        let loan = self.loan(id)?;
        let mut data = loan.lock();
        if data.status != LoanStatus::Pending {
            return Err(LedgerError::InvalidLoanState {
                loan: id,
                status: data.status,
            });
        }
        data.status = LoanStatus::Approved;
        info!(loan = %id, approved_by, "loan approved");
        Ok(())
    }

    /// Pays the principal out into the linked account as a deposit, sets the
    /// loan active, and schedules the first installment one month out — all
    /// atomically: if the account credit fails, the loan stays approved.
    pub fn disburse(
        &self,
        id: LoanId,
        ledger: &Ledger,
        approved_by: &str,
    ) -> Result<TxReceipt, LedgerError> {
        let loan = self.loan(id)?;
        let mut data = loan.lock();
        if data.status != LoanStatus::Approved {
            return Err(LedgerError::InvalidLoanState {
                loan: id,
                status: data.status,
            });
        }
        let receipt = ledger.deposit(
            data.account,
            data.principal,
            &format!("loan {id} disbursement, approved by {approved_by}"),
        )?;
        data.status = LoanStatus::Active;
        data.next_due = Some(Utc::now().date_naive() + Months::new(1));
        info!(loan = %id, account = %data.account, amount = %data.principal, "loan disbursed");
        Ok(receipt)
    }

    /// Applies a payment to an active loan.
    ///
    /// Allocation order: interest for the period (outstanding × monthly
    /// rate), then accrued penalties, then principal. Whatever exceeds the
    /// outstanding balance is left unapplied. A loan whose outstanding hits
    /// zero closes.
    pub fn record_payment(
        &self,
        id: LoanId,
        amount: Decimal,
        paid_on: NaiveDate,
    ) -> Result<PaymentReceipt, LedgerError> {
        let loan = self.loan(id)?;
        let mut data = loan.lock();
        if data.status != LoanStatus::Active {
            return Err(LedgerError::InvalidLoanState {
                loan: id,
                status: data.status,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let monthly_rate = data.annual_rate / dec!(1200);
        let interest_due = round_money(data.outstanding * monthly_rate);
        let interest = interest_due.min(amount);
        let mut remainder = amount - interest;

        let penalty = remainder.min(data.penalties);
        remainder -= penalty;
        data.penalties -= penalty;
        data.outstanding -= penalty;

        let principal = remainder.min(data.outstanding);
        data.outstanding -= principal;

        let applied = interest + penalty + principal;
        data.total_paid += applied;
        data.payments.push(LoanPayment {
            paid_on,
            amount: applied,
            interest,
            penalty,
            principal,
        });

        if data.outstanding.is_zero() {
            data.status = LoanStatus::Closed;
            data.next_due = None;
            info!(loan = %id, "loan fully repaid and closed");
        } else {
            data.next_due = data.next_due.map(|due| due + Months::new(1));
        }

        Ok(PaymentReceipt {
            interest,
            penalty,
            principal,
            outstanding: data.outstanding,
            status: data.status,
        })
    }

    /// Administrative write-off. Active loans only; terminal.
    pub fn mark_defaulted(&self, id: LoanId) -> Result<(), LedgerError> {
        let loan = self.loan(id)?;
        let mut data = loan.lock();
        if data.status != LoanStatus::Active {
            return Err(LedgerError::InvalidLoanState {
                loan: id,
                status: data.status,
            });
        }
        data.status = LoanStatus::Defaulted;
        info!(loan = %id, "loan marked defaulted");
        Ok(())
    }

    pub fn snapshot(&self, id: LoanId) -> Option<LoanSnapshot> {
        self.loans.get(&id).map(|entry| entry.snapshot())
    }

    /// The loan's payment history, oldest first.
    pub fn payments(&self, id: LoanId) -> Result<Vec<LoanPayment>, LedgerError> {
        Ok(self.loan(id)?.payments())
    }

    /// Snapshots of every loan, ordered by id.
    pub fn loans(&self) -> Vec<LoanSnapshot> {
        let mut snapshots: Vec<LoanSnapshot> = self
            .loans
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    pub fn loan_count(&self) -> usize {
        self.loans.len()
    }
}
