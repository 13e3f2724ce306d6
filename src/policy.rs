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

//! Operational policy: fees, dormancy window, batch sizing, penalty tiers.
//!
//! These are parameters, not laws. The defaults mirror a conventional retail
//! setup; deployments override them by constructing the ledger with
//! [`Ledger::with_policy`](crate::Ledger::with_policy).

use crate::base::BranchId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// One penalty tier: loans overdue by more than `days_over` days are charged
/// `rate_pct` percent of the EMI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyTier {
    pub days_over: i64,
    pub rate_pct: Decimal,
}

/// Ledger-wide policy knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Flat fee charged when source and destination branches differ.
    /// Intra-branch transfers are free.
    pub inter_branch_fee: Decimal,
    /// Days without customer-initiated activity before an account goes
    /// dormant.
    pub dormancy_after_days: i64,
    /// How many times per year interest accrues (12 = monthly).
    pub interest_periods_per_year: u32,
    /// Accruals below this are skipped rather than posted.
    pub negligible_interest: Decimal,
    /// Batch jobs commit progress after this many records.
    pub batch_chunk_size: usize,
    /// Ordered highest-days-first; the last tier is the catch-all for any
    /// overdue loan.
    pub penalty_tiers: Vec<PenaltyTier>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            inter_branch_fee: dec!(10.00),
            dormancy_after_days: 365,
            interest_periods_per_year: 12,
            negligible_interest: dec!(0.01),
            batch_chunk_size: 100,
            penalty_tiers: vec![
                PenaltyTier {
                    days_over: 90,
                    rate_pct: dec!(5),
                },
                PenaltyTier {
                    days_over: 60,
                    rate_pct: dec!(3),
                },
                PenaltyTier {
                    days_over: 30,
                    rate_pct: dec!(2),
                },
                PenaltyTier {
                    days_over: 0,
                    rate_pct: dec!(1),
                },
            ],
        }
    }
}

impl Policy {
    /// Fee for a transfer between the given branches.
    pub fn transfer_fee(&self, from: BranchId, to: BranchId) -> Decimal {
        if from == to {
            Decimal::ZERO
        } else {
            self.inter_branch_fee
        }
    }

    /// Penalty rate (percent of EMI) for a loan `days_overdue` past due.
    /// Returns zero when the loan is not overdue at all.
    pub fn penalty_rate(&self, days_overdue: i64) -> Decimal {
        if days_overdue <= 0 {
            return Decimal::ZERO;
        }
        self.penalty_tiers
            .iter()
            .find(|tier| days_overdue > tier.days_over)
            .map(|tier| tier.rate_pct)
            .unwrap_or(Decimal::ZERO)
    }
}
