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

//! Immutable transaction records.

use crate::base::{self, AccountId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The kind of balance movement a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    Interest,
    Fee,
    Reversal,
}

impl TransactionKind {
    /// Whether this kind increases the balance. `None` for [`Reversal`],
    /// which debits one leg and credits the other.
    ///
    /// [`Reversal`]: TransactionKind::Reversal
    pub fn is_credit(&self) -> Option<bool> {
        match self {
            TransactionKind::Deposit | TransactionKind::TransferIn | TransactionKind::Interest => {
                Some(true)
            }
            TransactionKind::Withdrawal | TransactionKind::TransferOut | TransactionKind::Fee => {
                Some(false)
            }
            TransactionKind::Reversal => None,
        }
    }
}

/// One balance-affecting event, immutable once appended to the journal.
///
/// `balance_after` always equals `balance_before` adjusted by `amount` in the
/// direction of the kind; the constructor asserts this in debug builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub account: AccountId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    /// The other leg of a transfer or reversal pair.
    pub paired_with: Option<TransactionId>,
    pub detail: Option<String>,
    pub posted_at: DateTime<Utc>,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TransactionId,
        account: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        paired_with: Option<TransactionId>,
        detail: Option<String>,
    ) -> Self {
        match kind.is_credit() {
            Some(true) => debug_assert_eq!(balance_after, balance_before + amount),
            Some(false) => debug_assert_eq!(balance_after, balance_before - amount),
            None => debug_assert_eq!((balance_after - balance_before).abs(), amount),
        }
        Self {
            id,
            account,
            kind,
            amount,
            balance_before,
            balance_after,
            paired_with,
            detail,
            posted_at: Utc::now(),
        }
    }

    /// Human-readable reference, e.g. `TXN-20260315-00000017`.
    pub fn reference(&self) -> String {
        base::transaction_reference(self.id, self.posted_at.date_naive())
    }
}
