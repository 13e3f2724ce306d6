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

//! Transfer records.

use crate::base::{self, AccountId, TransactionId, TransferId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transfer lifecycle. `Completed` and `Failed` are terminal except that a
/// completed transfer may later be reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
    Reversed,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Reversed => "reversed",
        };
        f.write_str(s)
    }
}

/// A debit+credit pair between two accounts, plus any fee charged.
///
/// Completed transfers always carry both constituent transaction ids; a
/// failed transfer posted nothing and carries neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub status: TransferStatus,
    pub debit_tx: Option<TransactionId>,
    pub credit_tx: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    /// Human-readable reference, e.g. `TRF-20260315-00000003`.
    pub fn reference(&self) -> String {
        base::transfer_reference(self.id, self.created_at.date_naive())
    }
}

/// Concurrent store of transfer records.
#[derive(Debug, Default)]
pub(crate) struct TransferLog {
    transfers: DashMap<TransferId, Transfer>,
    seq: AtomicU64,
}

impl TransferLog {
    pub(crate) fn next_id(&self) -> TransferId {
        TransferId(self.seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn insert(&self, transfer: Transfer) {
        self.transfers.insert(transfer.id, transfer);
    }

    pub(crate) fn get(&self, id: TransferId) -> Option<Transfer> {
        self.transfers.get(&id).map(|t| t.clone())
    }

    /// Exclusive handle for a status flip; holds the map shard, so keep the
    /// critical section short.
    pub(crate) fn get_mut(&self, id: TransferId) -> Option<RefMut<'_, TransferId, Transfer>> {
        self.transfers.get_mut(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.transfers.len()
    }
}
