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

//! Append-only transaction journal and audit trail.
//!
//! Every balance-affecting event lands here exactly once. Records are
//! immutable after the append; the journal only ever grows.

use crate::base::{AccountId, TransactionId};
use crate::error::LedgerError;
use crate::transaction::TransactionRecord;
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Append-only log of transaction records with a per-account index.
///
/// A [`DashMap`] keyed by transaction id gives O(1) lookup and an atomic
/// guard against id reuse; the per-account index preserves posting order for
/// statements. All operations are safe for concurrent access.
#[derive(Debug, Default)]
pub struct TransactionJournal {
    /// Records indexed by transaction ID.
    entries: DashMap<TransactionId, Arc<TransactionRecord>>,

    /// Transaction IDs per account, in posting order.
    by_account: DashMap<AccountId, Vec<TransactionId>>,

    /// Source of transaction IDs. Starts at 1.
    seq: AtomicU64,
}

impl TransactionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next transaction id.
    pub(crate) fn next_id(&self) -> TransactionId {
        TransactionId(self.seq.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Appends a record. Ids come from [`next_id`](Self::next_id), so a
    /// collision means the journal has been corrupted.
    pub(crate) fn append(&self, record: Arc<TransactionRecord>) -> Result<(), LedgerError> {
        let id = record.id;
        let account = record.account;
        match self.entries.entry(id) {
            Entry::Occupied(_) => Err(LedgerError::Unexpected(format!(
                "duplicate transaction id {id}"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(record);
                self.by_account.entry(account).or_default().push(id);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: TransactionId) -> Option<Arc<TransactionRecord>> {
        self.entries.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// All records for an account, in posting order.
    pub fn for_account(&self, account: AccountId) -> Vec<Arc<TransactionRecord>> {
        let Some(ids) = self.by_account.get(&account) else {
            return Vec::new();
        };
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    AccountOpened,
    StatusChanged,
    TransferReversed,
}

/// Non-monetary event worth keeping a trace of: account openings, status
/// transitions, transfer reversals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub account: AccountId,
    pub kind: AuditKind,
    pub detail: String,
}

/// Lock-free queue of audit events, drained by whoever exports them.
#[derive(Debug, Default)]
pub(crate) struct AuditTrail {
    events: SegQueue<AuditEvent>,
}

impl AuditTrail {
    pub(crate) fn record(&self, account: AccountId, kind: AuditKind, detail: String) {
        self.events.push(AuditEvent {
            at: Utc::now(),
            account,
            kind,
            detail,
        });
    }

    /// Removes and returns all queued events, oldest first.
    pub(crate) fn drain(&self) -> Vec<AuditEvent> {
        let mut drained = Vec::with_capacity(self.events.len());
        while let Some(event) = self.events.pop() {
            drained.push(event);
        }
        drained
    }
}
