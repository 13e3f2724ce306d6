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

//! Error types for ledger operations.

use crate::account::AccountStatus;
use crate::base::{AccountId, LoanId, TransferId};
use crate::loan::LoanStatus;
use crate::transfer::TransferStatus;
use thiserror::Error;

/// Ledger operation errors.
///
/// Validation errors are returned before any mutation; errors raised after a
/// partial mutation within an atomic unit force a full rollback of that unit,
/// so the caller never observes a partially-applied state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No account exists with the given identifier
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    /// No loan exists with the given identifier
    #[error("loan {0} not found")]
    LoanNotFound(LoanId),

    /// No transfer exists with the given identifier
    #[error("transfer {0} not found")]
    TransferNotFound(TransferId),

    /// The account's status disallows the operation
    #[error("account {account} is {status}")]
    InvalidAccountState {
        account: AccountId,
        status: AccountStatus,
    },

    /// The loan's status disallows the operation
    #[error("loan {loan} is {status}")]
    InvalidLoanState { loan: LoanId, status: LoanStatus },

    /// The transfer's status disallows the operation
    #[error("transfer {transfer} is {status}")]
    InvalidTransferState {
        transfer: TransferId,
        status: TransferStatus,
    },

    /// Amount is zero or negative
    #[error("invalid amount (must be positive)")]
    InvalidAmount,

    /// The operation would take the balance below the account's floor
    /// (minimum balance, less the overdraft limit for current accounts)
    #[error("insufficient available funds")]
    InsufficientFunds,

    /// The operation is not valid for this account or loan type
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Storage or integrity failure
    #[error("ledger integrity failure: {0}")]
    Unexpected(String),
}
