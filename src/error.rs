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

//! Error types for storefront operations and the ledger store.
//!
//! [`StoreError`] carries backend detail and stays inside the crate's logs.
//! [`StorefrontError`] is what callers see: descriptive for client faults,
//! generic for backend faults.

use crate::base::{RecordId, WalletAddress};
use rust_decimal::Decimal;
use thiserror::Error;

/// Storefront operation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorefrontError {
    /// Missing or malformed input
    #[error("invalid request: {0}")]
    Validation(String),

    /// Wallet has not registered yet
    #[error("user {0} is not registered")]
    UserNotFound(WalletAddress),

    /// Derived balance is lower than the price
    #[error("insufficient points: balance {balance}, price {price}")]
    InsufficientFunds { balance: Decimal, price: Decimal },

    /// Ledger write failed after the purchase record was written.
    ///
    /// `orphaned` is set when the compensating delete failed as well and the
    /// pending purchase needs manual reconciliation.
    #[error("purchase could not be recorded, please retry")]
    TransactionFailed {
        purchase_id: Option<RecordId>,
        orphaned: bool,
    },

    /// Referenced purchase does not exist
    #[error("purchase {0} not found")]
    NotFound(RecordId),

    /// Backend unreachable or failing
    #[error("ledger store unavailable, please retry")]
    StoreUnavailable,
}

impl StorefrontError {
    /// Returns `true` when the caller can fix the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::UserNotFound(_)
                | Self::InsufficientFunds { .. }
                | Self::NotFound(_)
        )
    }
}

/// Ledger store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with this id in the table
    #[error("record {0} not found")]
    NotFound(RecordId),

    /// Call did not complete within the step timeout
    #[error("store call timed out")]
    Timeout,

    /// Backend rejected the call or could not be reached
    #[error("backend error: {0}")]
    Backend(String),

    /// Stored fields do not match the expected record shape
    #[error("malformed record {id}: {reason}")]
    Malformed { id: RecordId, reason: String },
}

impl StoreError {
    /// Logs the backend detail and collapses it into the generic caller error.
    pub(crate) fn into_unavailable(self, operation: &'static str) -> StorefrontError {
        tracing::error!(operation, error = %self, "ledger store call failed");
        StorefrontError::StoreUnavailable
    }

    /// Like [`StoreError::into_unavailable`], except that a purchase step that
    /// timed out fails the purchase itself.
    pub(crate) fn into_step_failure(self, operation: &'static str) -> StorefrontError {
        match self {
            Self::Timeout => {
                tracing::warn!(operation, "purchase step timed out");
                StorefrontError::TransactionFailed {
                    purchase_id: None,
                    orphaned: false,
                }
            }
            other => other.into_unavailable(operation),
        }
    }
}
