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

//! Derived point balances.
//!
//! A wallet's balance is the sum of every ledger entry recorded for it. No
//! counter is stored anywhere, so concurrent writers cannot make it drift.

use crate::base::WalletAddress;
use crate::error::StoreError;
use crate::record::{LedgerEntry, fields};
use crate::store::{LedgerStore, Query, Table, bounded};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Computes spendable balances from the Transactions table.
#[derive(Clone)]
pub struct BalanceResolver {
    store: Arc<dyn LedgerStore>,
    step_timeout: Duration,
}

impl BalanceResolver {
    pub fn new(store: Arc<dyn LedgerStore>, step_timeout: Duration) -> Self {
        Self {
            store,
            step_timeout,
        }
    }

    /// All ledger entries of a wallet, in store order.
    pub async fn entries(&self, wallet: &WalletAddress) -> Result<Vec<LedgerEntry>, StoreError> {
        let query = Query::by_field(fields::WALLET_ADDRESS, wallet.as_str());
        let records = bounded(
            self.step_timeout,
            self.store.find(Table::Transactions, &query),
        )
        .await?;
        records.iter().map(|record| record.decode()).collect()
    }

    /// Sum of all ledger amounts for the wallet.
    ///
    /// Returns zero for a wallet with no entries, registered or not; callers
    /// that care about registration check it separately. Every call
    /// re-aggregates.
    pub async fn resolve_balance(&self, wallet: &WalletAddress) -> Result<Decimal, StoreError> {
        let entries = self.entries(wallet).await?;
        let balance = entries.iter().map(|entry| entry.amount).sum();
        tracing::debug!(wallet = %wallet, entries = entries.len(), %balance, "balance resolved");
        Ok(balance)
    }
}
