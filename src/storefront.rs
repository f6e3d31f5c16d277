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

//! Storefront facade.
//!
//! The [`Storefront`] is what the presentation layer talks to. It wires the
//! user directory, balance resolver, purchase orchestrator and admin service
//! onto one ledger store.
//!
//! # Operations
//!
//! - **Registration**: fetch a wallet's user, creating it on first contact.
//! - **Points**: user plus derived balance.
//! - **Purchases**: redeem points, list by wallet or all.
//! - **Admin**: overwrite purchase status, delivery date and notes.
//!
//! # Thread Safety
//!
//! All operations take `&self`; share the storefront behind an [`Arc`].

use crate::admin::{AdminUpdateService, PurchaseUpdate};
use crate::balance::BalanceResolver;
use crate::base::{RecordId, WalletAddress};
use crate::catalog::{Catalog, Product};
use crate::config::StorefrontConfig;
use crate::error::StorefrontError;
use crate::purchase::{PurchaseOrchestrator, PurchaseReceipt, PurchaseRequest};
use crate::record::{EntryKind, LedgerEntry, NewLedgerEntry, Purchase, User, fields, timestamp};
use crate::store::{LedgerStore, Query, SortDirection, Table, bounded, to_fields};
use crate::users::{Registration, UserDirectory};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// A user together with the derived balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPoints {
    pub user: User,
    #[serde(with = "crate::record::points")]
    pub points: Decimal,
}

/// Which purchases to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseScope {
    Wallet(WalletAddress),
    All,
}

/// Entry point for the presentation layer.
pub struct Storefront {
    store: Arc<dyn LedgerStore>,
    config: StorefrontConfig,
    users: UserDirectory,
    balances: BalanceResolver,
    purchases: PurchaseOrchestrator,
    admin: AdminUpdateService,
}

fn wallet_param(wallet: &str) -> Result<WalletAddress, StorefrontError> {
    let wallet = wallet.trim();
    if wallet.is_empty() {
        Err(StorefrontError::Validation(
            "wallet address is required".to_string(),
        ))
    } else {
        Ok(WalletAddress::from(wallet))
    }
}

impl Storefront {
    pub fn new(store: Arc<dyn LedgerStore>, config: StorefrontConfig) -> Self {
        let timeout = config.step_timeout;
        Self {
            users: UserDirectory::new(Arc::clone(&store), timeout),
            balances: BalanceResolver::new(Arc::clone(&store), timeout),
            purchases: PurchaseOrchestrator::new(Arc::clone(&store), config.clone()),
            admin: AdminUpdateService::new(Arc::clone(&store), timeout),
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn config(&self) -> &StorefrontConfig {
        &self.config
    }

    pub fn catalog(&self) -> &'static [Product] {
        Catalog.products()
    }

    /// See [`UserDirectory::register_or_fetch`].
    pub async fn register_or_fetch_user(
        &self,
        wallet: &str,
        name: Option<&str>,
    ) -> Result<Registration, StorefrontError> {
        self.users.register_or_fetch(wallet, name).await
    }

    /// Returns the registered user and their balance.
    ///
    /// # Errors
    ///
    /// - [`StorefrontError::Validation`] - Blank wallet address.
    /// - [`StorefrontError::UserNotFound`] - Wallet never registered.
    /// - [`StorefrontError::StoreUnavailable`] - Backend failure.
    pub async fn user_points(&self, wallet: &str) -> Result<UserPoints, StorefrontError> {
        let wallet = wallet_param(wallet)?;
        let user = self
            .users
            .get(&wallet)
            .await?
            .ok_or_else(|| StorefrontError::UserNotFound(wallet.clone()))?;
        let points = self.resolve_balance(&wallet).await?;
        Ok(UserPoints { user, points })
    }

    /// Sum of the wallet's ledger entries; zero when there are none.
    pub async fn resolve_balance(&self, wallet: &WalletAddress) -> Result<Decimal, StorefrontError> {
        self.balances
            .resolve_balance(wallet)
            .await
            .map_err(|e| e.into_unavailable("resolve balance"))
    }

    /// See [`PurchaseOrchestrator::submit_purchase`].
    pub async fn submit_purchase(
        &self,
        request: PurchaseRequest,
    ) -> Result<PurchaseReceipt, StorefrontError> {
        self.purchases.submit_purchase(request).await
    }

    /// Purchases of one wallet, or all of them, newest first.
    ///
    /// Records that cannot be decoded are skipped and logged.
    pub async fn list_purchases(
        &self,
        scope: PurchaseScope,
    ) -> Result<Vec<Purchase>, StorefrontError> {
        let query = match &scope {
            PurchaseScope::Wallet(wallet) => {
                Query::by_field(fields::WALLET_ADDRESS, wallet.as_str())
            }
            PurchaseScope::All => Query::all(),
        }
        .sort(fields::PURCHASE_DATE, SortDirection::Desc);

        let records = bounded(
            self.config.step_timeout,
            self.store.find(Table::Purchases, &query),
        )
        .await
        .map_err(|e| e.into_unavailable("list purchases"))?;

        Ok(records
            .iter()
            .filter_map(|record| match record.decode::<Purchase>() {
                Ok(purchase) => Some(purchase),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed purchase record");
                    None
                }
            })
            .collect())
    }

    /// Fetches one purchase by id.
    pub async fn get_purchase(&self, id: &RecordId) -> Result<Option<Purchase>, StorefrontError> {
        let record = bounded(
            self.config.step_timeout,
            self.store.get(Table::Purchases, id),
        )
        .await
        .map_err(|e| e.into_unavailable("get purchase"))?;
        record
            .map(|r| r.decode())
            .transpose()
            .map_err(|e| e.into_unavailable("decode purchase"))
    }

    /// See [`AdminUpdateService::update_purchase`].
    pub async fn update_purchase(&self, update: PurchaseUpdate) -> Result<Purchase, StorefrontError> {
        self.admin.update_purchase(update).await
    }

    /// Appends a positive credit to the wallet's ledger.
    ///
    /// Points are normally earned outside the storefront; this is the write
    /// path for operators and fixtures.
    pub async fn credit_points(
        &self,
        wallet: &str,
        amount: Decimal,
        kind: EntryKind,
        description: &str,
    ) -> Result<LedgerEntry, StorefrontError> {
        let wallet = wallet_param(wallet)?;
        if amount <= Decimal::ZERO {
            return Err(StorefrontError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }
        let now = timestamp::now();
        let entry = NewLedgerEntry::credit(wallet.clone(), amount, kind, description, now);
        let entry_fields = to_fields(&entry).map_err(|e| e.into_unavailable("encode credit"))?;
        let record = bounded(
            self.config.step_timeout,
            self.store.create(Table::Transactions, entry_fields),
        )
        .await
        .map_err(|e| e.into_unavailable("create credit"))?;

        tracing::info!(wallet = %wallet, %amount, kind = ?kind, "points credited");
        Ok(LedgerEntry {
            id: record.id,
            wallet_address: entry.wallet_address,
            amount: entry.amount,
            kind: entry.kind,
            description: Some(entry.description),
            related_purchase_id: None,
            transaction_date: Some(now),
        })
    }
}
