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

//! User registration and lookup.

use crate::base::WalletAddress;
use crate::error::{StoreError, StorefrontError};
use crate::record::{NewUser, User, fields, timestamp};
use crate::store::{LedgerStore, Query, Table, bounded, to_fields};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Name given to users who register without one.
pub const DEFAULT_USER_NAME: &str = "User";

/// Looks up the user registered under `wallet`.
pub(crate) async fn find_user(
    store: &dyn LedgerStore,
    step_timeout: Duration,
    wallet: &WalletAddress,
) -> Result<Option<User>, StoreError> {
    let query = Query::by_field(fields::WALLET_ADDRESS, wallet.as_str()).limit(1);
    let records = bounded(step_timeout, store.find(Table::Users, &query)).await?;
    records.first().map(|record| record.decode()).transpose()
}

/// Outcome of [`UserDirectory::register_or_fetch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    /// `true` when the wallet was already registered.
    pub exists: bool,
    pub user: User,
}

/// Users table access.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn LedgerStore>,
    step_timeout: Duration,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn LedgerStore>, step_timeout: Duration) -> Self {
        Self {
            store,
            step_timeout,
        }
    }

    /// Returns the user registered under `wallet`, if any.
    pub async fn get(&self, wallet: &WalletAddress) -> Result<Option<User>, StorefrontError> {
        find_user(self.store.as_ref(), self.step_timeout, wallet)
            .await
            .map_err(|e| e.into_unavailable("find user"))
    }

    /// Returns the existing user or registers a new one.
    ///
    /// A blank or missing `name` registers as [`DEFAULT_USER_NAME`]. The name of
    /// an existing user is left as is.
    ///
    /// # Errors
    ///
    /// - [`StorefrontError::Validation`] - Wallet address is blank.
    /// - [`StorefrontError::StoreUnavailable`] - Backend failure.
    pub async fn register_or_fetch(
        &self,
        wallet: &str,
        name: Option<&str>,
    ) -> Result<Registration, StorefrontError> {
        let wallet = wallet.trim();
        if wallet.is_empty() {
            return Err(StorefrontError::Validation(
                "wallet address is required".to_string(),
            ));
        }
        let wallet = WalletAddress::from(wallet);

        if let Some(user) = self.get(&wallet).await? {
            return Ok(Registration { exists: true, user });
        }

        let now = timestamp::now();
        let new_user = NewUser {
            wallet_address: wallet.clone(),
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(DEFAULT_USER_NAME)
                .to_string(),
            created_at: now,
            last_updated: now,
        };
        let fields = to_fields(&new_user).map_err(|e| e.into_unavailable("encode user"))?;
        let record = bounded(self.step_timeout, self.store.create(Table::Users, fields))
            .await
            .map_err(|e| e.into_unavailable("create user"))?;

        tracing::info!(wallet = %wallet, id = %record.id, "user registered");
        Ok(Registration {
            exists: false,
            user: User {
                id: record.id,
                wallet_address: new_user.wallet_address,
                name: new_user.name,
                created_at: Some(now),
                last_updated: Some(now),
            },
        })
    }
}
