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

//! # Points Store
//!
//! This library provides a wallet-gated storefront where users redeem loyalty
//! points for physical products. Users, purchases and an append-only points
//! ledger live in a tabular record store; the balance is never stored and is
//! always derived from the ledger.
//!
//! ## Core Components
//!
//! - [`Storefront`]: Facade used by the HTTP layer
//! - [`PurchaseOrchestrator`]: Purchase saga with compensation on partial failure
//! - [`BalanceResolver`]: Sums a wallet's ledger entries
//! - [`AdminUpdateService`]: Overwrites purchase status, delivery date and notes
//! - [`LedgerStore`]: Record store seam, backed by [`MemoryStore`] or [`AirtableStore`]
//! - [`StorefrontError`]: Error types for storefront operations
//!
//! ## Example
//!
//! ```
//! use points_store_rs::{EntryKind, MemoryStore, PurchaseRequest, Storefront, StorefrontConfig};
//! use rust_decimal_macros::dec;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let storefront = Storefront::new(Arc::new(MemoryStore::new()), StorefrontConfig::default());
//!
//! // Register and credit a wallet
//! storefront.register_or_fetch_user("0xABC", None).await.unwrap();
//! storefront
//!     .credit_points("0xABC", dec!(1000), EntryKind::Reward, "welcome bonus")
//!     .await
//!     .unwrap();
//!
//! // Redeem points for a mug
//! let receipt = storefront
//!     .submit_purchase(PurchaseRequest::new("0xABC", "prod1", "Sirius Premium Mug", dec!(500)))
//!     .await
//!     .unwrap();
//! assert_eq!(receipt.new_balance, dec!(500));
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! Purchases of the same wallet are serialized by default so that two
//! concurrent redemptions cannot both pass the balance check. Different
//! wallets proceed in parallel.

pub mod admin;
pub mod api;
pub mod auth;
mod balance;
mod base;
mod catalog;
pub mod config;
pub mod error;
mod purchase;
pub mod record;
pub mod store;
mod storefront;
mod users;
mod wallet_lock;

pub use admin::{AdminUpdateService, PurchaseUpdate, StatusSummary, write_purchases_csv};
pub use auth::{AdminSessions, AdminToken, AuthError, Scope};
pub use balance::BalanceResolver;
pub use base::{ProductId, RecordId, WalletAddress};
pub use catalog::{Catalog, Product};
pub use config::{AdminConfig, StorefrontConfig};
pub use error::{StoreError, StorefrontError};
pub use purchase::{
    PurchaseOrchestrator, PurchaseReceipt, PurchaseRequest, RECONCILIATION_TARGET, SagaState,
};
pub use record::{EntryKind, LedgerEntry, Purchase, PurchaseStatus, User};
pub use store::{AirtableConfig, AirtableStore, LedgerStore, MemoryStore, Query, Table};
pub use storefront::{PurchaseScope, Storefront, UserPoints};
pub use users::{DEFAULT_USER_NAME, Registration, UserDirectory};
pub use wallet_lock::WalletLocks;
