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

//! Point redemption workflow.
//!
//! The ledger store has no multi-row commit, so a purchase is a saga of
//! dependent writes:
//!
//! 1. Look up the user (no writes).
//! 2. Resolve the balance and reject if it does not cover the price.
//! 3. Create the purchase record (`pending`).
//! 4. Create the paired debit entry. On failure, delete the purchase again.
//! 5. Touch the user's `last_updated`. Failure here is logged and ignored.
//!
//! The saga moves through these states:
//!
//! ```text
//!  Started ──► PurchaseWritten ──► TransactionWritten
//!                     │
//!                     └──► CompensationAttempted ──► CompensationOk
//!                                      │
//!                                      └──────────► OrphanDetected
//! ```
//!
//! `OrphanDetected` leaves a pending purchase with no debit behind. It is
//! logged at ERROR under the `points_store::reconciliation` target and is the
//! one outcome that needs an operator.

use crate::balance::BalanceResolver;
use crate::base::{ProductId, RecordId, WalletAddress};
use crate::config::StorefrontConfig;
use crate::error::{StoreError, StorefrontError};
use crate::record::{NewLedgerEntry, NewPurchase, Purchase, PurchaseStatus, fields, timestamp};
use crate::store::{Fields, LedgerStore, Table, bounded, to_fields};
use crate::users::find_user;
use crate::wallet_lock::WalletLocks;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Log target for records that need manual reconciliation.
pub const RECONCILIATION_TARGET: &str = "points_store::reconciliation";

/// Progress of one purchase saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Started,
    PurchaseWritten,
    TransactionWritten,
    CompensationAttempted,
    CompensationOk,
    OrphanDetected,
}

impl SagaState {
    pub fn can_transition_to(self, next: SagaState) -> bool {
        use SagaState::*;
        matches!(
            (self, next),
            (Started, PurchaseWritten)
                | (PurchaseWritten, TransactionWritten)
                | (PurchaseWritten, CompensationAttempted)
                | (CompensationAttempted, CompensationOk)
                | (CompensationAttempted, OrphanDetected)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(
            self,
            SagaState::TransactionWritten | SagaState::CompensationOk | SagaState::OrphanDetected
        )
    }
}

#[derive(Debug)]
struct PurchaseSaga {
    wallet: WalletAddress,
    state: SagaState,
}

impl PurchaseSaga {
    fn start(wallet: WalletAddress) -> Self {
        Self {
            wallet,
            state: SagaState::Started,
        }
    }

    fn advance(&mut self, next: SagaState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "Invariant violated: saga moved {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(wallet = %self.wallet, from = ?self.state, to = ?next, "purchase saga");
        self.state = next;
    }
}

/// Unvalidated purchase input as it arrives from the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    pub wallet_address: String,
    pub product_id: String,
    pub product_name: String,
    pub price: Decimal,
}

impl PurchaseRequest {
    pub fn new(
        wallet_address: impl Into<String>,
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            product_id: product_id.into(),
            product_name: product_name.into(),
            price,
        }
    }

    fn validate(self) -> Result<Order, StorefrontError> {
        fn required(value: &str, name: &str) -> Result<String, StorefrontError> {
            let value = value.trim();
            if value.is_empty() {
                Err(StorefrontError::Validation(format!("{name} is required")))
            } else {
                Ok(value.to_string())
            }
        }

        let wallet = required(&self.wallet_address, "wallet address")?;
        let product_id = required(&self.product_id, "product id")?;
        let product_name = required(&self.product_name, "product name")?;
        if self.price <= Decimal::ZERO {
            return Err(StorefrontError::Validation(
                "price must be positive".to_string(),
            ));
        }
        if !self.price.fract().is_zero() {
            return Err(StorefrontError::Validation(
                "price must be a whole number of points".to_string(),
            ));
        }

        Ok(Order {
            wallet: WalletAddress(wallet),
            product_id: ProductId(product_id),
            product_name,
            price: self.price.normalize(),
        })
    }
}

/// Validated purchase input.
#[derive(Debug)]
struct Order {
    wallet: WalletAddress,
    product_id: ProductId,
    product_name: String,
    price: Decimal,
}

/// Result of a successful purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub purchase: Purchase,
    /// Balance before the purchase minus the price, computed without
    /// re-reading the ledger.
    #[serde(with = "crate::record::points")]
    pub new_balance: Decimal,
}

/// Executes point redemptions against the ledger store.
pub struct PurchaseOrchestrator {
    store: Arc<dyn LedgerStore>,
    balances: BalanceResolver,
    locks: WalletLocks,
    config: StorefrontConfig,
}

impl PurchaseOrchestrator {
    pub fn new(store: Arc<dyn LedgerStore>, config: StorefrontConfig) -> Self {
        Self {
            balances: BalanceResolver::new(Arc::clone(&store), config.step_timeout),
            store,
            locks: WalletLocks::new(),
            config,
        }
    }

    /// Redeems `price` points of the wallet for a product.
    ///
    /// On success exactly one purchase and one debit entry exist. On any
    /// failure before the debit is written no record persists, except when
    /// compensation itself fails (reported as `orphaned`).
    ///
    /// # Errors
    ///
    /// - [`StorefrontError::Validation`] - Missing field, or price not a positive whole number.
    /// - [`StorefrontError::UserNotFound`] - Wallet never registered.
    /// - [`StorefrontError::InsufficientFunds`] - Balance below price. Nothing written.
    /// - [`StorefrontError::TransactionFailed`] - A step timed out, or the debit could not be written.
    /// - [`StorefrontError::StoreUnavailable`] - Backend failure before any write.
    pub async fn submit_purchase(
        &self,
        request: PurchaseRequest,
    ) -> Result<PurchaseReceipt, StorefrontError> {
        let order = request.validate()?;

        let _guard = if self.config.serialize_wallets {
            Some(self.locks.acquire(&order.wallet).await)
        } else {
            None
        };
        self.execute(order).await
    }

    async fn execute(&self, order: Order) -> Result<PurchaseReceipt, StorefrontError> {
        let timeout = self.config.step_timeout;

        // Step 1: identity
        let user = find_user(self.store.as_ref(), timeout, &order.wallet)
            .await
            .map_err(|e| e.into_step_failure("find user"))?
            .ok_or_else(|| StorefrontError::UserNotFound(order.wallet.clone()))?;

        // Step 2: balance
        let balance = self
            .balances
            .resolve_balance(&order.wallet)
            .await
            .map_err(|e| e.into_step_failure("resolve balance"))?;
        if balance < order.price {
            tracing::info!(
                wallet = %order.wallet,
                %balance,
                price = %order.price,
                "purchase rejected: insufficient points"
            );
            return Err(StorefrontError::InsufficientFunds {
                balance,
                price: order.price,
            });
        }

        // Step 3: purchase record
        let mut saga = PurchaseSaga::start(order.wallet.clone());
        let now = timestamp::now();
        let new_purchase = NewPurchase {
            wallet_address: order.wallet.clone(),
            product_id: order.product_id.clone(),
            product_name: order.product_name.clone(),
            price: order.price,
            status: PurchaseStatus::Pending,
            purchase_date: now,
        };
        let purchase_fields =
            to_fields(&new_purchase).map_err(|e| e.into_unavailable("encode purchase"))?;
        let record = match bounded(timeout, self.store.create(Table::Purchases, purchase_fields))
            .await
        {
            Ok(record) => record,
            Err(StoreError::Timeout) => {
                // The write may still land; there is no id to compensate with.
                tracing::warn!(
                    target: RECONCILIATION_TARGET,
                    wallet = %order.wallet,
                    product_id = %order.product_id,
                    "purchase creation timed out, a pending purchase without debit may exist"
                );
                return Err(StorefrontError::TransactionFailed {
                    purchase_id: None,
                    orphaned: false,
                });
            }
            Err(e) => return Err(e.into_unavailable("create purchase")),
        };
        saga.advance(SagaState::PurchaseWritten);

        let purchase = Purchase {
            id: record.id,
            wallet_address: new_purchase.wallet_address,
            product_id: new_purchase.product_id,
            product_name: new_purchase.product_name,
            price: new_purchase.price,
            status: new_purchase.status,
            purchase_date: now,
            delivery_date: None,
            notes: None,
        };

        // Step 4: paired debit
        let debit = NewLedgerEntry::purchase_debit(&purchase, now);
        let written = match to_fields(&debit) {
            Ok(debit_fields) => {
                bounded(timeout, self.store.create(Table::Transactions, debit_fields)).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::error!(
                wallet = %purchase.wallet_address,
                purchase_id = %purchase.id,
                error = %e,
                "debit entry could not be written, compensating"
            );
            saga.advance(SagaState::CompensationAttempted);
            let compensated = self.compensate(&purchase).await;
            saga.advance(if compensated {
                SagaState::CompensationOk
            } else {
                SagaState::OrphanDetected
            });
            return Err(StorefrontError::TransactionFailed {
                purchase_id: Some(purchase.id),
                orphaned: !compensated,
            });
        }
        saga.advance(SagaState::TransactionWritten);

        // Step 5: best effort
        self.touch_user(&user.id, now).await;

        let new_balance = balance - order.price;
        tracing::info!(
            wallet = %purchase.wallet_address,
            purchase_id = %purchase.id,
            product_id = %purchase.product_id,
            price = %purchase.price,
            %new_balance,
            "purchase completed"
        );
        Ok(PurchaseReceipt {
            purchase,
            new_balance,
        })
    }

    /// Deletes a purchase whose debit failed. Returns `false` if it remains.
    ///
    /// A purchase that is already gone counts as compensated, so a retry after
    /// a delete that timed out but landed is safe.
    async fn compensate(&self, purchase: &Purchase) -> bool {
        let attempts = self.config.compensation_attempts.max(1);
        for attempt in 1..=attempts {
            let deleted = bounded(
                self.config.step_timeout,
                self.store.delete(Table::Purchases, &purchase.id),
            )
            .await;
            match deleted {
                Ok(()) | Err(StoreError::NotFound(_)) => {
                    tracing::warn!(
                        purchase_id = %purchase.id,
                        attempt,
                        "purchase rolled back after failed debit"
                    );
                    return true;
                }
                Err(e) => {
                    tracing::warn!(
                        purchase_id = %purchase.id,
                        attempt,
                        error = %e,
                        "compensating delete failed"
                    );
                }
            }
        }

        tracing::error!(
            target: RECONCILIATION_TARGET,
            orphaned_purchase = %purchase.id,
            wallet = %purchase.wallet_address,
            price = %purchase.price,
            "orphaned pending purchase without debit, manual reconciliation required"
        );
        false
    }

    async fn touch_user(&self, user_id: &RecordId, at: DateTime<Utc>) {
        let mut touch = Fields::new();
        touch.insert(
            fields::LAST_UPDATED.to_string(),
            Value::String(timestamp::format(&at)),
        );
        let updated = bounded(
            self.config.step_timeout,
            self.store.update(Table::Users, user_id, touch),
        )
        .await;
        if let Err(e) = updated {
            tracing::warn!(user_id = %user_id, error = %e, "could not update last_updated");
        }
    }
}
