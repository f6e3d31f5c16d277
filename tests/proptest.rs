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

//! Property-based tests for balances and purchases.
//!
//! These tests verify invariants that should hold for any ledger contents and
//! any sequence of purchase attempts.

use points_store_rs::store::to_fields;
use points_store_rs::{
    BalanceResolver, EntryKind, MemoryStore, PurchaseRequest, PurchaseStatus, Storefront,
    StorefrontConfig, StorefrontError, Table, WalletAddress,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Helpers
// =============================================================================

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

/// Signed whole-point ledger amount.
fn arb_amount() -> impl Strategy<Value = i64> {
    (-5_000i64..=5_000i64).prop_filter("non-zero", |a| *a != 0)
}

/// Price of one of the catalog products.
fn arb_price() -> impl Strategy<Value = i64> {
    prop::sample::select(vec![300i64, 500, 1000, 2000])
}

fn seed_entries(store: &MemoryStore, wallet: &str, amounts: &[i64]) {
    for amount in amounts {
        let fields = to_fields(&json!({
            "wallet_address": wallet,
            "amount": amount,
            "type": "reward",
        }))
        .unwrap();
        store.insert(Table::Transactions, fields);
    }
}

// =============================================================================
// Balance Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Balance equals the sum of the wallet's entries and ignores other wallets.
    #[test]
    fn balance_is_sum_of_own_entries(
        mine in prop::collection::vec(arb_amount(), 0..20),
        theirs in prop::collection::vec(arb_amount(), 0..20),
    ) {
        let store = Arc::new(MemoryStore::new());
        seed_entries(&store, "0xMINE", &mine);
        seed_entries(&store, "0xTHEIRS", &theirs);
        let resolver = BalanceResolver::new(store, Duration::from_secs(1));

        let balance = block_on(resolver.resolve_balance(&WalletAddress::from("0xMINE"))).unwrap();

        prop_assert_eq!(balance, Decimal::from(mine.iter().sum::<i64>()));
    }

    /// Entry order does not change the balance.
    #[test]
    fn balance_ignores_entry_order(
        amounts in prop::collection::vec(arb_amount(), 1..20),
    ) {
        let forward = Arc::new(MemoryStore::new());
        seed_entries(&forward, "0xABC", &amounts);
        let reversed = Arc::new(MemoryStore::new());
        let mut backwards = amounts.clone();
        backwards.reverse();
        seed_entries(&reversed, "0xABC", &backwards);

        let wallet = WalletAddress::from("0xABC");
        let a = block_on(BalanceResolver::new(forward, Duration::from_secs(1)).resolve_balance(&wallet));
        let b = block_on(BalanceResolver::new(reversed, Duration::from_secs(1)).resolve_balance(&wallet));

        prop_assert_eq!(a, b);
    }
}

// =============================================================================
// Purchase Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A sequence of purchases never overdraws, and every accepted purchase
    /// is paid for by exactly its price.
    #[test]
    fn purchases_never_overdraw(
        credit in 0i64..5_000,
        prices in prop::collection::vec(arb_price(), 1..12),
    ) {
        let outcome = block_on(async {
            let store = Arc::new(MemoryStore::new());
            let storefront = Storefront::new(store.clone(), StorefrontConfig::default());
            storefront.register_or_fetch_user("0xABC", None).await.unwrap();
            if credit > 0 {
                storefront
                    .credit_points("0xABC", Decimal::from(credit), EntryKind::Grant, "seed")
                    .await
                    .unwrap();
            }

            let mut spent = 0i64;
            let mut accepted = 0usize;
            for price in &prices {
                let request =
                    PurchaseRequest::new("0xABC", "prod1", "Product", Decimal::from(*price));
                match storefront.submit_purchase(request).await {
                    Ok(receipt) => {
                        spent += price;
                        accepted += 1;
                        assert_eq!(receipt.new_balance, Decimal::from(credit - spent));
                        assert_eq!(receipt.purchase.status, PurchaseStatus::Pending);
                    }
                    Err(StorefrontError::InsufficientFunds { balance, price: asked }) => {
                        assert!(balance < asked);
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            let balance = storefront
                .resolve_balance(&WalletAddress::from("0xABC"))
                .await
                .unwrap();
            (balance, spent, accepted, store.len(Table::Purchases))
        });

        let (balance, spent, accepted, purchases) = outcome;
        prop_assert!(balance >= Decimal::ZERO);
        prop_assert_eq!(balance, Decimal::from(credit - spent));
        prop_assert_eq!(purchases, accepted);
    }

    /// Non-positive or fractional prices are rejected before any write.
    #[test]
    fn invalid_prices_write_nothing(
        cents in -100_000i64..100_000,
    ) {
        let price = Decimal::new(cents, 2);
        prop_assume!(price <= Decimal::ZERO || !price.fract().is_zero());

        let (result, written) = block_on(async {
            let store = Arc::new(MemoryStore::new());
            let storefront = Storefront::new(store.clone(), StorefrontConfig::default());
            storefront.register_or_fetch_user("0xABC", None).await.unwrap();
            let result = storefront
                .submit_purchase(PurchaseRequest::new("0xABC", "prod1", "Product", price))
                .await;
            (result, store.len(Table::Purchases) + store.len(Table::Transactions))
        });

        prop_assert!(matches!(result, Err(StorefrontError::Validation(_))));
        prop_assert_eq!(written, 0);
    }

    /// Only the four lowercase status names parse.
    #[test]
    fn unknown_status_names_are_rejected(name in "[a-zA-Z]{1,12}") {
        let known = ["pending", "processing", "delivered", "cancelled"];
        prop_assert_eq!(
            name.parse::<PurchaseStatus>().is_ok(),
            known.contains(&name.as_str())
        );
    }
}
