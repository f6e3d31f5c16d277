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

//! Integration tests for the purchase saga under store failures.
//!
//! A [`FaultyStore`] wraps the in-memory store and fails selected calls, so
//! the compensation and orphan paths can be driven deterministically.

use async_trait::async_trait;
use points_store_rs::store::{Fields, Record, to_fields};
use points_store_rs::{
    EntryKind, LedgerStore, MemoryStore, PurchaseRequest, PurchaseStatus, Query, RecordId,
    StoreError, Storefront, StorefrontConfig, StorefrontError, Table, WalletAddress,
};
use rust_decimal_macros::dec;
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

// === Test Store ===

#[derive(Default)]
struct FaultyStore {
    inner: MemoryStore,
    fail_transaction_create: AtomicBool,
    fail_transaction_find: AtomicBool,
    /// Makes ledger reads sleep past any short step timeout.
    stall_transaction_find: AtomicBool,
    /// Number of purchase deletes that fail before one goes through.
    failing_purchase_deletes: AtomicU32,
    purchase_deletes: AtomicU32,
    /// Delay applied to purchase creation.
    slow_purchase_create: Option<Duration>,
    /// Delay applied to every find, to interleave concurrent purchases.
    find_delay: Option<Duration>,
}

impl FaultyStore {
    fn backend_error() -> StoreError {
        StoreError::Backend("injected failure".to_string())
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn find(&self, table: Table, query: &Query) -> Result<Vec<Record>, StoreError> {
        if let Some(delay) = self.find_delay {
            tokio::time::sleep(delay).await;
        }
        if table == Table::Transactions && self.stall_transaction_find.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        if table == Table::Transactions && self.fail_transaction_find.load(Ordering::SeqCst) {
            return Err(Self::backend_error());
        }
        self.inner.find(table, query).await
    }

    async fn get(&self, table: Table, id: &RecordId) -> Result<Option<Record>, StoreError> {
        self.inner.get(table, id).await
    }

    async fn create(&self, table: Table, fields: Fields) -> Result<Record, StoreError> {
        match table {
            Table::Transactions if self.fail_transaction_create.load(Ordering::SeqCst) => {
                Err(Self::backend_error())
            }
            Table::Purchases => {
                if let Some(delay) = self.slow_purchase_create {
                    tokio::time::sleep(delay).await;
                }
                self.inner.create(table, fields).await
            }
            _ => self.inner.create(table, fields).await,
        }
    }

    async fn update(&self, table: Table, id: &RecordId, fields: Fields) -> Result<Record, StoreError> {
        self.inner.update(table, id, fields).await
    }

    async fn delete(&self, table: Table, id: &RecordId) -> Result<(), StoreError> {
        if table == Table::Purchases {
            self.purchase_deletes.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failing_purchase_deletes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_purchase_deletes.store(remaining - 1, Ordering::SeqCst);
                return Err(Self::backend_error());
            }
        }
        self.inner.delete(table, id).await
    }
}

// === Log Capture ===

#[derive(Clone, Default)]
struct LogBuffer(Arc<parking_lot::Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}

// === Helpers ===

async fn seeded(store: Arc<FaultyStore>, config: StorefrontConfig) -> Storefront {
    let storefront = Storefront::new(store, config);
    storefront.register_or_fetch_user("0xABC", None).await.unwrap();
    storefront
        .credit_points("0xABC", dec!(1000), EntryKind::Grant, "seed")
        .await
        .unwrap();
    storefront
}

fn mug() -> PurchaseRequest {
    PurchaseRequest::new("0xABC", "prod1", "Sirius Premium Mug", dec!(500))
}

fn wallet() -> WalletAddress {
    WalletAddress::from("0xABC")
}

// === Tests ===

#[tokio::test]
async fn successful_purchase_debits_balance() {
    let store = Arc::new(FaultyStore::default());
    let storefront = seeded(store.clone(), StorefrontConfig::default()).await;

    let receipt = storefront.submit_purchase(mug()).await.unwrap();

    assert_eq!(receipt.new_balance, dec!(500));
    assert_eq!(receipt.purchase.status, PurchaseStatus::Pending);
    assert_eq!(storefront.resolve_balance(&wallet()).await.unwrap(), dec!(500));
    assert_eq!(store.inner.len(Table::Purchases), 1);
    assert_eq!(store.inner.len(Table::Transactions), 2);
}

#[tokio::test]
async fn failed_debit_is_compensated() {
    let store = Arc::new(FaultyStore::default());
    let storefront = seeded(store.clone(), StorefrontConfig::default()).await;
    store.fail_transaction_create.store(true, Ordering::SeqCst);

    let result = storefront.submit_purchase(mug()).await;

    match result {
        Err(StorefrontError::TransactionFailed {
            purchase_id: Some(_),
            orphaned: false,
        }) => {}
        other => panic!("expected compensated TransactionFailed, got {other:?}"),
    }
    assert_eq!(store.inner.len(Table::Purchases), 0);
    assert_eq!(storefront.resolve_balance(&wallet()).await.unwrap(), dec!(1000));
}

#[tokio::test]
async fn compensation_retries_failed_delete() {
    let store = Arc::new(FaultyStore {
        failing_purchase_deletes: AtomicU32::new(1),
        ..FaultyStore::default()
    });
    let storefront = seeded(store.clone(), StorefrontConfig::default()).await;
    store.fail_transaction_create.store(true, Ordering::SeqCst);

    let result = storefront.submit_purchase(mug()).await;

    assert!(matches!(
        result,
        Err(StorefrontError::TransactionFailed { orphaned: false, .. })
    ));
    assert_eq!(store.purchase_deletes.load(Ordering::SeqCst), 2);
    assert_eq!(store.inner.len(Table::Purchases), 0);
}

#[tokio::test]
async fn failed_compensation_reports_orphan() {
    let (logs, _guard) = capture_logs();
    let store = Arc::new(FaultyStore {
        failing_purchase_deletes: AtomicU32::new(u32::MAX),
        ..FaultyStore::default()
    });
    let storefront = seeded(store.clone(), StorefrontConfig::default()).await;
    store.fail_transaction_create.store(true, Ordering::SeqCst);

    let result = storefront.submit_purchase(mug()).await;

    let purchase_id = match result {
        Err(StorefrontError::TransactionFailed {
            purchase_id: Some(id),
            orphaned: true,
        }) => id,
        other => panic!("expected orphaned TransactionFailed, got {other:?}"),
    };
    assert_eq!(store.purchase_deletes.load(Ordering::SeqCst), 2);

    // The orphan is a pending purchase with no debit; the balance is untouched.
    let purchases = store.inner.records(Table::Purchases);
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].id, purchase_id);
    assert_eq!(storefront.resolve_balance(&wallet()).await.unwrap(), dec!(1000));

    let output = logs.contents();
    let line = output
        .lines()
        .find(|line| line.contains("points_store::reconciliation"))
        .expect("reconciliation log line");
    assert!(line.contains("ERROR"));
    assert!(line.contains(&format!("orphaned_purchase={purchase_id}")));
}

#[tokio::test]
async fn timed_out_purchase_write_fails_without_id() {
    let store = Arc::new(FaultyStore {
        slow_purchase_create: Some(Duration::from_millis(200)),
        ..FaultyStore::default()
    });
    let config = StorefrontConfig {
        step_timeout: Duration::from_millis(20),
        ..StorefrontConfig::default()
    };
    let storefront = seeded(store.clone(), config).await;

    let result = storefront.submit_purchase(mug()).await;

    assert_eq!(
        result,
        Err(StorefrontError::TransactionFailed {
            purchase_id: None,
            orphaned: false,
        })
    );
    assert_eq!(store.inner.len(Table::Transactions), 1);
}

#[tokio::test]
async fn unreadable_ledger_is_unavailable_and_writes_nothing() {
    let store = Arc::new(FaultyStore::default());
    let storefront = seeded(store.clone(), StorefrontConfig::default()).await;
    store.fail_transaction_find.store(true, Ordering::SeqCst);

    let result = storefront.submit_purchase(mug()).await;

    assert_eq!(result, Err(StorefrontError::StoreUnavailable));
    assert_eq!(store.inner.len(Table::Purchases), 0);
    assert_eq!(store.inner.len(Table::Transactions), 1);
}

#[tokio::test]
async fn timed_out_balance_read_fails_the_purchase() {
    let store = Arc::new(FaultyStore::default());
    let config = StorefrontConfig {
        step_timeout: Duration::from_millis(20),
        ..StorefrontConfig::default()
    };
    let storefront = seeded(store.clone(), config).await;
    store.stall_transaction_find.store(true, Ordering::SeqCst);

    let result = storefront.submit_purchase(mug()).await;

    assert_eq!(
        result,
        Err(StorefrontError::TransactionFailed {
            purchase_id: None,
            orphaned: false,
        })
    );
    assert_eq!(store.inner.len(Table::Purchases), 0);
    assert_eq!(store.inner.len(Table::Transactions), 1);
}

#[tokio::test]
async fn externally_written_ledger_rows_count_toward_balance() {
    let store = Arc::new(FaultyStore::default());
    let storefront = seeded(store.clone(), StorefrontConfig::default()).await;
    store.inner.insert(
        Table::Transactions,
        to_fields(&json!({
            "wallet_address": "0xABC",
            "amount": 50,
            "type": "reward",
            "transaction_date": "2024-06-01"
        }))
        .unwrap(),
    );

    assert_eq!(storefront.resolve_balance(&wallet()).await, Ok(dec!(1050)));

    let receipt = storefront.submit_purchase(mug()).await.unwrap();
    assert_eq!(receipt.new_balance, dec!(550));
}

#[tokio::test]
async fn legacy_user_row_can_still_purchase() {
    let store = Arc::new(FaultyStore::default());
    let storefront = Storefront::new(store.clone(), StorefrontConfig::default());
    store.inner.insert(
        Table::Users,
        to_fields(&json!({"wallet_address": "0xOLD", "name": "Legacy"})).unwrap(),
    );
    storefront
        .credit_points("0xOLD", dec!(1000), EntryKind::Grant, "seed")
        .await
        .unwrap();

    let registration = storefront.register_or_fetch_user("0xOLD", None).await.unwrap();
    assert!(registration.exists);
    assert_eq!(registration.user.name, "Legacy");

    let receipt = storefront
        .submit_purchase(PurchaseRequest::new(
            "0xOLD",
            "prod1",
            "Sirius Premium Mug",
            dec!(500),
        ))
        .await
        .unwrap();
    assert_eq!(receipt.new_balance, dec!(500));
    assert_eq!(store.inner.len(Table::Users), 1);
}

#[tokio::test]
async fn insufficient_points_writes_nothing() {
    let store = Arc::new(FaultyStore::default());
    let storefront = seeded(store.clone(), StorefrontConfig::default()).await;

    let result = storefront
        .submit_purchase(PurchaseRequest::new(
            "0xABC",
            "prod4",
            "Sirius Limited Hoodie",
            dec!(2000),
        ))
        .await;

    assert_eq!(
        result,
        Err(StorefrontError::InsufficientFunds {
            balance: dec!(1000),
            price: dec!(2000),
        })
    );
    assert_eq!(store.inner.len(Table::Purchases), 0);
}

#[tokio::test]
async fn concurrent_purchases_of_one_wallet_never_overdraw() {
    let store = Arc::new(FaultyStore {
        find_delay: Some(Duration::from_millis(2)),
        ..FaultyStore::default()
    });
    let storefront = Arc::new(seeded(store.clone(), StorefrontConfig::default()).await);

    let attempts = (0..5).map(|_| {
        let storefront = Arc::clone(&storefront);
        async move { storefront.submit_purchase(mug()).await }
    });
    let results = futures::future::join_all(attempts).await;

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(StorefrontError::InsufficientFunds { .. })))
        .count();
    assert_eq!(succeeded, 2);
    assert_eq!(rejected, 3);
    assert_eq!(storefront.resolve_balance(&wallet()).await.unwrap(), dec!(0));
    assert_eq!(store.inner.len(Table::Purchases), 2);
}
