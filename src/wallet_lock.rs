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

//! Per-wallet serialization of purchases.
//!
//! Closes the overdraft race where two purchases of one wallet both pass the
//! balance check before either debit is written. Purchases of different
//! wallets still run in parallel.

use crate::base::WalletAddress;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Registry = DashMap<WalletAddress, Arc<Mutex<()>>>;

/// Removes the wallet's entry once nobody holds or waits on it.
///
/// Holders and waiters each own a clone of the mutex `Arc`, and clones are
/// only taken under the shard lock, so a count of one means the registry is
/// the last owner.
fn release(locks: &Registry, wallet: &WalletAddress) {
    locks.remove_if(wallet, |_, lock| Arc::strong_count(lock) == 1);
}

/// Registry of one async mutex per wallet.
///
/// Entries are removed when the last guard or waiter for a wallet goes away,
/// including when the purchase future is dropped mid-saga.
#[derive(Debug, Default)]
pub struct WalletLocks {
    locks: Arc<Registry>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `wallet`.
    ///
    /// The guard is owned so it can be held across await points. The DashMap
    /// shard lock is released before awaiting.
    pub async fn acquire(&self, wallet: &WalletAddress) -> WalletGuard {
        // Declared first so it drops after `lock` if this future is cancelled.
        let _waiting = Waiting {
            locks: &self.locks,
            wallet,
        };
        let lock = Arc::clone(
            self.locks
                .entry(wallet.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        WalletGuard {
            guard: Some(lock.lock_owned().await),
            wallet: wallet.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Drops registry entries nobody is holding or waiting on.
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Cleans up after an `acquire` that never got the lock.
struct Waiting<'a> {
    locks: &'a Registry,
    wallet: &'a WalletAddress,
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        release(self.locks, self.wallet);
    }
}

/// Exclusive access to one wallet, released on drop.
#[derive(Debug)]
pub struct WalletGuard {
    guard: Option<OwnedMutexGuard<()>>,
    wallet: WalletAddress,
    locks: Arc<Registry>,
}

impl Drop for WalletGuard {
    fn drop(&mut self) {
        // Unlock first so our clone of the mutex is gone before the count check.
        drop(self.guard.take());
        release(&self.locks, &self.wallet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_wallet_waits_for_release() {
        let locks = Arc::new(WalletLocks::new());
        let wallet = WalletAddress::from("0xABC");
        let guard = locks.acquire(&wallet).await;

        let contender = {
            let locks = Arc::clone(&locks);
            let wallet = wallet.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&wallet).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_wallets_do_not_block() {
        let locks = WalletLocks::new();
        let _a = locks.acquire(&"0xA".into()).await;
        let acquired =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire(&"0xB".into())).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn dropping_the_last_guard_removes_the_entry() {
        let locks = WalletLocks::new();
        let guard = locks.acquire(&"0xA".into()).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_is_queued() {
        let locks = Arc::new(WalletLocks::new());
        let wallet = WalletAddress::from("0xABC");
        let first = locks.acquire(&wallet).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            let wallet = wallet.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&wallet).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn cancelled_purchase_leaves_no_entry() {
        let locks = WalletLocks::new();
        let wallet = WalletAddress::from("0xABC");
        let held = locks.acquire(&wallet).await;

        // A waiter that gives up before getting the lock.
        let gave_up = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&wallet)).await;
        assert!(gave_up.is_err());
        assert_eq!(locks.len(), 1);

        // A holder whose future is dropped mid-work.
        drop(held);
        let abandoned = async {
            let _guard = locks.acquire(&wallet).await;
            std::future::pending::<()>().await;
        };
        let abandoned = tokio::time::timeout(Duration::from_millis(20), abandoned).await;
        assert!(abandoned.is_err());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = WalletLocks::new();
        let held = locks.acquire(&"0xA".into()).await;
        drop(locks.acquire(&"0xB".into()).await);
        locks.prune();
        assert_eq!(locks.len(), 1);
        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
