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

//! In-memory ledger store.

use super::{Fields, LedgerStore, Query, Record, SortDirection, Table, compare_values};
use crate::base::RecordId;
use crate::error::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

type Rows = BTreeMap<RecordId, Fields>;

/// Process-local ledger store.
///
/// Each table sits behind its own [`RwLock`]; no lock is held across an
/// await point. Ids are `rec` followed by a zero-padded sequence number, so
/// iteration order is insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<Rows>,
    purchases: RwLock<Rows>,
    transactions: RwLock<Rows>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, table: Table) -> &RwLock<Rows> {
        match table {
            Table::Users => &self.users,
            Table::Purchases => &self.purchases,
            Table::Transactions => &self.transactions,
        }
    }

    fn generate_id(&self) -> RecordId {
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        RecordId(format!("rec{seq:014}"))
    }

    /// Inserts a record without going through the async interface.
    pub fn insert(&self, table: Table, fields: Fields) -> Record {
        let id = self.generate_id();
        self.table(table).write().insert(id.clone(), fields.clone());
        Record { id, fields }
    }

    /// Number of records in a table.
    pub fn len(&self, table: Table) -> usize {
        self.table(table).read().len()
    }

    pub fn is_empty(&self) -> bool {
        Table::ALL.iter().all(|table| self.len(*table) == 0)
    }

    /// Snapshot of a table in insertion order.
    pub fn records(&self, table: Table) -> Vec<Record> {
        self.table(table)
            .read()
            .iter()
            .map(|(id, fields)| Record {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn find(&self, table: Table, query: &Query) -> Result<Vec<Record>, StoreError> {
        let mut records: Vec<Record> = self
            .table(table)
            .read()
            .iter()
            .filter(|(_, fields)| query.filter.as_ref().is_none_or(|f| f.matches(fields)))
            .map(|(id, fields)| Record {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        if let Some(sort) = &query.sort {
            records.sort_by(|a, b| {
                let ordering = compare_values(a.fields.get(&sort.field), b.fields.get(&sort.field));
                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn get(&self, table: Table, id: &RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.table(table).read().get(id).map(|fields| Record {
            id: id.clone(),
            fields: fields.clone(),
        }))
    }

    async fn create(&self, table: Table, fields: Fields) -> Result<Record, StoreError> {
        Ok(self.insert(table, fields))
    }

    async fn update(
        &self,
        table: Table,
        id: &RecordId,
        fields: Fields,
    ) -> Result<Record, StoreError> {
        let mut rows = self.table(table).write();
        let existing = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        existing.extend(fields);
        Ok(Record {
            id: id.clone(),
            fields: existing.clone(),
        })
    }

    async fn delete(&self, table: Table, id: &RecordId) -> Result<(), StoreError> {
        self.table(table)
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}
