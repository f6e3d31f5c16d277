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

//! Ledger store interface.
//!
//! The store is record oriented: every table holds [`Record`]s made of a
//! generated id and a bag of JSON fields. It offers no joins and no multi-row
//! atomic commit; callers that need consistency across tables build it
//! themselves (see [`crate::purchase`]).
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`]: process-local tables, used in tests and development.
//! - [`AirtableStore`]: the Airtable REST API.

pub mod airtable;
pub mod memory;

use crate::base::RecordId;
use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use std::future::Future;
use std::time::Duration;

pub use airtable::{AirtableConfig, AirtableStore};
pub use memory::MemoryStore;

/// Field bag of a stored record.
pub type Fields = serde_json::Map<String, Value>;

/// Tables the storefront uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Purchases,
    Transactions,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Users, Table::Purchases, Table::Transactions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Purchases => "purchases",
            Table::Transactions => "transactions",
        }
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub fields: Fields,
}

impl Record {
    /// Decodes the record into a typed value.
    ///
    /// The record id is exposed to the target type as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.0.clone()));
        serde_json::from_value(Value::Object(fields)).map_err(|e| StoreError::Malformed {
            id: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Serializes a value into a field bag.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::Backend(format!(
            "expected an object of fields, got {other}"
        ))),
        Err(e) => Err(StoreError::Backend(e.to_string())),
    }
}

/// Equality predicate on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Selection passed to [`LedgerStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<Filter>,
    pub limit: Option<usize>,
    pub sort: Option<Sort>,
}

impl Query {
    /// Every record in the table.
    pub fn all() -> Self {
        Self::default()
    }

    /// Records whose `field` equals `value`.
    pub fn by_field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            filter: Some(Filter::eq(field, value)),
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            direction,
        });
        self
    }
}

/// Orders two field values the way the stores sort them.
///
/// Numbers compare numerically, strings lexicographically (RFC 3339
/// timestamps therefore sort chronologically). Missing values sort first.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Record database holding the Users, Purchases and Transactions tables.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns the records matching `query`.
    async fn find(&self, table: Table, query: &Query) -> Result<Vec<Record>, StoreError>;

    /// Fetches one record by id, `None` when absent.
    async fn get(&self, table: Table, id: &RecordId) -> Result<Option<Record>, StoreError>;

    /// Creates a record and returns it with its generated id.
    async fn create(&self, table: Table, fields: Fields) -> Result<Record, StoreError>;

    /// Merges `fields` into an existing record.
    ///
    /// Fields not named are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id does not exist.
    async fn update(&self, table: Table, id: &RecordId, fields: Fields)
    -> Result<Record, StoreError>;

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the id does not exist.
    async fn delete(&self, table: Table, id: &RecordId) -> Result<(), StoreError>;
}

/// Runs one store call under the per-step timeout.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}
