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

//! Airtable-backed ledger store.
//!
//! Talks to the Airtable REST API (`{api_url}/v0/{base_id}/{table}`):
//!
//! | Operation | Request |
//! |-----------|---------|
//! | find | `GET` with `filterByFormula`, `maxRecords`, `sort[0][...]`, `offset` paging |
//! | get | `GET /{id}` |
//! | create | `POST {"records":[{"fields":...}]}` |
//! | update | `PATCH /{id} {"fields":...}` |
//! | delete | `DELETE /{id}` |

use super::{Fields, Filter, LedgerStore, Query, Record, SortDirection, Table};
use crate::base::RecordId;
use crate::error::StoreError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Connection settings for an Airtable base.
#[derive(Clone)]
pub struct AirtableConfig {
    /// API root, `https://api.airtable.com` in production
    pub api_url: String,
    pub api_key: String,
    pub base_id: String,
    pub users_table: String,
    pub purchases_table: String,
    pub transactions_table: String,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.airtable.com".to_string(),
            api_key: String::new(),
            base_id: String::new(),
            users_table: "Users".to_string(),
            purchases_table: "Purchases".to_string(),
            transactions_table: "Transactions".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl AirtableConfig {
    /// Returns `true` when both credentials are present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.base_id.is_empty()
    }

    pub fn table_name(&self, table: Table) -> &str {
        match table {
            Table::Users => &self.users_table,
            Table::Purchases => &self.purchases_table,
            Table::Transactions => &self.transactions_table,
        }
    }
}

// The API key never reaches logs.
impl fmt::Debug for AirtableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirtableConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("base_id", &self.base_id)
            .field("users_table", &self.users_table)
            .field("purchases_table", &self.purchases_table)
            .field("transactions_table", &self.transactions_table)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AirtableRecord {
    id: String,
    #[serde(default)]
    fields: Fields,
}

impl From<AirtableRecord> for Record {
    fn from(record: AirtableRecord) -> Self {
        Record {
            id: RecordId(record.id),
            fields: record.fields,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    records: Vec<AirtableRecord>,
    offset: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewRecord {
    fields: Fields,
}

#[derive(Debug, Serialize)]
struct CreateRequest {
    records: Vec<NewRecord>,
}

#[derive(Debug, Serialize)]
struct PatchRequest {
    fields: Fields,
}

/// Builds an Airtable formula for an equality filter.
///
/// String values are quoted with `"` and `\` escaped so a wallet address can
/// never break out of the literal.
pub fn filter_formula(filter: &Filter) -> String {
    let value = match &filter.value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Bool(true) => "TRUE()".to_string(),
        Value::Bool(false) => "FALSE()".to_string(),
        Value::Null => "BLANK()".to_string(),
        other => other.to_string(),
    };
    format!("{{{}}} = {}", filter.field, value)
}

/// Ledger store backed by an Airtable base.
#[derive(Debug, Clone)]
pub struct AirtableStore {
    client: Client,
    config: AirtableConfig,
}

impl AirtableStore {
    pub fn new(config: AirtableConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AirtableConfig {
        &self.config
    }

    /// URL of a table, or of one record when `id` is given.
    fn url(&self, table: Table, id: Option<&RecordId>) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| StoreError::Backend(format!("invalid api url: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Backend("api url cannot be a base".to_string()))?;
            segments
                .pop_if_empty()
                .push("v0")
                .push(&self.config.base_id)
                .push(self.config.table_name(table));
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StoreError::Timeout
                } else {
                    StoreError::Backend(e.without_url().to_string())
                }
            })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!("airtable responded {status}: {body}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Backend(format!("invalid airtable response: {e}")))
    }

    fn list_params(query: &Query, offset: Option<&str>) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(filter) = &query.filter {
            params.push(("filterByFormula".to_string(), filter_formula(filter)));
        }
        if let Some(limit) = query.limit {
            params.push(("maxRecords".to_string(), limit.to_string()));
        }
        if let Some(sort) = &query.sort {
            params.push(("sort[0][field]".to_string(), sort.field.clone()));
            let direction = match sort.direction {
                SortDirection::Asc => "asc",
                SortDirection::Desc => "desc",
            };
            params.push(("sort[0][direction]".to_string(), direction.to_string()));
        }
        if let Some(offset) = offset {
            params.push(("offset".to_string(), offset.to_string()));
        }
        params
    }
}

#[async_trait]
impl LedgerStore for AirtableStore {
    async fn find(&self, table: Table, query: &Query) -> Result<Vec<Record>, StoreError> {
        let url = self.url(table, None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let params = Self::list_params(query, offset.as_deref());
            let response = self.send(self.client.get(url.clone()).query(&params)).await?;
            let page: ListResponse = Self::read_json(response).await?;
            records.extend(page.records.into_iter().map(Record::from));

            let reached_limit = query.limit.is_some_and(|limit| records.len() >= limit);
            match page.offset {
                Some(next) if !reached_limit => offset = Some(next),
                _ => break,
            }
        }

        if let Some(limit) = query.limit {
            records.truncate(limit);
        }
        tracing::debug!(table = table.as_str(), count = records.len(), "airtable find");
        Ok(records)
    }

    async fn get(&self, table: Table, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let url = self.url(table, Some(id))?;
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let record: AirtableRecord = Self::read_json(response).await?;
        Ok(Some(record.into()))
    }

    async fn create(&self, table: Table, fields: Fields) -> Result<Record, StoreError> {
        let url = self.url(table, None)?;
        let body = CreateRequest {
            records: vec![NewRecord { fields }],
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        let created: ListResponse = Self::read_json(response).await?;
        created
            .records
            .into_iter()
            .next()
            .map(Record::from)
            .ok_or_else(|| StoreError::Backend("airtable create returned no record".to_string()))
    }

    async fn update(
        &self,
        table: Table,
        id: &RecordId,
        fields: Fields,
    ) -> Result<Record, StoreError> {
        let url = self.url(table, Some(id))?;
        let response = self
            .send(self.client.patch(url).json(&PatchRequest { fields }))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.clone()));
        }
        let record: AirtableRecord = Self::read_json(response).await?;
        Ok(record.into())
    }

    async fn delete(&self, table: Table, id: &RecordId) -> Result<(), StoreError> {
        let url = self.url(table, Some(id))?;
        let response = self.send(self.client.delete(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.clone()));
        }
        let _: Value = Self::read_json(response).await?;
        Ok(())
    }
}
