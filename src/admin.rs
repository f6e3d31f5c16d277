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

//! Admin-side purchase updates.
//!
//! Status changes are direct overwrites: any status can be set from any
//! other. Cancelling does not credit the points back; whether it should is
//! an open product decision.

use crate::base::RecordId;
use crate::error::{StoreError, StorefrontError};
use crate::record::{Purchase, PurchaseStatus, fields};
use crate::store::{Fields, LedgerStore, Table, bounded};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Requested change to one purchase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurchaseUpdate {
    pub purchase_id: String,
    pub status: String,
    /// `YYYY-MM-DD`; blank means "leave unchanged".
    pub delivery_date: Option<String>,
    /// Blank means "leave unchanged".
    pub notes: Option<String>,
}

impl PurchaseUpdate {
    pub fn new(purchase_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            purchase_id: purchase_id.into(),
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn delivery_date(mut self, date: impl Into<String>) -> Self {
        self.delivery_date = Some(date.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    fn into_patch(self) -> Result<(RecordId, Fields), StorefrontError> {
        let id = self.purchase_id.trim();
        if id.is_empty() {
            return Err(StorefrontError::Validation(
                "purchase id is required".to_string(),
            ));
        }
        let status = self.status.trim();
        if status.is_empty() {
            return Err(StorefrontError::Validation("status is required".to_string()));
        }
        let status: PurchaseStatus = status
            .parse()
            .map_err(|e: crate::record::UnknownStatus| StorefrontError::Validation(e.to_string()))?;

        let mut patch = Fields::new();
        patch.insert(
            fields::STATUS.to_string(),
            Value::String(status.as_str().to_string()),
        );

        if let Some(date) = non_blank(self.delivery_date.as_deref()) {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                StorefrontError::Validation(format!(
                    "delivery date '{date}' is not a YYYY-MM-DD date"
                ))
            })?;
            patch.insert(
                fields::DELIVERY_DATE.to_string(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
        }
        if let Some(notes) = non_blank(self.notes.as_deref()) {
            patch.insert(fields::NOTES.to_string(), Value::String(notes.to_string()));
        }

        Ok((RecordId::from(id), patch))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Applies admin updates to purchase records.
#[derive(Clone)]
pub struct AdminUpdateService {
    store: Arc<dyn LedgerStore>,
    step_timeout: Duration,
}

impl AdminUpdateService {
    pub fn new(store: Arc<dyn LedgerStore>, step_timeout: Duration) -> Self {
        Self {
            store,
            step_timeout,
        }
    }

    /// Patches status and, when given, delivery date and notes.
    ///
    /// Fields not named in the update are left unchanged. No other record is
    /// touched.
    ///
    /// # Errors
    ///
    /// - [`StorefrontError::Validation`] - Missing id or status, unknown status, bad date.
    ///   Nothing is written.
    /// - [`StorefrontError::NotFound`] - No purchase with this id.
    /// - [`StorefrontError::StoreUnavailable`] - Backend failure.
    pub async fn update_purchase(&self, update: PurchaseUpdate) -> Result<Purchase, StorefrontError> {
        let (id, patch) = update.into_patch()?;

        let record = bounded(
            self.step_timeout,
            self.store.update(Table::Purchases, &id, patch),
        )
        .await
        .map_err(|e| match e {
            StoreError::NotFound(id) => StorefrontError::NotFound(id),
            other => other.into_unavailable("update purchase"),
        })?;

        let purchase: Purchase = record
            .decode()
            .map_err(|e| e.into_unavailable("decode purchase"))?;
        tracing::info!(purchase_id = %purchase.id, status = %purchase.status, "purchase updated");
        Ok(purchase)
    }
}

/// Purchase counts per status, for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub delivered: usize,
    pub cancelled: usize,
}

impl StatusSummary {
    pub fn from_purchases<'a>(purchases: impl IntoIterator<Item = &'a Purchase>) -> Self {
        purchases
            .into_iter()
            .fold(Self::default(), |mut summary, purchase| {
                summary.total += 1;
                match purchase.status {
                    PurchaseStatus::Pending => summary.pending += 1,
                    PurchaseStatus::Processing => summary.processing += 1,
                    PurchaseStatus::Delivered => summary.delivered += 1,
                    PurchaseStatus::Cancelled => summary.cancelled += 1,
                }
                summary
            })
    }
}

/// One exported purchase row.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    wallet_address: &'a str,
    product_id: &'a str,
    product_name: &'a str,
    price: String,
    status: &'static str,
    purchase_date: String,
    delivery_date: String,
    notes: &'a str,
}

/// Write purchases to a CSV writer.
///
/// # CSV Format
///
/// Columns: `id, wallet_address, product_id, product_name, price, status,
/// purchase_date, delivery_date, notes`. Absent optional fields are empty.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_purchases_csv<'a, W: Write>(
    purchases: impl IntoIterator<Item = &'a Purchase>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);

    for purchase in purchases {
        wtr.serialize(CsvRow {
            id: purchase.id.as_str(),
            wallet_address: purchase.wallet_address.as_str(),
            product_id: purchase.product_id.as_str(),
            product_name: &purchase.product_name,
            price: purchase.price.normalize().to_string(),
            status: purchase.status.as_str(),
            purchase_date: crate::record::timestamp::format(&purchase.purchase_date),
            delivery_date: purchase
                .delivery_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            notes: purchase.notes.as_deref().unwrap_or_default(),
        })?;
    }

    wtr.flush()?;
    Ok(())
}
