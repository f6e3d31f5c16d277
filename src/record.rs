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

//! Typed views of the records kept in the ledger store.
//!
//! Purchases follow a nominal state machine that the admin service does not
//! enforce:
//!
//! ```text
//!  Pending ──► Processing ──► Delivered
//!     │            │
//!     └────────────┴───────► Cancelled
//! ```

use crate::base::{ProductId, RecordId, WalletAddress};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column names used in the store.
pub mod fields {
    pub const WALLET_ADDRESS: &str = "wallet_address";
    pub const NAME: &str = "name";
    pub const CREATED_AT: &str = "created_at";
    pub const LAST_UPDATED: &str = "last_updated";
    pub const PURCHASE_DATE: &str = "purchase_date";
    pub const STATUS: &str = "status";
    pub const DELIVERY_DATE: &str = "delivery_date";
    pub const NOTES: &str = "notes";
}

/// Point amounts are written as JSON numbers and read from numbers or strings.
pub(crate) mod points {
    use rust_decimal::Decimal;
    use rust_decimal::prelude::ToPrimitive;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        if value.fract().is_zero() {
            if let Some(whole) = value.to_i64() {
                return serializer.serialize_i64(whole);
            }
        }
        serializer.serialize_f64(value.to_f64().unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => {
                if let Some(whole) = n.as_i64() {
                    Ok(Decimal::from(whole))
                } else {
                    let float = n
                        .as_f64()
                        .ok_or_else(|| D::Error::custom("amount out of range"))?;
                    Decimal::try_from(float).map_err(D::Error::custom)
                }
            }
            Value::String(s) => s.trim().parse::<Decimal>().map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("expected a number, got {other}"))),
        }
    }
}

/// Timestamps are written like `2024-06-01T10:00:00.000Z` so that string
/// order is chronological order.
pub(crate) mod timestamp {
    use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
    use serde::Serializer;

    /// Current time at the precision kept in the store.
    pub fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn serialize_opt<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Readers for metadata columns that other tools also write.
///
/// These fields never take part in balances or purchase checks, so a value
/// in an unexpected shape reads as `None` instead of failing the record.
pub(crate) mod lenient {
    use crate::base::RecordId;
    use chrono::{DateTime, NaiveDate, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// RFC 3339 timestamps, or `YYYY-MM-DD` dates read as midnight UTC.
    pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|at| at.and_utc())
    }

    pub fn datetime<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => parse_datetime(&s),
            _ => None,
        })
    }

    pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    /// A record id, or the first id of a linked-record list.
    pub fn record_id<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<RecordId>, D::Error> {
        let id = match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Array(ids) => ids.into_iter().find_map(|id| match id {
                Value::String(s) => Some(s),
                _ => None,
            }),
            _ => None,
        };
        Ok(id.filter(|id| !id.trim().is_empty()).map(RecordId))
    }
}

fn default_user_name() -> String {
    "User".to_string()
}

/// A registered wallet.
///
/// The point balance is not part of the record; see [`crate::BalanceResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub wallet_address: WalletAddress,
    #[serde(default = "default_user_name")]
    pub name: String,
    /// Absent on rows created outside the storefront.
    #[serde(
        default,
        serialize_with = "timestamp::serialize_opt",
        deserialize_with = "lenient::datetime"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        serialize_with = "timestamp::serialize_opt",
        deserialize_with = "lenient::datetime"
    )]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Fields written when a user registers.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub wallet_address: WalletAddress,
    pub name: String,
    #[serde(serialize_with = "timestamp::serialize")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "timestamp::serialize")]
    pub last_updated: DateTime<Utc>,
}

/// Fulfilment status of a purchase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    #[default]
    Pending,
    Processing,
    Delivered,
    Cancelled,
}

impl PurchaseStatus {
    pub const ALL: [PurchaseStatus; 4] = [
        PurchaseStatus::Pending,
        PurchaseStatus::Processing,
        PurchaseStatus::Delivered,
        PurchaseStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// `Delivered` and `Cancelled` have no outgoing nominal transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Statuses this one nominally moves to.
    ///
    /// Informational only: the admin service overwrites status directly.
    pub fn nominal_transitions(&self) -> &'static [PurchaseStatus] {
        match self {
            Self::Pending => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Delivered, Self::Cancelled],
            Self::Delivered | Self::Cancelled => &[],
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the four statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown status '{}' (expected pending, processing, delivered or cancelled)",
            self.0
        )
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for PurchaseStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A point redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: RecordId,
    pub wallet_address: WalletAddress,
    pub product_id: ProductId,
    pub product_name: String,
    #[serde(with = "points")]
    pub price: Decimal,
    /// Records written without a status read as pending.
    #[serde(default)]
    pub status: PurchaseStatus,
    #[serde(serialize_with = "timestamp::serialize")]
    pub purchase_date: DateTime<Utc>,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Fields written when a purchase is created.
#[derive(Debug, Clone, Serialize)]
pub struct NewPurchase {
    pub wallet_address: WalletAddress,
    pub product_id: ProductId,
    pub product_name: String,
    #[serde(with = "points")]
    pub price: Decimal,
    pub status: PurchaseStatus,
    #[serde(serialize_with = "timestamp::serialize")]
    pub purchase_date: DateTime<Utc>,
}

/// Ledger entry type tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Debit for a redemption
    Purchase,
    /// Points earned
    Reward,
    /// Manual credit by an operator
    Grant,
    #[default]
    #[serde(other)]
    Other,
}

/// One row of the append-only points ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: RecordId,
    pub wallet_address: WalletAddress,
    /// Signed: negative for debits.
    #[serde(with = "points")]
    pub amount: Decimal,
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::record_id")]
    pub related_purchase_id: Option<RecordId>,
    #[serde(
        default,
        serialize_with = "timestamp::serialize_opt",
        deserialize_with = "lenient::datetime"
    )]
    pub transaction_date: Option<DateTime<Utc>>,
}

/// Fields written for a new ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct NewLedgerEntry {
    pub wallet_address: WalletAddress,
    #[serde(with = "points")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_purchase_id: Option<RecordId>,
    #[serde(serialize_with = "timestamp::serialize")]
    pub transaction_date: DateTime<Utc>,
}

impl NewLedgerEntry {
    /// Debit paired with a purchase.
    pub fn purchase_debit(purchase: &Purchase, at: DateTime<Utc>) -> Self {
        Self {
            wallet_address: purchase.wallet_address.clone(),
            amount: -purchase.price,
            kind: EntryKind::Purchase,
            description: format!("Purchase: {}", purchase.product_name),
            related_purchase_id: Some(purchase.id.clone()),
            transaction_date: at,
        }
    }

    /// Credit of `amount` points.
    pub fn credit(
        wallet_address: WalletAddress,
        amount: Decimal,
        kind: EntryKind,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_address,
            amount,
            kind,
            description: description.into(),
            related_purchase_id: None,
            transaction_date: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Record, to_fields};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn record(id: &str, value: serde_json::Value) -> Record {
        Record {
            id: RecordId::from(id),
            fields: to_fields(&value).unwrap(),
        }
    }

    #[test]
    fn status_parses_exact_lowercase_names() {
        for status in PurchaseStatus::ALL {
            assert_eq!(status.as_str().parse::<PurchaseStatus>(), Ok(status));
        }
        assert!("Delivered".parse::<PurchaseStatus>().is_err());
        assert!("shipped".parse::<PurchaseStatus>().is_err());
    }

    #[test]
    fn terminal_statuses_have_no_transitions() {
        for status in PurchaseStatus::ALL {
            assert_eq!(status.is_terminal(), status.nominal_transitions().is_empty());
        }
        assert!(PurchaseStatus::Pending.nominal_transitions().contains(&PurchaseStatus::Cancelled));
    }

    #[test]
    fn purchase_without_status_reads_as_pending() {
        let purchase: Purchase = record(
            "rec1",
            json!({
                "wallet_address": "0xABC",
                "product_id": "prod1",
                "product_name": "Mug",
                "price": 500,
                "purchase_date": "2024-06-01T10:00:00.000Z"
            }),
        )
        .decode()
        .unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert_eq!(purchase.price, dec!(500));
        assert_eq!(purchase.delivery_date, None);
    }

    #[test]
    fn amounts_accept_floats_and_strings() {
        let entry: LedgerEntry = record(
            "rec2",
            json!({"wallet_address": "0xABC", "amount": -500.0, "type": "purchase"}),
        )
        .decode()
        .unwrap();
        assert_eq!(entry.amount, dec!(-500));
        assert_eq!(entry.kind, EntryKind::Purchase);

        let entry: LedgerEntry = record(
            "rec3",
            json!({"wallet_address": "0xABC", "amount": "12.5", "type": "airdrop"}),
        )
        .decode()
        .unwrap();
        assert_eq!(entry.amount, dec!(12.5));
        assert_eq!(entry.kind, EntryKind::Other);
    }

    #[test]
    fn ledger_metadata_in_foreign_shapes_still_decodes() {
        let entry: LedgerEntry = record(
            "rec4",
            json!({
                "wallet_address": "0xABC",
                "amount": 50,
                "type": "reward",
                "description": 42,
                "related_purchase_id": ["recP"],
                "transaction_date": "2024-06-01"
            }),
        )
        .decode()
        .unwrap();
        assert_eq!(entry.amount, dec!(50));
        assert_eq!(entry.description.as_deref(), Some("42"));
        assert_eq!(entry.related_purchase_id, Some(RecordId::from("recP")));
        assert_eq!(
            entry.transaction_date,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );

        let entry: LedgerEntry = record(
            "rec5",
            json!({
                "wallet_address": "0xABC",
                "amount": 50,
                "transaction_date": "last tuesday"
            }),
        )
        .decode()
        .unwrap();
        assert_eq!(entry.transaction_date, None);
    }

    #[test]
    fn user_without_metadata_columns_decodes() {
        let user: User = record("recU", json!({"wallet_address": "0xOLD", "name": "Legacy"}))
            .decode()
            .unwrap();
        assert_eq!(user.name, "Legacy");
        assert_eq!(user.created_at, None);
        assert_eq!(user.last_updated, None);

        let user: User = record(
            "recV",
            json!({"wallet_address": "0xOLD", "created_at": "2023-01-15", "last_updated": 7}),
        )
        .decode()
        .unwrap();
        assert_eq!(user.name, "User");
        assert_eq!(user.created_at, Some(Utc.with_ymd_and_hms(2023, 1, 15, 0, 0, 0).unwrap()));
        assert_eq!(user.last_updated, None);
    }

    #[test]
    fn purchase_debit_negates_price_and_links_purchase() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let purchase = Purchase {
            id: RecordId::from("recP"),
            wallet_address: WalletAddress::from("0xABC"),
            product_id: ProductId::from("prod1"),
            product_name: "Mug".to_string(),
            price: dec!(500),
            status: PurchaseStatus::Pending,
            purchase_date: at,
            delivery_date: None,
            notes: None,
        };
        let fields = to_fields(&NewLedgerEntry::purchase_debit(&purchase, at)).unwrap();
        assert_eq!(fields["amount"], json!(-500));
        assert_eq!(fields["type"], json!("purchase"));
        assert_eq!(fields["description"], json!("Purchase: Mug"));
        assert_eq!(fields["related_purchase_id"], json!("recP"));
        assert_eq!(fields["transaction_date"], json!("2024-06-01T10:00:00.000Z"));
    }
}
