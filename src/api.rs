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

//! REST API over the [`Storefront`].
//!
//! # Usage
//!
//! ```bash
//! # Register a wallet
//! curl -X POST http://localhost:3000/users \
//!   -H "Content-Type: application/json" \
//!   -d '{"walletAddress": "0xABC", "name": "Ada"}'
//!
//! # Redeem points
//! curl -X POST http://localhost:3000/purchases \
//!   -H "Content-Type: application/json" \
//!   -d '{"walletAddress": "0xABC", "productId": "prod1", "productName": "Sirius Premium Mug", "price": 500}'
//!
//! # Admin: get a token, then list purchases
//! curl -X POST http://localhost:3000/admin/login -d '{"secret": "..."}' -H "Content-Type: application/json"
//! curl http://localhost:3000/admin/purchases -H "Authorization: Bearer <token>"
//! ```

use crate::admin::{PurchaseUpdate, StatusSummary, write_purchases_csv};
use crate::auth::{AdminSessions, AdminToken, AuthError, Scope};
use crate::base::WalletAddress;
use crate::catalog::Product;
use crate::error::StorefrontError;
use crate::purchase::{PurchaseReceipt, PurchaseRequest};
use crate::record::{Purchase, PurchaseStatus, User, timestamp};
use crate::storefront::{PurchaseScope, Storefront, UserPoints};
use crate::users::Registration;
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use thiserror::Error;

// === Request DTOs ===

#[derive(Deserialize)]
struct Points(#[serde(with = "crate::record::points")] Decimal);

fn optional_points<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
    Ok(Option::<Points>::deserialize(deserializer)?.map(|p| p.0))
}

/// Request body for `POST /users`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterUserRequest {
    pub wallet_address: String,
    pub name: Option<String>,
}

/// Request body for `POST /purchases`.
///
/// ```json
/// {"walletAddress": "0xABC", "productId": "prod1", "productName": "Mug", "price": 500}
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseBody {
    pub wallet_address: String,
    pub product_id: String,
    pub product_name: String,
    #[serde(deserialize_with = "optional_points")]
    pub price: Option<Decimal>,
}

impl PurchaseBody {
    fn into_request(self) -> Result<PurchaseRequest, StorefrontError> {
        let price = self
            .price
            .ok_or_else(|| StorefrontError::Validation("price is required".to_string()))?;
        Ok(PurchaseRequest::new(
            self.wallet_address,
            self.product_id,
            self.product_name,
            price,
        ))
    }
}

/// Request body for `POST /admin/login`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub secret: String,
}

/// Request body for `PATCH /admin/purchases`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePurchaseRequest {
    pub purchase_id: String,
    pub status: String,
    pub delivery_date: Option<String>,
    pub notes: Option<String>,
}

impl From<UpdatePurchaseRequest> for PurchaseUpdate {
    fn from(request: UpdatePurchaseRequest) -> Self {
        PurchaseUpdate {
            purchase_id: request.purchase_id,
            status: request.status,
            delivery_date: request.delivery_date,
            notes: request.notes,
        }
    }
}

// === Response DTOs ===

/// User as shown to the frontend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub wallet_address: String,
    pub name: String,
    #[serde(serialize_with = "timestamp::serialize_opt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "timestamp::serialize_opt")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.0,
            wallet_address: user.wallet_address.0,
            name: user.name,
            created_at: user.created_at,
            last_updated: user.last_updated,
        }
    }
}

/// Response body for `POST /users`.
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    pub exists: bool,
    pub user: UserResponse,
}

/// Response body for `GET /users/{wallet}`.
#[derive(Debug, Serialize)]
pub struct UserPointsResponse {
    pub user: UserResponse,
    #[serde(with = "crate::record::points")]
    pub points: Decimal,
}

/// Purchase as shown to the frontend and the admin panel.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub id: String,
    pub wallet_address: String,
    pub product_id: String,
    pub product_name: String,
    #[serde(with = "crate::record::points")]
    pub price: Decimal,
    pub status: PurchaseStatus,
    #[serde(serialize_with = "timestamp::serialize")]
    pub purchase_date: DateTime<Utc>,
    pub delivery_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl From<Purchase> for PurchaseResponse {
    fn from(purchase: Purchase) -> Self {
        Self {
            id: purchase.id.0,
            wallet_address: purchase.wallet_address.0,
            product_id: purchase.product_id.0,
            product_name: purchase.product_name,
            price: purchase.price,
            status: purchase.status,
            purchase_date: purchase.purchase_date,
            delivery_date: purchase.delivery_date,
            notes: purchase.notes,
        }
    }
}

/// Response body for `POST /purchases`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptResponse {
    pub purchase: PurchaseResponse,
    #[serde(with = "crate::record::points")]
    pub new_balance: Decimal,
}

/// Response body for `GET /admin/purchases`.
#[derive(Debug, Serialize)]
pub struct AdminPurchasesResponse {
    pub purchases: Vec<PurchaseResponse>,
    pub summary: StatusSummary,
}

/// Response body for `POST /admin/login`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub scopes: Vec<Scope>,
    pub expires_at: DateTime<Utc>,
}

impl From<AdminToken> for LoginResponse {
    fn from(token: AdminToken) -> Self {
        Self {
            token: token.token,
            scopes: token.scopes,
            expires_at: token.expires_at,
        }
    }
}

/// Response body for errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// === Application State ===

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub storefront: Arc<Storefront>,
    pub sessions: Arc<AdminSessions>,
}

// === Error Handling ===

/// Errors surfaced by the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Storefront(#[from] StorefrontError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("malformed request body: {0}")]
    Body(String),

    #[error("export failed")]
    Export(#[from] csv::Error),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Storefront(e) => match e {
                StorefrontError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                StorefrontError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
                StorefrontError::InsufficientFunds { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "INSUFFICIENT_FUNDS")
                }
                StorefrontError::TransactionFailed { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "TRANSACTION_FAILED")
                }
                StorefrontError::NotFound(_) => (StatusCode::NOT_FOUND, "PURCHASE_NOT_FOUND"),
                StorefrontError::StoreUnavailable => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                }
            },
            ApiError::Auth(AuthError::MissingScope(_)) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::Auth(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Body(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Export(e) => {
                tracing::error!(error = %e, "csv export failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "EXPORT_FAILED")
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

fn authorize(state: &AppState, headers: &HeaderMap, scope: Scope) -> Result<(), AuthError> {
    state.sessions.authorize(bearer_token(headers)?, scope)
}

// === Handlers ===

/// GET /health - Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /products - The product catalog.
async fn list_products(State(state): State<AppState>) -> Json<&'static [Product]> {
    Json(state.storefront.catalog())
}

/// POST /users - Register a wallet, or fetch it if already registered.
async fn register_user(
    State(state): State<AppState>,
    body: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ApiError> {
    let Json(request) = body?;
    let Registration { exists, user } = state
        .storefront
        .register_or_fetch_user(&request.wallet_address, request.name.as_deref())
        .await?;
    let status = if exists {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(RegistrationResponse {
            exists,
            user: user.into(),
        }),
    ))
}

/// GET /users/{wallet} - User with derived points.
async fn get_user(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<UserPointsResponse>, ApiError> {
    let UserPoints { user, points } = state.storefront.user_points(&wallet).await?;
    Ok(Json(UserPointsResponse {
        user: user.into(),
        points,
    }))
}

/// GET /users/{wallet}/purchases - Purchases of one wallet, newest first.
async fn list_user_purchases(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<Vec<PurchaseResponse>>, ApiError> {
    let purchases = state
        .storefront
        .list_purchases(PurchaseScope::Wallet(WalletAddress::from(wallet.trim())))
        .await?;
    Ok(Json(purchases.into_iter().map(Into::into).collect()))
}

/// POST /purchases - Redeem points for a product.
async fn create_purchase(
    State(state): State<AppState>,
    body: Result<Json<PurchaseBody>, JsonRejection>,
) -> Result<(StatusCode, Json<ReceiptResponse>), ApiError> {
    let Json(body) = body?;
    let PurchaseReceipt {
        purchase,
        new_balance,
    } = state.storefront.submit_purchase(body.into_request()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(ReceiptResponse {
            purchase: purchase.into(),
            new_balance,
        }),
    ))
}

/// POST /admin/login - Exchange the admin secret for a bearer token.
async fn admin_login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(request) = body?;
    let token = state.sessions.login(&request.secret, &Scope::ALL)?;
    Ok(Json(token.into()))
}

/// GET /admin/purchases - All purchases with per-status counts.
async fn admin_list_purchases(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AdminPurchasesResponse>, ApiError> {
    authorize(&state, &headers, Scope::ReadPurchases)?;
    let purchases = state.storefront.list_purchases(PurchaseScope::All).await?;
    let summary = StatusSummary::from_purchases(&purchases);
    Ok(Json(AdminPurchasesResponse {
        purchases: purchases.into_iter().map(Into::into).collect(),
        summary,
    }))
}

/// GET /admin/purchases.csv - CSV export of all purchases.
async fn admin_export_purchases(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&state, &headers, Scope::ReadPurchases)?;
    let purchases = state.storefront.list_purchases(PurchaseScope::All).await?;
    let mut body = Vec::new();
    write_purchases_csv(&purchases, &mut body)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"purchases.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

/// PATCH /admin/purchases - Update status, delivery date and notes.
async fn admin_update_purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UpdatePurchaseRequest>, JsonRejection>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    authorize(&state, &headers, Scope::UpdatePurchases)?;
    let Json(request) = body?;
    let purchase = state.storefront.update_purchase(request.into()).await?;
    Ok(Json(purchase.into()))
}

// === Router ===

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/products", get(list_products))
        .route("/users", post(register_user))
        .route("/users/{wallet}", get(get_user))
        .route("/users/{wallet}/purchases", get(list_user_purchases))
        .route("/purchases", post(create_purchase))
        .route("/admin/login", post(admin_login))
        .route(
            "/admin/purchases",
            get(admin_list_purchases).patch(admin_update_purchase),
        )
        .route("/admin/purchases.csv", get(admin_export_purchases))
        .with_state(state)
}
