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

//! Admin session tokens.
//!
//! The admin secret is exchanged once for an opaque bearer token that carries
//! a set of [`Scope`]s and an expiry. Admin routes then check the token, not
//! the secret.

use crate::config::AdminConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Capability granted by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    ReadPurchases,
    UpdatePurchases,
}

impl Scope {
    pub const ALL: [Scope; 2] = [Scope::ReadPurchases, Scope::UpdatePurchases];
}

/// Token handed to the admin client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminToken {
    pub token: String,
    pub scopes: Vec<Scope>,
    pub expires_at: DateTime<Utc>,
}

/// Admin authentication failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("admin login is disabled")]
    LoginDisabled,

    #[error("invalid admin secret")]
    InvalidSecret,

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("token lacks the {0:?} scope")]
    MissingScope(Scope),
}

#[derive(Debug, Clone)]
struct Session {
    scopes: Vec<Scope>,
    expires_at: DateTime<Utc>,
}

/// Issues and checks admin tokens.
#[derive(Debug)]
pub struct AdminSessions {
    config: AdminConfig,
    sessions: DashMap<String, Session>,
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl AdminSessions {
    pub fn new(config: AdminConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    /// Exchanges the admin secret for a token holding `scopes`.
    pub fn login(&self, secret: &str, scopes: &[Scope]) -> Result<AdminToken, AuthError> {
        let expected = self
            .config
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::LoginDisabled)?;
        if !constant_time_eq(secret.as_bytes(), expected.as_bytes()) {
            tracing::warn!("admin login rejected");
            return Err(AuthError::InvalidSecret);
        }

        self.purge_expired();
        let ttl = chrono::Duration::from_std(self.config.token_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let token = AdminToken {
            token: Uuid::new_v4().simple().to_string(),
            scopes: scopes.to_vec(),
            expires_at: Utc::now() + ttl,
        };
        self.sessions.insert(
            token.token.clone(),
            Session {
                scopes: token.scopes.clone(),
                expires_at: token.expires_at,
            },
        );
        tracing::info!(expires_at = %token.expires_at, scopes = ?token.scopes, "admin token issued");
        Ok(token)
    }

    /// Checks that `token` is live and carries `scope`.
    pub fn authorize(&self, token: &str, scope: Scope) -> Result<(), AuthError> {
        let session = self
            .sessions
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(AuthError::InvalidToken)?;
        if Utc::now() >= session.expires_at {
            self.sessions.remove(token);
            return Err(AuthError::InvalidToken);
        }
        if !session.scopes.contains(&scope) {
            return Err(AuthError::MissingScope(scope));
        }
        Ok(())
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.sessions.retain(|_, session| session.expires_at > now);
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
