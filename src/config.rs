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

//! Runtime settings for the storefront and the admin sessions.
//!
//! The server binary fills these from command-line flags and environment
//! variables; library users build them directly.

use std::fmt;
use std::time::Duration;

/// Settings for the purchase workflow.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Upper bound for each ledger store call.
    pub step_timeout: Duration,
    /// Delete attempts made when compensating a half-written purchase.
    pub compensation_attempts: u32,
    /// Run purchases of the same wallet one at a time.
    ///
    /// When off, two concurrent purchases can both pass the balance check.
    pub serialize_wallets: bool,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(10),
            compensation_attempts: 2,
            serialize_wallets: true,
        }
    }
}

/// Settings for admin token issuance.
#[derive(Clone)]
pub struct AdminConfig {
    /// Secret exchanged for a token. `None` disables admin login.
    pub secret: Option<String>,
    /// Lifetime of an issued token.
    pub token_ttl: Duration,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            secret: None,
            token_ttl: Duration::from_secs(3600),
        }
    }
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}
