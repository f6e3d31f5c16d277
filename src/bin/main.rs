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

use clap::{ArgAction, Parser};
use points_store_rs::api::{AppState, create_router};
use points_store_rs::{
    AdminConfig, AdminSessions, AirtableConfig, AirtableStore, LedgerStore, MemoryStore,
    Storefront, StorefrontConfig,
};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Points Store - Redeem loyalty points for products
///
/// Serves the storefront REST API. Records live in Airtable when credentials
/// are given, otherwise in process memory.
#[derive(Parser, Debug)]
#[command(name = "points-store")]
#[command(about = "A wallet-gated points storefront backend", long_about = None)]
struct Args {
    /// Address the HTTP server listens on
    #[arg(long, env = "POINTS_STORE_BIND", default_value = "127.0.0.1:3000")]
    bind: String,

    /// Airtable personal access token
    #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
    airtable_api_key: Option<String>,

    /// Airtable base id
    #[arg(long, env = "AIRTABLE_BASE_ID")]
    airtable_base_id: Option<String>,

    #[arg(long, env = "AIRTABLE_API_URL", default_value = "https://api.airtable.com")]
    airtable_api_url: String,

    #[arg(long, env = "AIRTABLE_USERS_TABLE", default_value = "Users")]
    users_table: String,

    #[arg(long, env = "AIRTABLE_PURCHASES_TABLE", default_value = "Purchases")]
    purchases_table: String,

    #[arg(long, env = "AIRTABLE_TRANSACTIONS_TABLE", default_value = "Transactions")]
    transactions_table: String,

    /// Secret exchanged for admin tokens; admin login is disabled without it
    #[arg(long, env = "ADMIN_SECRET_KEY", hide_env_values = true)]
    admin_secret: Option<String>,

    #[arg(long, env = "ADMIN_TOKEN_TTL_SECS", default_value_t = 3600)]
    admin_token_ttl_secs: u64,

    /// Upper bound for each store call, in milliseconds
    #[arg(long, env = "STEP_TIMEOUT_MS", default_value_t = 10_000)]
    step_timeout_ms: u64,

    /// Delete attempts when rolling back a half-written purchase
    #[arg(long, env = "COMPENSATION_ATTEMPTS", default_value_t = 2)]
    compensation_attempts: u32,

    /// Run purchases of the same wallet one at a time
    #[arg(long, env = "SERIALIZE_WALLETS", default_value_t = true, action = ArgAction::Set)]
    serialize_wallets: bool,
}

impl Args {
    fn storefront_config(&self) -> StorefrontConfig {
        StorefrontConfig {
            step_timeout: Duration::from_millis(self.step_timeout_ms),
            compensation_attempts: self.compensation_attempts,
            serialize_wallets: self.serialize_wallets,
        }
    }

    fn admin_config(&self) -> AdminConfig {
        AdminConfig {
            secret: self.admin_secret.clone().filter(|s| !s.is_empty()),
            token_ttl: Duration::from_secs(self.admin_token_ttl_secs),
        }
    }

    fn airtable_config(&self) -> AirtableConfig {
        AirtableConfig {
            api_url: self.airtable_api_url.clone(),
            api_key: self.airtable_api_key.clone().unwrap_or_default(),
            base_id: self.airtable_base_id.clone().unwrap_or_default(),
            users_table: self.users_table.clone(),
            purchases_table: self.purchases_table.clone(),
            transactions_table: self.transactions_table.clone(),
            ..AirtableConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not found)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let airtable = args.airtable_config();
    let store: Arc<dyn LedgerStore> = if airtable.is_configured() {
        match AirtableStore::new(airtable) {
            Ok(store) => {
                info!(base_id = %store.config().base_id, "using Airtable ledger store");
                Arc::new(store)
            }
            Err(e) => {
                error!(error = %e, "Failed to create Airtable client");
                process::exit(1);
            }
        }
    } else {
        warn!("Airtable credentials not set, records are kept in memory only");
        Arc::new(MemoryStore::new())
    };

    let config = args.storefront_config();
    info!(
        step_timeout_ms = args.step_timeout_ms,
        compensation_attempts = config.compensation_attempts,
        serialize_wallets = config.serialize_wallets,
        "storefront configuration"
    );
    let admin = args.admin_config();
    if admin.secret.is_none() {
        warn!("ADMIN_SECRET_KEY not set, admin login is disabled");
    }

    let state = AppState {
        storefront: Arc::new(Storefront::new(store, config)),
        sessions: Arc::new(AdminSessions::new(admin)),
    };
    let app = create_router(state);

    let listener = match TcpListener::bind(&args.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %args.bind, error = %e, "Failed to bind");
            process::exit(1);
        }
    };
    info!(bind = %args.bind, "Points store API listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
        process::exit(1);
    }
}
