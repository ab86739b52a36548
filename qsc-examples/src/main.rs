//! Walk through the quantum-safe Key Protect flows
//!
//! Reads `KP_*` settings from the environment (or `.env`), builds a QSC
//! client and runs each flow in turn. A failing flow is logged and the next
//! one still runs.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use anyhow::Result;
use keyprotect_client::{
    init_qsc_client, Aad, CallContext, KeyProtect, KeyProtectClient, PreferReturn, WrappedDek,
};
use keyprotect_config::AppConfig;
use keyprotect_logging::init_console_logging;
use tracing::{error, info};

const DEFAULT_KEY_ID: &str = "1234abcd-abcd-asdf-9eaa-deadbeefabcd";
const SAMPLE_WDEK: &str = "dGhpcyBpc24ndCBhIHJlYWwgcGF5bG9hZAo=";

fn example_aad() -> Aad {
    [
        "AAD can be pretty much any string value.",
        "This entire array of strings is the AAD.",
        "It has to be the same on wrap and unwrap, however",
        "This can be useful, if the DEK should be bound to an application name",
        "or possibly a hostname, IP address, or even email address.",
        "For example",
        "appname=rust-examples;",
        "It is not secret though, so don't put anything sensitive here",
    ]
    .into_iter()
    .collect()
}

async fn create_root_key(client: &KeyProtectClient, ctx: &CallContext) {
    match client.create_root_key(ctx, "mynewrootkey", None).await {
        Ok(key) => info!(key = ?key, "New root key created"),
        Err(e) => error!(error = %e, "Error while creating root key"),
    }
}

async fn create_standard_key(client: &KeyProtectClient, ctx: &CallContext) {
    match client.create_standard_key(ctx, "mynewstandardkey", None).await {
        Ok(key) => info!(key = ?key, "New standard key created"),
        Err(e) => error!(error = %e, "Error while creating standard key"),
    }
}

async fn wrap_create_dek(client: &KeyProtectClient, ctx: &CallContext, key_id: &str) {
    let aad = example_aad();

    // use the DEK for encrypt/decrypt and drop it; keep only the WDEK
    match client.wrap_create_dek(ctx, key_id, Some(&aad)).await {
        Ok((dek, wdek)) => {
            info!(bits = dek.as_bytes().len() * 8, "Created new random DEK");
            info!(wdek = %wdek, "Your WDEK");
        }
        Err(e) => error!(error = %e, "Error while creating a DEK"),
    }
}

async fn unwrap_v2(client: &KeyProtectClient, ctx: &CallContext, key_id: &str) {
    let mut stored = WrappedDek::from(SAMPLE_WDEK);
    let aad = example_aad();

    match client.unwrap_v2(ctx, key_id, &stored, Some(&aad)).await {
        Ok((dek, rewrapped)) => {
            info!(bits = dek.as_bytes().len() * 8, "Unwrapped key successfully");
            if let Some(new_wdek) = rewrapped {
                info!(wdek = %new_wdek, "DEK was rewrapped with a new key version");
                stored = new_wdek;
            }
            info!(wdek = %stored, "WDEK to use on the next unwrap");
        }
        Err(e) => error!(error = %e, "Error while unwrapping DEK"),
    }
}

async fn get_key(client: &KeyProtectClient, ctx: &CallContext, key_id: &str) {
    info!(key_id, "Getting key");
    match client.get_key(ctx, key_id).await {
        Ok(key) => info!(key = ?key, "Key"),
        Err(e) => error!(error = %e, "Get key failed"),
    }
}

async fn delete_key(client: &KeyProtectClient, ctx: &CallContext, key_id: &str) {
    info!(key_id, "Deleting key");
    match client
        .delete_key(ctx, key_id, PreferReturn::Representation)
        .await
    {
        Ok(deleted) => info!(key = ?deleted, "Deleted key"),
        Err(e) => error!(error = %e, "Error while deleting"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = AppConfig::from_env()
        .map(|config| config.log_level().to_string())
        .unwrap_or_else(|_| "info".to_string());
    init_console_logging("qsc-examples", &log_level)?;

    let client = init_qsc_client()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Key Protect client: {}", e))?;

    let key_id = std::env::var("KP_EXAMPLE_KEY_ID").unwrap_or_else(|_| DEFAULT_KEY_ID.to_string());
    let ctx = CallContext::background();

    info!(
        base_url = %client.config().base_url,
        algorithm = ?client.qsc().map(|q| q.algorithm),
        key_id = %key_id,
        "Running QSC examples"
    );

    create_root_key(&client, &ctx).await;
    wrap_create_dek(&client, &ctx, &key_id).await;
    unwrap_v2(&client, &ctx, &key_id).await;
    create_standard_key(&client, &ctx).await;
    get_key(&client, &ctx, &key_id).await;
    delete_key(&client, &ctx, &key_id).await;

    info!("Examples finished");
    Ok(())
}
