//! Service integration helpers for building clients from the environment
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


use crate::client::KeyProtectClient;
use crate::error::{KeyProtectError, KeyProtectResult};
use keyprotect_config::{AppConfig, ConfigError, QscAlgorithm};
use std::sync::Arc;
use tracing::info;

/// Build a client from an already loaded configuration
pub fn client_from_config(config: &AppConfig) -> KeyProtectResult<Arc<KeyProtectClient>> {
    let mut builder = KeyProtectClient::builder(config.client.clone());
    if let Some(qsc) = config.qsc {
        builder = builder.qsc(qsc);
    }
    Ok(Arc::new(builder.build()?))
}

/// Initialize a client from `KP_*` environment variables
pub fn init_client() -> KeyProtectResult<Arc<KeyProtectClient>> {
    let config = AppConfig::from_env().map_err(config_error)?;

    info!(
        base_url = %config.client.base_url,
        qsc = config.qsc.is_some(),
        "Initializing Key Protect client"
    );

    client_from_config(&config)
}

/// Initialize a quantum-safe client.
///
/// Falls back to Kyber768 when `KP_QSC_ALGORITHM` is not set. An explicit
/// `KP_BASE_URL` is always kept.
pub fn init_qsc_client() -> KeyProtectResult<Arc<KeyProtectClient>> {
    let config = AppConfig::from_env_qsc(QscAlgorithm::Kyber768).map_err(config_error)?;

    info!(
        base_url = %config.client.base_url,
        algorithm = ?config.qsc.map(|q| q.algorithm.as_str()),
        "Initializing quantum-safe Key Protect client"
    );

    client_from_config(&config)
}

fn config_error(err: ConfigError) -> KeyProtectError {
    KeyProtectError::Configuration(err.to_string())
}
