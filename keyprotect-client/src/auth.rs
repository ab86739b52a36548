//! Bearer token providers
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


use crate::error::{KeyProtectError, KeyProtectResult};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Tokens this close to expiry are refreshed
const EXPIRY_MARGIN_SECS: i64 = 60;

const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Source of bearer tokens for service calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get a token valid for the next request
    async fn token(&self, http: &reqwest::Client) -> KeyProtectResult<String>;
}

/// A pre-issued bearer token
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _http: &reqwest::Client) -> KeyProtectResult<String> {
        Ok(self.token.clone())
    }
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        now + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

#[derive(Deserialize)]
struct IamTokenResponse {
    access_token: String,
    #[serde(default)]
    expiration: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges an API key for IAM access tokens.
///
/// The access token is reused until shortly before it expires.
pub struct IamTokenProvider {
    api_key: String,
    token_url: String,
    cached: RwLock<Option<CachedToken>>,
}

impl IamTokenProvider {
    pub fn new(api_key: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            token_url: token_url.into(),
            cached: RwLock::new(None),
        }
    }

    async fn exchange(&self, http: &reqwest::Client) -> KeyProtectResult<CachedToken> {
        debug!(token_url = %self.token_url, "Requesting IAM access token");

        let response = http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", APIKEY_GRANT_TYPE),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(KeyProtectError::from_transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) if e.is_timeout() => return Err(KeyProtectError::from_transport(e)),
                Err(e) => {
                    debug!(error = %e, "Failed to read IAM error body");
                    String::new()
                }
            };
            warn!(status = status.as_u16(), "IAM token exchange rejected");
            return Err(KeyProtectError::Authentication(format!(
                "IAM token exchange failed ({}): {}",
                status,
                error_text.trim()
            )));
        }

        let body: IamTokenResponse = response.json().await.map_err(|e| {
            KeyProtectError::Authentication(format!("Malformed IAM token response: {}", e))
        })?;

        let now = chrono::Utc::now().timestamp();
        let expires_at = body
            .expiration
            .or_else(|| body.expires_in.map(|secs| now + secs))
            .unwrap_or(now);

        Ok(CachedToken {
            access_token: body.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenProvider for IamTokenProvider {
    async fn token(&self, http: &reqwest::Client) -> KeyProtectResult<String> {
        let now = chrono::Utc::now().timestamp();
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut slot = self.cached.write().await;
        // another caller may have refreshed while we waited
        if let Some(cached) = slot.as_ref() {
            if cached.is_fresh(now) {
                return Ok(cached.access_token.clone());
            }
        }

        let fresh = self.exchange(http).await?;
        let token = fresh.access_token.clone();
        *slot = Some(fresh);
        Ok(token)
    }
}
