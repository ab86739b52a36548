//! HTTPS client for the Key Protect API
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


use crate::auth::{IamTokenProvider, TokenProvider};
use crate::context::CallContext;
use crate::error::{KeyProtectError, KeyProtectResult, ServiceError};
use crate::key_types::{
    validate_key_id, validate_key_name, Aad, CreateKeyOptions, Dek, Key, KeyClass,
    ListKeysOptions, PreferReturn, WrappedDek,
};
use crate::kms::KeyProtect;
use crate::wire::{
    decode_dek, encode, KeyCollection, RotateRequest, UnwrapRequest, UnwrapResponse,
    WrapRequest, WrapResponse, KEY_ACTION_MEDIA_TYPE, KEY_MEDIA_TYPE,
};
use async_trait::async_trait;
use keyprotect_config::{ClientConfig, QscConfig};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Instance scoping header
pub const INSTANCE_HEADER: &str = "bluemix-instance";
pub const CORRELATION_HEADER: &str = "Correlation-Id";
pub const KEY_RING_HEADER: &str = "X-Kms-Key-Ring";
/// Advertises the configured quantum-safe algorithm to the service
pub const QSC_ALGORITHM_HEADER: &str = "X-Kms-Qsc-Algorithm";

const PREFER_HEADER: &str = "Prefer";

/// One API call, before authentication and context headers are applied
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<(&'static str, Vec<u8>)>,
    prefer: Option<PreferReturn>,
}

impl ApiRequest {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
            prefer: None,
        }
    }

    fn json<B: Serialize>(mut self, media_type: &'static str, body: &B) -> KeyProtectResult<Self> {
        self.body = Some((media_type, serde_json::to_vec(body)?));
        Ok(self)
    }

    fn prefer(mut self, prefer: PreferReturn) -> Self {
        self.prefer = Some(prefer);
        self
    }

    fn query(mut self, name: &'static str, value: Option<u32>) -> Self {
        if let Some(value) = value {
            self.query.push((name, value.to_string()));
        }
        self
    }
}

fn expect_body<T>(body: Option<T>, operation: &str) -> KeyProtectResult<T> {
    body.ok_or_else(|| {
        KeyProtectError::InvalidResponse(format!("{} returned an empty body", operation))
    })
}

/// Key Protect client.
///
/// Holds only immutable configuration, a pooled HTTP client and the token
/// provider, so it can be cloned and shared across tasks freely.
#[derive(Clone)]
pub struct KeyProtectClient {
    config: ClientConfig,
    qsc: Option<QscConfig>,
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

/// Builder for `KeyProtectClient`
pub struct KeyProtectClientBuilder {
    config: ClientConfig,
    qsc: Option<QscConfig>,
    http: Option<reqwest::Client>,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl KeyProtectClientBuilder {
    /// Select a quantum-safe algorithm
    pub fn qsc(mut self, qsc: QscConfig) -> Self {
        self.qsc = Some(qsc);
        self
    }

    /// Use a caller-built transport instead of the default one.
    ///
    /// The configured timeout is not applied to a caller-built client.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Replace the IAM API-key exchange with another token source
    pub fn token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn build(self) -> KeyProtectResult<KeyProtectClient> {
        self.config
            .validate()
            .map_err(|e| KeyProtectError::Configuration(e.to_string()))?;

        let tokens = match self.tokens {
            Some(tokens) => tokens,
            None => {
                if self.config.api_key.trim().is_empty() {
                    return Err(KeyProtectError::Configuration(
                        "an API key or a token provider is required".to_string(),
                    ));
                }
                Arc::new(IamTokenProvider::new(
                    self.config.api_key.clone(),
                    self.config.token_url.clone(),
                ))
            }
        };

        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(self.config.timeout())
                .build()
                .map_err(|e| {
                    KeyProtectError::Configuration(format!("Failed to create HTTP client: {}", e))
                })?,
        };

        info!(
            base_url = %self.config.base_url,
            instance_id = %self.config.instance_id,
            qsc_algorithm = ?self.qsc.map(|q| q.algorithm.as_str()),
            "Key Protect client created"
        );

        Ok(KeyProtectClient {
            config: self.config,
            qsc: self.qsc,
            http,
            tokens,
        })
    }
}

impl KeyProtectClient {
    pub fn builder(config: ClientConfig) -> KeyProtectClientBuilder {
        KeyProtectClientBuilder {
            config,
            qsc: None,
            http: None,
            tokens: None,
        }
    }

    pub fn new(config: ClientConfig) -> KeyProtectResult<Self> {
        Self::builder(config).build()
    }

    /// Client that negotiates the given quantum-safe algorithm
    pub fn with_qsc(config: ClientConfig, qsc: QscConfig) -> KeyProtectResult<Self> {
        Self::builder(config).qsc(qsc).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn qsc(&self) -> Option<&QscConfig> {
        self.qsc.as_ref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send one request under `ctx`; `None` means the service answered without a body
    async fn send<T: DeserializeOwned>(
        &self,
        ctx: &CallContext,
        request: ApiRequest,
    ) -> KeyProtectResult<Option<T>> {
        ctx.run(async {
            let token = match ctx.auth_token() {
                Some(token) => token.to_string(),
                None => self.tokens.token(&self.http).await?,
            };

            let correlation_id = ctx
                .correlation_id()
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            debug!(
                method = %request.method,
                path = %request.path,
                correlation_id = %correlation_id,
                "Sending Key Protect request"
            );

            let mut builder = self
                .http
                .request(request.method.clone(), self.url(&request.path))
                .bearer_auth(&token)
                .header(INSTANCE_HEADER, self.config.instance_id.as_str())
                .header(CORRELATION_HEADER, correlation_id.as_str())
                .header(ACCEPT, "application/json");

            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            if let Some(ref key_ring) = self.config.key_ring_id {
                builder = builder.header(KEY_RING_HEADER, key_ring.as_str());
            }
            if let Some(qsc) = self.qsc {
                builder = builder.header(QSC_ALGORITHM_HEADER, qsc.algorithm.as_str());
            }
            if let Some(prefer) = request.prefer {
                builder = builder.header(PREFER_HEADER, prefer.header_value());
            }
            if let Some((media_type, body)) = request.body {
                builder = builder.header(CONTENT_TYPE, media_type).body(body);
            }

            let response = builder.send().await.map_err(KeyProtectError::from_transport)?;
            let status = response.status();

            if !status.is_success() {
                let error_text = match response.text().await {
                    Ok(text) => text,
                    Err(e) if e.is_timeout() => return Err(KeyProtectError::from_transport(e)),
                    Err(e) => {
                        debug!(error = %e, status = status.as_u16(), "Failed to read error body");
                        String::new()
                    }
                };
                let err = ServiceError::from_body(status.as_u16(), &error_text, Some(correlation_id));
                warn!(
                    status = err.status,
                    kind = ?err.kind,
                    path = %request.path,
                    correlation_id = ?err.correlation_id,
                    "Key Protect request failed"
                );
                return Err(err.into());
            }

            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }

            let bytes = response
                .bytes()
                .await
                .map_err(KeyProtectError::from_transport)?;
            if bytes.is_empty() {
                return Ok(None);
            }

            Ok(Some(serde_json::from_slice(&bytes)?))
        })
        .await
    }

    /// Create a key of the given class
    pub async fn create_key(
        &self,
        ctx: &CallContext,
        name: &str,
        class: KeyClass,
        options: Option<&CreateKeyOptions>,
    ) -> KeyProtectResult<Key> {
        validate_key_name(name)?;

        let mut key = Key {
            name: name.to_string(),
            resource_type: Some(KEY_MEDIA_TYPE.to_string()),
            extractable: class.extractable(),
            ..Default::default()
        };

        if let Some(options) = options {
            key.description = options.description.clone();
            key.expiration_date = options.expiration;
            if let Some(ref payload) = options.payload {
                if payload.is_empty() {
                    return Err(KeyProtectError::InvalidArgument(
                        "imported key payload must not be empty".to_string(),
                    ));
                }
                key.payload = Some(encode(payload));
            }
        }

        let request = ApiRequest::new(Method::POST, "keys".to_string())
            .prefer(PreferReturn::Representation)
            .json(KEY_MEDIA_TYPE, &KeyCollection::single(key))?;

        let created = expect_body(self.send::<KeyCollection>(ctx, request).await?, "create key")?
            .into_first()?;

        info!(
            key_id = ?created.id,
            name = %created.name,
            class = ?class,
            "Key created"
        );
        Ok(created)
    }

    /// Create a root key from caller-supplied key material
    pub async fn create_imported_root_key(
        &self,
        ctx: &CallContext,
        name: &str,
        payload: &[u8],
        options: Option<&CreateKeyOptions>,
    ) -> KeyProtectResult<Key> {
        let options = options.cloned().unwrap_or_default().with_payload(payload);
        self.create_key(ctx, name, KeyClass::Root, Some(&options)).await
    }

    /// Create a standard key from caller-supplied key material
    pub async fn create_imported_standard_key(
        &self,
        ctx: &CallContext,
        name: &str,
        payload: &[u8],
        options: Option<&CreateKeyOptions>,
    ) -> KeyProtectResult<Key> {
        let options = options.cloned().unwrap_or_default().with_payload(payload);
        self.create_key(ctx, name, KeyClass::Standard, Some(&options)).await
    }

    async fn unwrap_raw(
        &self,
        ctx: &CallContext,
        key_id: &str,
        wrapped: &WrappedDek,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<UnwrapResponse> {
        validate_key_id(key_id)?;
        let ciphertext = wrapped.to_text()?;

        let request = ApiRequest::new(Method::POST, format!("keys/{}/actions/unwrap", key_id))
            .json(KEY_ACTION_MEDIA_TYPE, &UnwrapRequest { ciphertext, aad })?;

        expect_body(self.send(ctx, request).await?, "unwrap")
    }
}

#[async_trait]
impl KeyProtect for KeyProtectClient {
    async fn create_root_key(
        &self,
        ctx: &CallContext,
        name: &str,
        options: Option<&CreateKeyOptions>,
    ) -> KeyProtectResult<Key> {
        self.create_key(ctx, name, KeyClass::Root, options).await
    }

    async fn create_standard_key(
        &self,
        ctx: &CallContext,
        name: &str,
        options: Option<&CreateKeyOptions>,
    ) -> KeyProtectResult<Key> {
        self.create_key(ctx, name, KeyClass::Standard, options).await
    }

    async fn get_key(&self, ctx: &CallContext, key_id: &str) -> KeyProtectResult<Key> {
        validate_key_id(key_id)?;

        let request = ApiRequest::new(Method::GET, format!("keys/{}", key_id));
        expect_body(self.send::<KeyCollection>(ctx, request).await?, "get key")?.into_first()
    }

    async fn list_keys(
        &self,
        ctx: &CallContext,
        options: ListKeysOptions,
    ) -> KeyProtectResult<Vec<Key>> {
        let request = ApiRequest::new(Method::GET, "keys".to_string())
            .query("limit", options.limit)
            .query("offset", options.offset);

        Ok(self
            .send::<KeyCollection>(ctx, request)
            .await?
            .map(|collection| collection.resources)
            .unwrap_or_default())
    }

    async fn delete_key(
        &self,
        ctx: &CallContext,
        key_id: &str,
        prefer: PreferReturn,
    ) -> KeyProtectResult<Option<Key>> {
        validate_key_id(key_id)?;

        let request = ApiRequest::new(Method::DELETE, format!("keys/{}", key_id)).prefer(prefer);
        let body = self.send::<KeyCollection>(ctx, request).await?;

        info!(key_id = key_id, "Key deleted");

        match (prefer, body) {
            // an empty collection still means the delete succeeded
            (PreferReturn::Representation, Some(collection)) => {
                Ok(collection.resources.into_iter().next())
            }
            _ => Ok(None),
        }
    }

    async fn rotate_key(
        &self,
        ctx: &CallContext,
        key_id: &str,
        payload: Option<&[u8]>,
    ) -> KeyProtectResult<()> {
        validate_key_id(key_id)?;

        let body = RotateRequest {
            payload: payload.map(encode),
        };
        let request = ApiRequest::new(Method::POST, format!("keys/{}/actions/rotate", key_id))
            .json(KEY_ACTION_MEDIA_TYPE, &body)?;

        self.send::<serde_json::Value>(ctx, request).await?;
        info!(key_id = key_id, "Key rotated");
        Ok(())
    }

    async fn wrap(
        &self,
        ctx: &CallContext,
        key_id: &str,
        dek: &Dek,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<WrappedDek> {
        validate_key_id(key_id)?;

        let body = WrapRequest {
            plaintext: Some(encode(dek.as_bytes())),
            aad,
        };
        let request = ApiRequest::new(Method::POST, format!("keys/{}/actions/wrap", key_id))
            .json(KEY_ACTION_MEDIA_TYPE, &body)?;

        let response: WrapResponse = expect_body(self.send(ctx, request).await?, "wrap")?;
        Ok(WrappedDek::from(response.ciphertext))
    }

    async fn wrap_create_dek(
        &self,
        ctx: &CallContext,
        key_id: &str,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<(Dek, WrappedDek)> {
        validate_key_id(key_id)?;

        let body = WrapRequest {
            plaintext: None,
            aad,
        };
        let request = ApiRequest::new(Method::POST, format!("keys/{}/actions/wrap", key_id))
            .json(KEY_ACTION_MEDIA_TYPE, &body)?;

        let response: WrapResponse = expect_body(self.send(ctx, request).await?, "wrap")?;
        let plaintext = response.plaintext.ok_or_else(|| {
            KeyProtectError::InvalidResponse("service returned no generated DEK".to_string())
        })?;
        let dek = decode_dek(&plaintext)?;

        debug!(
            key_id = key_id,
            key_version = ?response.key_version.map(|v| v.id),
            "Created new random DEK"
        );
        Ok((dek, WrappedDek::from(response.ciphertext)))
    }

    async fn unwrap(
        &self,
        ctx: &CallContext,
        key_id: &str,
        wrapped: &WrappedDek,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<Dek> {
        let response = self.unwrap_raw(ctx, key_id, wrapped, aad).await?;
        decode_dek(&response.plaintext)
    }

    async fn unwrap_v2(
        &self,
        ctx: &CallContext,
        key_id: &str,
        wrapped: &WrappedDek,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<(Dek, Option<WrappedDek>)> {
        let response = self.unwrap_raw(ctx, key_id, wrapped, aad).await?;
        let dek = decode_dek(&response.plaintext)?;

        let rewrapped = response
            .rewrapped_ciphertext
            .filter(|ciphertext| !ciphertext.is_empty())
            .map(WrappedDek::from);

        if rewrapped.is_some() {
            info!(
                key_id = key_id,
                from_version = ?response.key_version.map(|v| v.id),
                to_version = ?response.rewrapped_key_version.map(|v| v.id),
                "DEK was rewrapped with a new key version"
            );
        }

        Ok((dek, rewrapped))
    }
}
