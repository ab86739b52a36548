//! JSON bodies exchanged with the key service
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
use crate::key_types::{Aad, Dek, Key, KeyVersionRef, DEK_LEN};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub(crate) const KEY_MEDIA_TYPE: &str = "application/vnd.ibm.kms.key+json";
pub(crate) const KEY_ACTION_MEDIA_TYPE: &str = "application/vnd.ibm.kms.key_action+json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionMetadata {
    pub collection_type: String,
    pub collection_total: u32,
}

/// `{metadata, resources}` wrapper used by create, get and list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct KeyCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CollectionMetadata>,
    #[serde(default)]
    pub resources: Vec<Key>,
}

impl KeyCollection {
    pub fn single(key: Key) -> Self {
        Self {
            metadata: Some(CollectionMetadata {
                collection_type: KEY_MEDIA_TYPE.to_string(),
                collection_total: 1,
            }),
            resources: vec![key],
        }
    }

    pub fn into_first(self) -> KeyProtectResult<Key> {
        self.resources.into_iter().next().ok_or_else(|| {
            KeyProtectError::InvalidResponse("key collection has no resources".to_string())
        })
    }
}

#[derive(Serialize)]
pub(crate) struct WrapRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aad: Option<&'a Aad>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WrapResponse {
    #[serde(default)]
    pub plaintext: Option<String>,
    pub ciphertext: String,
    #[serde(default)]
    pub key_version: Option<KeyVersionRef>,
}

#[derive(Serialize)]
pub(crate) struct UnwrapRequest<'a> {
    pub ciphertext: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aad: Option<&'a Aad>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UnwrapResponse {
    pub plaintext: String,
    #[serde(default)]
    pub key_version: Option<KeyVersionRef>,
    #[serde(default)]
    pub rewrapped_ciphertext: Option<String>,
    #[serde(default)]
    pub rewrapped_key_version: Option<KeyVersionRef>,
}

#[derive(Serialize)]
pub(crate) struct RotateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

pub(crate) fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 plaintext from the service into a 256-bit DEK
pub(crate) fn decode_dek(encoded: &str) -> KeyProtectResult<Dek> {
    let bytes = Zeroizing::new(STANDARD.decode(encoded.trim()).map_err(|e| {
        KeyProtectError::InvalidResponse(format!("plaintext is not valid base64: {}", e))
    })?);

    Dek::try_from_slice(&bytes).ok_or_else(|| {
        KeyProtectError::InvalidResponse(format!(
            "DEK length was {} bytes, expected {}",
            bytes.len(),
            DEK_LEN
        ))
    })
}
