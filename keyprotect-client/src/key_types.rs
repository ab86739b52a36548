//! Key type definitions
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
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a data encryption key in bytes (256 bits)
pub const DEK_LEN: usize = 32;

/// Longest key name the service accepts
pub const MAX_KEY_NAME_LEN: usize = 90;

/// Key protection class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Never leaves the service; used to wrap DEKs
    Root,
    /// Extractable key material
    Standard,
}

impl KeyClass {
    pub fn extractable(&self) -> bool {
        matches!(self, KeyClass::Standard)
    }
}

/// Lifecycle state reported by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    PreActivation,
    Active,
    Suspended,
    Deactivated,
    Destroyed,
}

impl KeyState {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(KeyState::PreActivation),
            1 => Some(KeyState::Active),
            2 => Some(KeyState::Suspended),
            3 => Some(KeyState::Deactivated),
            5 => Some(KeyState::Destroyed),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            KeyState::PreActivation => 0,
            KeyState::Active => 1,
            KeyState::Suspended => 2,
            KeyState::Deactivated => 3,
            KeyState::Destroyed => 5,
        }
    }
}

/// Version of a key's material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVersionRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
}

/// Key resource as represented by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub extractable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotate_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<KeyVersionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_date: Option<DateTime<Utc>>,
    #[serde(rename = "keyRingID", default, skip_serializing_if = "Option::is_none")]
    pub key_ring_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported: Option<bool>,
}

impl Key {
    pub fn class(&self) -> KeyClass {
        if self.extractable {
            KeyClass::Standard
        } else {
            KeyClass::Root
        }
    }

    pub fn key_state(&self) -> Option<KeyState> {
        self.state.and_then(KeyState::from_code)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Plaintext 256-bit data encryption key.
///
/// Wiped from memory on drop. Use it, then let it go.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Dek {
    key: [u8; DEK_LEN],
}

impl Dek {
    /// Fresh random key from the OS generator
    pub fn generate() -> Self {
        let mut key = [0u8; DEK_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_bytes(bytes: &[u8]) -> KeyProtectResult<Self> {
        Self::try_from_slice(bytes).ok_or_else(|| {
            KeyProtectError::InvalidArgument(format!(
                "DEK must be exactly {} bytes, got {}",
                DEK_LEN,
                bytes.len()
            ))
        })
    }

    pub(crate) fn try_from_slice(bytes: &[u8]) -> Option<Self> {
        let key: [u8; DEK_LEN] = bytes.try_into().ok()?;
        Some(Self { key })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; DEK_LEN] {
        &self.key
    }
}

impl fmt::Debug for Dek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dek")
            .field("len", &DEK_LEN)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Wrapped DEK (WDEK) exactly as issued by the service.
///
/// Opaque to the client; store it and hand it back on unwrap.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct WrappedDek(Vec<u8>);

impl WrappedDek {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Text form sent back to the service
    pub(crate) fn to_text(&self) -> KeyProtectResult<&str> {
        if self.0.is_empty() {
            return Err(KeyProtectError::InvalidArgument(
                "wrapped DEK must not be empty".to_string(),
            ));
        }
        std::str::from_utf8(&self.0).map_err(|_| {
            KeyProtectError::InvalidArgument("wrapped DEK is not valid UTF-8".to_string())
        })
    }
}

impl fmt::Debug for WrappedDek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedDek({})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for WrappedDek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl From<Vec<u8>> for WrappedDek {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for WrappedDek {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<String> for WrappedDek {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

impl From<&str> for WrappedDek {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

/// Additional authenticated data bound to a wrap.
///
/// Order matters: unwrap must present the same strings in the same order.
/// Not secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aad(Vec<String>);

impl Aad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: impl Into<String>) {
        self.0.push(value.into());
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for Aad {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

impl<S: Into<String>> FromIterator<S> for Aad {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Optional attributes for a new key
#[derive(Clone, Default)]
pub struct CreateKeyOptions {
    pub description: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
    /// Caller-supplied key material; the service generates one when absent
    pub payload: Option<Vec<u8>>,
}

impl fmt::Debug for CreateKeyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateKeyOptions")
            .field("description", &self.description)
            .field("expiration", &self.expiration)
            .field("payload", &self.payload.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CreateKeyOptions {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Paging for key listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListKeysOptions {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// What the service should echo back from a mutating call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferReturn {
    Minimal,
    Representation,
}

impl PreferReturn {
    pub fn header_value(&self) -> &'static str {
        match self {
            PreferReturn::Minimal => "return=minimal",
            PreferReturn::Representation => "return=representation",
        }
    }
}

pub(crate) fn validate_key_name(name: &str) -> KeyProtectResult<()> {
    if name.trim().is_empty() {
        return Err(KeyProtectError::InvalidArgument(
            "key name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_KEY_NAME_LEN {
        return Err(KeyProtectError::InvalidArgument(format!(
            "key name must be at most {} characters",
            MAX_KEY_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(KeyProtectError::InvalidArgument(
            "key name must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// IDs are interpolated into request paths
pub(crate) fn validate_key_id(key_id: &str) -> KeyProtectResult<()> {
    if key_id.is_empty() {
        return Err(KeyProtectError::InvalidArgument(
            "key ID must not be empty".to_string(),
        ));
    }
    if !key_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(KeyProtectError::InvalidArgument(format!(
            "key ID '{}' contains invalid characters",
            key_id
        )));
    }
    Ok(())
}
