//! Key Protect service interface
//!
//! Every operation is one authenticated HTTP exchange with the service. The
//! trait is the seam between callers and the transport: `KeyProtectClient`
//! implements it over HTTPS, tests can stand in their own implementation.
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


use crate::context::CallContext;
use crate::error::KeyProtectResult;
use crate::key_types::{
    Aad, CreateKeyOptions, Dek, Key, ListKeysOptions, PreferReturn, WrappedDek,
};
use async_trait::async_trait;

/// Operations offered by a key-protection service
#[async_trait]
pub trait KeyProtect: Send + Sync {
    /// Create a root key (non-extractable, used to wrap DEKs)
    async fn create_root_key(
        &self,
        ctx: &CallContext,
        name: &str,
        options: Option<&CreateKeyOptions>,
    ) -> KeyProtectResult<Key>;

    /// Create a standard key (extractable)
    async fn create_standard_key(
        &self,
        ctx: &CallContext,
        name: &str,
        options: Option<&CreateKeyOptions>,
    ) -> KeyProtectResult<Key>;

    /// Fetch a key by ID
    async fn get_key(&self, ctx: &CallContext, key_id: &str) -> KeyProtectResult<Key>;

    /// List keys in the instance
    async fn list_keys(
        &self,
        ctx: &CallContext,
        options: ListKeysOptions,
    ) -> KeyProtectResult<Vec<Key>>;

    /// Delete a key.
    ///
    /// With `PreferReturn::Representation` the deleted key is echoed back;
    /// with `Minimal` the result is `None`.
    async fn delete_key(
        &self,
        ctx: &CallContext,
        key_id: &str,
        prefer: PreferReturn,
    ) -> KeyProtectResult<Option<Key>>;

    /// Create a new version of a root key
    async fn rotate_key(
        &self,
        ctx: &CallContext,
        key_id: &str,
        payload: Option<&[u8]>,
    ) -> KeyProtectResult<()>;

    /// Wrap a caller-supplied DEK
    async fn wrap(
        &self,
        ctx: &CallContext,
        key_id: &str,
        dek: &Dek,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<WrappedDek>;

    /// Have the service generate a random DEK and return it with its wrapped form
    async fn wrap_create_dek(
        &self,
        ctx: &CallContext,
        key_id: &str,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<(Dek, WrappedDek)>;

    /// Recover the DEK behind a WDEK
    async fn unwrap(
        &self,
        ctx: &CallContext,
        key_id: &str,
        wrapped: &WrappedDek,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<Dek>;

    /// Recover the DEK and pick up a rewrapped WDEK if the key has rotated.
    ///
    /// A `Some` second value replaces the stored WDEK.
    async fn unwrap_v2(
        &self,
        ctx: &CallContext,
        key_id: &str,
        wrapped: &WrappedDek,
        aad: Option<&Aad>,
    ) -> KeyProtectResult<(Dek, Option<WrappedDek>)>;
}
