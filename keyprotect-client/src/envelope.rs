//! Envelope encryption helpers over a Key Protect backend
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
use crate::key_types::{Aad, Dek, WrappedDek};
use crate::kms::KeyProtect;
use std::sync::Arc;
use tracing::info;

/// DEK handling bound to one root key and one AAD set
pub struct EnvelopeKeys {
    backend: Arc<dyn KeyProtect>,
    root_key_id: String,
    aad: Option<Aad>,
}

impl EnvelopeKeys {
    pub fn new(backend: Arc<dyn KeyProtect>, root_key_id: impl Into<String>) -> Self {
        Self {
            backend,
            root_key_id: root_key_id.into(),
            aad: None,
        }
    }

    /// Bind every wrap and unwrap to `aad`
    pub fn with_aad(mut self, aad: Aad) -> Self {
        self.aad = Some(aad);
        self
    }

    pub fn root_key_id(&self) -> &str {
        &self.root_key_id
    }

    /// Generate a DEK on the service.
    ///
    /// Use the plaintext and drop it; keep the WDEK.
    pub async fn seal_new_dek(&self, ctx: &CallContext) -> KeyProtectResult<(Dek, WrappedDek)> {
        self.backend
            .wrap_create_dek(ctx, &self.root_key_id, self.aad.as_ref())
            .await
    }

    /// Wrap a DEK generated locally
    pub async fn seal_dek(&self, ctx: &CallContext, dek: &Dek) -> KeyProtectResult<WrappedDek> {
        self.backend
            .wrap(ctx, &self.root_key_id, dek, self.aad.as_ref())
            .await
    }

    /// Unwrap `stored`, replacing it in place when the service rewraps it
    /// under a newer key version.
    ///
    /// Returns whether `stored` changed; persist it again if so.
    pub async fn open_dek(
        &self,
        ctx: &CallContext,
        stored: &mut WrappedDek,
    ) -> KeyProtectResult<(Dek, bool)> {
        let (dek, rewrapped) = self
            .backend
            .unwrap_v2(ctx, &self.root_key_id, stored, self.aad.as_ref())
            .await?;

        match rewrapped {
            Some(new_wdek) => {
                info!(key_id = %self.root_key_id, "Replacing stored WDEK after key rotation");
                *stored = new_wdek;
                Ok((dek, true))
            }
            None => Ok((dek, false)),
        }
    }
}
