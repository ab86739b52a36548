//! Key Protect client with quantum-safe transport options
//!
//! Creates root and standard keys, wraps and unwraps data encryption keys
//! with additional authenticated data, and fetches and deletes keys on a
//! remote key-protection service. All cryptography happens on the service;
//! this crate validates inputs, authenticates, and decodes results.
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


pub mod auth;
pub mod client;
pub mod context;
pub mod envelope;
pub mod error;
pub mod key_types;
pub mod kms;
pub mod service_integration;
mod wire;

pub use auth::{IamTokenProvider, StaticTokenProvider, TokenProvider};
pub use client::{KeyProtectClient, KeyProtectClientBuilder};
pub use context::CallContext;
pub use envelope::EnvelopeKeys;
pub use error::{ErrorReason, KeyProtectError, KeyProtectResult, ServiceError, ServiceErrorKind};
pub use key_types::{
    Aad, CreateKeyOptions, Dek, Key, KeyClass, KeyState, KeyVersionRef, ListKeysOptions,
    PreferReturn, WrappedDek, DEK_LEN,
};
pub use keyprotect_config::{
    ClientConfig, QscAlgorithm, QscConfig, DEFAULT_BASE_QSC_URL, DEFAULT_BASE_URL,
    DEFAULT_TOKEN_URL,
};
pub use kms::KeyProtect;
pub use service_integration::*;
pub use tokio_util::sync::CancellationToken;
