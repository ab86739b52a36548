//! Error types for Key Protect calls
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


use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Key Protect client errors
#[derive(Error, Debug)]
pub enum KeyProtectError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for Key Protect calls
pub type KeyProtectResult<T> = Result<T, KeyProtectError>;

impl KeyProtectError {
    /// Map a reqwest failure, keeping timeouts distinct from other transport errors
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            KeyProtectError::Timeout(err.to_string())
        } else {
            KeyProtectError::Http(err)
        }
    }

    /// Connectivity or timeout failure; the service never answered
    pub fn is_transport(&self) -> bool {
        matches!(self, KeyProtectError::Timeout(_) | KeyProtectError::Http(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyProtectError::Service(e) if e.kind == ServiceErrorKind::NotFound)
    }

    /// HTTP status returned by the service, if it answered
    pub fn status(&self) -> Option<u16> {
        match self {
            KeyProtectError::Service(e) => Some(e.status),
            KeyProtectError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Coarse classification of a service-side failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    Unavailable,
    Other,
}

impl ServiceErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ServiceErrorKind::Validation,
            401 => ServiceErrorKind::Unauthenticated,
            403 => ServiceErrorKind::Forbidden,
            // deleted keys answer 410 Gone
            404 | 410 => ServiceErrorKind::NotFound,
            409 => ServiceErrorKind::Conflict,
            429 => ServiceErrorKind::RateLimited,
            500..=599 => ServiceErrorKind::Unavailable,
            _ => ServiceErrorKind::Other,
        }
    }
}

/// One machine-readable reason attached to a service error
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReason {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub more_info: Option<String>,
}

/// Error answered by the key service
#[derive(Debug, Clone)]
pub struct ServiceError {
    pub status: u16,
    pub kind: ServiceErrorKind,
    pub message: String,
    pub reasons: Vec<ErrorReason>,
    pub correlation_id: Option<String>,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key Protect API error ({}): {}", self.status, self.message)?;
        if let Some(reason) = self.reasons.first() {
            write!(f, " [{}]", reason.code)?;
        }
        if let Some(ref id) = self.correlation_id {
            write!(f, " (correlation id {})", id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    resources: Vec<ErrorResource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResource {
    #[serde(default)]
    error_msg: String,
    #[serde(default)]
    reasons: Vec<ErrorReason>,
}

impl ServiceError {
    /// Build from an error response body.
    ///
    /// Bodies outside the collection shape keep their raw text as the message.
    pub fn from_body(status: u16, body: &str, correlation_id: Option<String>) -> Self {
        let (message, reasons) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => match envelope.resources.into_iter().next() {
                Some(resource) => (resource.error_msg, resource.reasons),
                None => (body.trim().to_string(), Vec::new()),
            },
            Err(_) => (body.trim().to_string(), Vec::new()),
        };

        let message = if message.is_empty() {
            format!("HTTP status {}", status)
        } else {
            message
        };

        Self {
            status,
            kind: ServiceErrorKind::from_status(status),
            message,
            reasons,
            correlation_id,
        }
    }
}
