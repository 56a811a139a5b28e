//! DeliveryBackend port - the uniform contract every destination satisfies.
//!
//! Wire protocols live entirely behind this trait. The engine only knows:
//! "is this target connected" (a credential check, no network) and
//! "deliver this content" (one bounded call returning a typed result).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Delivered, DeliveryError};

/// Per-backend credentials and settings, as configured by the operator.
///
/// The named fields cover what most destinations need; anything else goes
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl BackendConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// The content handed to a backend for one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub body: String,

    /// Opaque media reference; backends that can't attach media ignore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<String>,
}

/// A pluggable delivery destination.
#[async_trait]
pub trait DeliveryBackend: Send + Sync {
    /// Pure credential-presence check; must not touch the network. A target
    /// that fails this is recorded failed without a `deliver` call.
    fn is_connected(&self, config: &BackendConfig) -> bool;

    /// Deliver one piece of content. Failures come back as values
    /// (including auth-exchange failures for session-style backends).
    async fn deliver(
        &self,
        request: DeliveryRequest,
        config: &BackendConfig,
    ) -> Result<Delivered, DeliveryError>;
}
