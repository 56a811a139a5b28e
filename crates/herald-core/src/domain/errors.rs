//! Delivery error model.
//!
//! Backend failures are values, not panics: every error carries an
//! operational classification so callers can distinguish "fix your
//! credentials" from "the network hiccuped" without parsing message text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operational classification of a delivery failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    /// Credential exchange or token validation failed.
    Auth,

    /// The backend or the path to it was unreachable.
    Network,

    /// The backend asked us to slow down.
    RateLimited,

    /// The call outlived its time budget.
    Timeout,

    /// The target names no registered backend.
    Unsupported,

    /// The target is registered but its credentials are absent.
    NotConnected,

    /// Anything the backend reported that fits no bucket above.
    Backend,
}

/// A delivery failure, as returned by backends and recorded on target rows.
///
/// Display is the bare message: it ends up verbatim in per-target rows and
/// operator notifications, so it has to read well on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct DeliveryError {
    pub kind: DeliveryErrorKind,
    pub message: String,
}

impl DeliveryError {
    pub fn new(kind: DeliveryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::Auth, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::Network, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::RateLimited, message)
    }

    pub fn timeout(budget: std::time::Duration) -> Self {
        Self::new(
            DeliveryErrorKind::Timeout,
            format!("delivery timed out after {budget:?}"),
        )
    }

    /// Deterministic outcome for a target with no registered backend.
    pub fn unsupported(target: &str) -> Self {
        Self::new(
            DeliveryErrorKind::Unsupported,
            format!("unsupported platform: {target}"),
        )
    }

    /// Deterministic outcome for a registered target without credentials.
    pub fn not_connected(target: &str) -> Self {
        Self::new(
            DeliveryErrorKind::NotConnected,
            format!("{target} is not connected"),
        )
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(DeliveryErrorKind::Backend, message)
    }
}
