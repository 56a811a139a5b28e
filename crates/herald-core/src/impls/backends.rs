//! Development and test backends.
//!
//! # 含まれる実装
//! - **RecordingBackend**: scripted outcomes + invocation log（テスト駆動用）
//! - **SessionBackend**: 認証交換を伴うバックエンドの形（セッション発行 → 投稿）
//!
//! 本物のワイヤプロトコルを話す実装は別クレートに置く前提です。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Delivered, DeliveryError};
use crate::ports::{BackendConfig, DeliveryBackend, DeliveryRequest};

/// How a [`RecordingBackend`] answers the credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connectivity {
    Always,
    Never,
    RequireApiKey,
}

/// A backend that records every invocation and replays a script of
/// outcomes. The workhorse of the engine/scheduler tests: the invocation
/// log is how we prove a backend was (or was not) called.
pub struct RecordingBackend {
    connectivity: Connectivity,
    script: Mutex<VecDeque<Result<Delivered, DeliveryError>>>,
    calls: Mutex<Vec<DeliveryRequest>>,
    delay: Option<Duration>,
    counter: AtomicU64,
}

impl RecordingBackend {
    /// Always connected, succeeds with generated ids unless scripted.
    pub fn connected() -> Self {
        Self::with_connectivity(Connectivity::Always)
    }

    /// Fails the credential check no matter the config.
    pub fn disconnected() -> Self {
        Self::with_connectivity(Connectivity::Never)
    }

    /// Credential-presence shape: connected iff `api_key` is set.
    pub fn requiring_api_key() -> Self {
        Self::with_connectivity(Connectivity::RequireApiKey)
    }

    fn with_connectivity(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
            counter: AtomicU64::new(0),
        }
    }

    /// Queue outcomes to replay, first call first. When the script runs
    /// dry, deliveries succeed with generated ids.
    pub fn with_script(self, outcomes: Vec<Result<Delivered, DeliveryError>>) -> Self {
        *self.script.lock().expect("script lock poisoned") = outcomes.into();
        self
    }

    /// Sleep this long inside every `deliver` call (timeout tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Everything `deliver` has been handed so far.
    pub fn calls(&self) -> Vec<DeliveryRequest> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock poisoned").len()
    }
}

#[async_trait]
impl DeliveryBackend for RecordingBackend {
    fn is_connected(&self, config: &BackendConfig) -> bool {
        match self.connectivity {
            Connectivity::Always => true,
            Connectivity::Never => false,
            Connectivity::RequireApiKey => config.api_key.is_some(),
        }
    }

    async fn deliver(
        &self,
        request: DeliveryRequest,
        _config: &BackendConfig,
    ) -> Result<Delivered, DeliveryError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(request);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().expect("script lock poisoned").pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => {
                let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
                Ok(Delivered::new(format!("rec-{n}")))
            }
        }
    }
}

/// Session-exchange shape: credentials are traded for a short-lived session
/// before the content call. A failed exchange is a typed auth error, never
/// a panic.
pub struct SessionBackend {
    /// The app password the exchange accepts.
    expected_password: String,
    counter: AtomicU64,
}

struct Session {
    handle: String,
    #[allow(dead_code)]
    token: String,
}

impl SessionBackend {
    pub fn new(expected_password: impl Into<String>) -> Self {
        Self {
            expected_password: expected_password.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Credential exchange: username + app password -> session.
    fn authenticate(&self, config: &BackendConfig) -> Result<Session, DeliveryError> {
        let handle = config
            .username
            .as_deref()
            .ok_or_else(|| DeliveryError::auth("session auth failed: no handle configured"))?;
        let password = config
            .api_key
            .as_deref()
            .ok_or_else(|| DeliveryError::auth("session auth failed: no app password"))?;

        if password != self.expected_password {
            return Err(DeliveryError::auth("session auth failed: invalid app password"));
        }
        Ok(Session {
            handle: handle.to_string(),
            token: format!("jwt-{}", self.counter.load(Ordering::Relaxed)),
        })
    }
}

#[async_trait]
impl DeliveryBackend for SessionBackend {
    fn is_connected(&self, config: &BackendConfig) -> bool {
        config.username.is_some() && config.api_key.is_some()
    }

    async fn deliver(
        &self,
        _request: DeliveryRequest,
        config: &BackendConfig,
    ) -> Result<Delivered, DeliveryError> {
        let session = self.authenticate(config)?;

        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let external_id = format!("at://{}/{n}", session.handle);
        let url = format!("https://sessions.example/{}/{n}", session.handle);
        Ok(Delivered::new(external_id).with_url(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_backend_connectivity_shapes() {
        let config = BackendConfig::default();
        assert!(RecordingBackend::connected().is_connected(&config));
        assert!(!RecordingBackend::disconnected().is_connected(&config));

        let presence = RecordingBackend::requiring_api_key();
        assert!(!presence.is_connected(&config));
        assert!(presence.is_connected(&config.clone().with_api_key("k")));
    }

    #[tokio::test]
    async fn recording_backend_replays_script_then_succeeds() {
        let backend = RecordingBackend::connected().with_script(vec![
            Err(DeliveryError::rate_limited("slow down")),
            Ok(Delivered::new("scripted-1")),
        ]);
        let config = BackendConfig::default();
        let request = DeliveryRequest {
            body: "hi".into(),
            media_ref: None,
        };

        let first = backend.deliver(request.clone(), &config).await;
        assert!(first.is_err());

        let second = backend.deliver(request.clone(), &config).await.unwrap();
        assert_eq!(second.external_id, "scripted-1");

        let third = backend.deliver(request, &config).await.unwrap();
        assert!(third.external_id.starts_with("rec-"));

        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn session_backend_rejects_bad_exchange() {
        let backend = SessionBackend::new("hunter2");
        let request = DeliveryRequest {
            body: "hi".into(),
            media_ref: None,
        };

        let wrong = BackendConfig::default()
            .with_username("crier.example")
            .with_api_key("wrong");
        let err = backend.deliver(request.clone(), &wrong).await.unwrap_err();
        assert_eq!(err.kind, crate::domain::DeliveryErrorKind::Auth);

        let right = BackendConfig::default()
            .with_username("crier.example")
            .with_api_key("hunter2");
        let delivered = backend.deliver(request, &right).await.unwrap();
        assert!(delivered.external_id.starts_with("at://crier.example/"));
        assert!(delivered.url.is_some());
    }
}
