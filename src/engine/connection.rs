//! Engine Connections
//!
//! A connection is the proxy's handle on one engine instance. The registry owns
//! them; callers only ever borrow one for a single call.
//!
//! The production transport is plain HTTP with JSON bodies: every engine method
//! is a `POST http://<address>/v1/<Method>`. A non-2xx answer carries
//! `{"error": "..."}` and is an application error, never a transport error.

use super::types::EngineMethod;
use crate::error::{ProxyError, Result};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[async_trait]
pub trait EngineConnection: Send + Sync {
    fn address(&self) -> &str;

    /// Sends one request and waits for the engine's reply.
    async fn call(&self, method: EngineMethod, body: Value) -> Result<Value>;

    /// Marks the connection unusable. Calls made afterwards fail as transport errors.
    fn close(&self);
}

/// Establishes connections on behalf of the registry.
#[async_trait]
pub trait EngineConnector: Send + Sync + 'static {
    async fn dial(&self, address: &str) -> Result<Arc<dyn EngineConnection>>;
}

#[derive(Debug, Deserialize)]
struct EngineErrorBody {
    error: String,
}

pub struct HttpEngineConnector {
    connect_timeout: Duration,
}

impl HttpEngineConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl EngineConnector for HttpEngineConnector {
    /// Builds a dedicated client for the address and proves the engine answers.
    ///
    /// Any HTTP reply to the version probe counts as reachable; only a
    /// transport failure fails the dial.
    async fn dial(&self, address: &str) -> Result<Arc<dyn EngineConnection>> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(|e| transport_error(address, e))?;

        let connection = HttpEngineConnection {
            address: address.to_string(),
            base_url: format!("http://{}", address),
            client,
            closed: AtomicBool::new(false),
        };

        connection
            .client
            .post(connection.url(EngineMethod::ServerVersionGet))
            .json(&serde_json::json!({}))
            .timeout(self.connect_timeout)
            .send()
            .await
            .map_err(|e| transport_error(address, e))?;

        tracing::debug!("Connected to engine at {}", address);

        Ok(Arc::new(connection))
    }
}

pub struct HttpEngineConnection {
    address: String,
    base_url: String,
    client: reqwest::Client,
    closed: AtomicBool,
}

impl HttpEngineConnection {
    fn url(&self, method: EngineMethod) -> String {
        format!("{}{}", self.base_url, method.path())
    }
}

#[async_trait]
impl EngineConnection for HttpEngineConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, method: EngineMethod, body: Value) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProxyError::Connection {
                address: self.address.clone(),
                message: "connection closed".to_string(),
            });
        }

        let response = self
            .client
            .post(self.url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.address, e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(&self.address, e))?;

        if !status.is_success() {
            let message = match serde_json::from_slice::<EngineErrorBody>(&bytes) {
                Ok(body) => body.error,
                Err(_) => String::from_utf8_lossy(&bytes).trim().to_string(),
            };
            tracing::debug!(
                "Engine {} rejected {} with {}: {}",
                self.address,
                method,
                status,
                message
            );
            return Err(ProxyError::Engine(message));
        }

        if bytes.is_empty() {
            return Ok(Value::Object(Default::default()));
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

fn transport_error(address: &str, err: reqwest::Error) -> ProxyError {
    ProxyError::Connection {
        address: address.to_string(),
        message: err.to_string(),
    }
}
