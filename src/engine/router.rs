//! Request Router
//!
//! Resolves the target engine's connection and forwards one call. A transport
//! failure invalidates the connection and the call is retried exactly once on
//! a fresh dial; a second transport failure surfaces as `UpstreamUnavailable`.
//! Application errors from the engine are returned untouched and never retried.

use super::registry::ConnectionRegistry;
use super::types::{DataEngine, EngineMethod, EngineTarget};
use crate::error::{ProxyError, Result};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Field carrying the target block in every proxied request. The engine never
/// sees it.
pub const TARGET_FIELD: &str = "proxy_engine_request";

pub struct RequestRouter {
    registry: Arc<ConnectionRegistry>,
    forward_timeout: Duration,
    v2_data_engine_enabled: bool,
}

impl RequestRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        forward_timeout: Duration,
        v2_data_engine_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            forward_timeout,
            v2_data_engine_enabled,
        })
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Forwards `payload` to the engine behind `target` and decodes its reply.
    pub async fn forward<Req, Resp>(
        &self,
        target: &EngineTarget,
        method: EngineMethod,
        payload: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.check_data_engine(target)?;

        let body = strip_target_fields(serde_json::to_value(payload)?);
        let response = self.forward_raw(&target.address, method, body).await?;

        serde_json::from_value(response).map_err(|e| {
            ProxyError::Serialization(format!(
                "unexpected {} response from {}: {}",
                method, target.address, e
            ))
        })
    }

    /// Address-only variant for calls that are not tied to one volume.
    pub async fn forward_to<Req>(&self, address: &str, method: EngineMethod, payload: &Req) -> Result<Value>
    where
        Req: Serialize + ?Sized,
    {
        let body = strip_target_fields(serde_json::to_value(payload)?);
        self.forward_raw(address, method, body).await
    }

    async fn forward_raw(&self, address: &str, method: EngineMethod, body: Value) -> Result<Value> {
        match self.attempt(address, method, body.clone()).await {
            Err(e) if e.is_transport() => {
                tracing::warn!(
                    "Forwarding {} to {} failed ({}), retrying on a new connection",
                    method,
                    address,
                    e
                );
                match self.attempt(address, method, body).await {
                    Err(ProxyError::Connection { message, .. }) => {
                        tracing::error!("Engine {} unavailable for {}: {}", address, method, message);
                        Err(ProxyError::UpstreamUnavailable {
                            address: address.to_string(),
                            message,
                        })
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn attempt(&self, address: &str, method: EngineMethod, body: Value) -> Result<Value> {
        let lease = self.registry.acquire(address).await?;

        tracing::trace!("Forwarding {} to {}", method, address);

        let result = match tokio::time::timeout(self.forward_timeout, lease.call(method, body)).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::Connection {
                address: address.to_string(),
                message: format!("{} timed out after {:?}", method, self.forward_timeout),
            }),
        };

        if let Err(e) = &result
            && e.is_transport()
        {
            self.registry.invalidate_lease(&lease);
        }
        self.registry.release(address);

        result
    }

    fn check_data_engine(&self, target: &EngineTarget) -> Result<()> {
        if target.data_engine == DataEngine::V2 && !self.v2_data_engine_enabled {
            return Err(ProxyError::Unsupported(format!(
                "data engine {} is not enabled for engine {}",
                target.data_engine, target.engine_name
            )));
        }
        Ok(())
    }
}

/// Removes the proxy's own addressing block from a request body.
pub fn strip_target_fields(mut body: Value) -> Value {
    if let Value::Object(map) = &mut body {
        map.remove(TARGET_FIELD);
    }
    body
}
