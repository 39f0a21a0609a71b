//! In-process engine double used by the unit tests.
//!
//! The fake connector counts dials, can be told to fail the next N dials or
//! calls with a transport error, and answers calls through a swappable
//! responder closure.

use super::connection::{EngineConnection, EngineConnector};
use super::types::EngineMethod;
use crate::error::{ProxyError, Result};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Responder = Arc<dyn Fn(&str, EngineMethod, &Value) -> Result<Value> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub address: String,
    pub method: EngineMethod,
    pub body: Value,
}

pub struct FakeConnector {
    dials: AtomicUsize,
    dial_delay: Mutex<Duration>,
    failing_dials: AtomicUsize,
    failing_calls: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
    responder: Mutex<Responder>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            dials: AtomicUsize::new(0),
            dial_delay: Mutex::new(Duration::ZERO),
            failing_dials: AtomicUsize::new(0),
            failing_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            responder: Mutex::new(Arc::new(|_, _, _| Ok(serde_json::json!({})))),
        })
    }

    pub fn as_connector(self: &Arc<Self>) -> Arc<dyn EngineConnector> {
        Arc::new(self.clone())
    }

    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&str, EngineMethod, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Arc::new(responder);
    }

    pub fn set_dial_delay(&self, delay: Duration) {
        *self.dial_delay.lock().unwrap() = delay;
    }

    pub fn fail_next_dials(&self, count: usize) {
        self.failing_dials.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_calls(&self, count: usize) {
        self.failing_calls.store(count, Ordering::SeqCst);
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: EngineMethod) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method)
            .collect()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EngineConnector for Arc<FakeConnector> {
    async fn dial(&self, address: &str) -> Result<Arc<dyn EngineConnection>> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        let delay = *self.dial_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if FakeConnector::take_failure(&self.failing_dials) {
            return Err(ProxyError::Connection {
                address: address.to_string(),
                message: "connection refused".to_string(),
            });
        }

        Ok(Arc::new(FakeConnection {
            address: address.to_string(),
            connector: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct FakeConnection {
    address: String,
    connector: Arc<FakeConnector>,
    closed: AtomicBool,
}

impl FakeConnection {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineConnection for FakeConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, method: EngineMethod, body: Value) -> Result<Value> {
        if self.is_closed() || FakeConnector::take_failure(&self.connector.failing_calls) {
            return Err(ProxyError::Connection {
                address: self.address.clone(),
                message: "broken pipe".to_string(),
            });
        }

        self.connector.calls.lock().unwrap().push(RecordedCall {
            address: self.address.clone(),
            method,
            body: body.clone(),
        });

        let responder = self.connector.responder.lock().unwrap().clone();
        responder(&self.address, method, &body)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
