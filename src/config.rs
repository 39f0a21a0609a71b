//! Runtime configuration for the proxy.
//!
//! The binary builds a [`ProxyConfig`] from command-line flags; tests build one
//! directly with shortened intervals.

use crate::error::{ProxyError, Result};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8501";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address the HTTP surface binds to.
    pub listen_addr: SocketAddr,
    /// Upper bound for establishing a connection to an engine.
    pub dial_timeout: Duration,
    /// Upper bound for a single forwarded call.
    pub forward_timeout: Duration,
    /// Delay between two status queries of one replica poller.
    pub poll_interval: Duration,
    /// Consecutive transport failures a poller tolerates before it marks its
    /// replica as errored.
    pub poll_failure_threshold: u32,
    /// How long a fully terminal operation stays queryable.
    pub retention: Duration,
    /// Period of the retention sweeper.
    pub sweep_interval: Duration,
    pub v2_data_engine_enabled: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8501)),
            dial_timeout: Duration::from_secs(5),
            forward_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            poll_failure_threshold: 10,
            retention: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
            v2_data_engine_enabled: false,
        }
    }
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("dial_timeout", self.dial_timeout),
            ("forward_timeout", self.forward_timeout),
            ("poll_interval", self.poll_interval),
            ("sweep_interval", self.sweep_interval),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(ProxyError::InvalidArgument(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.poll_failure_threshold == 0 {
            return Err(ProxyError::InvalidArgument(
                "poll_failure_threshold must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
