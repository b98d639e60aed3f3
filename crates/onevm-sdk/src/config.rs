// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the instance controller.

use std::time::Duration;

use onevm_protocol::RpcClientConfig;

use crate::convergence::WaitPolicy;
use crate::error::{Result, SdkError};

/// Configuration for the InstanceController.
#[derive(Debug, Clone, Default)]
pub struct SdkConfig {
    /// XML-RPC endpoint and credentials.
    pub rpc: RpcClientConfig,
    /// Timing of the state waits performed during create and delete.
    pub wait: WaitPolicy,
}

impl SdkConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OPENNEBULA_ENDPOINT`: XML-RPC endpoint (default: "http://localhost:2633/RPC2")
    /// - `OPENNEBULA_USERNAME`: User name (required)
    /// - `OPENNEBULA_PASSWORD`: Password (required)
    /// - `OPENNEBULA_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    /// - `OPENNEBULA_WAIT_TIMEOUT_SECS`: State wait timeout (default: 600)
    /// - `OPENNEBULA_WAIT_DELAY_SECS`: Delay before the first probe (default: 10)
    /// - `OPENNEBULA_WAIT_MIN_POLL_SECS`: Minimum interval between probes (default: 3)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let endpoint = lookup("OPENNEBULA_ENDPOINT").unwrap_or(defaults.rpc.endpoint);

        let username = lookup("OPENNEBULA_USERNAME")
            .ok_or_else(|| SdkError::Config("OPENNEBULA_USERNAME is required".to_string()))?;

        let password = lookup("OPENNEBULA_PASSWORD")
            .ok_or_else(|| SdkError::Config("OPENNEBULA_PASSWORD is required".to_string()))?;

        let request_timeout_ms: u64 =
            parse_var(&lookup, "OPENNEBULA_REQUEST_TIMEOUT_MS", "30000")?;
        let wait_timeout_secs: u64 = parse_var(&lookup, "OPENNEBULA_WAIT_TIMEOUT_SECS", "600")?;
        let wait_delay_secs: u64 = parse_var(&lookup, "OPENNEBULA_WAIT_DELAY_SECS", "10")?;
        let min_poll_secs: u64 = parse_var(&lookup, "OPENNEBULA_WAIT_MIN_POLL_SECS", "3")?;

        Ok(Self {
            rpc: RpcClientConfig {
                endpoint,
                username,
                password,
                request_timeout: Duration::from_millis(request_timeout_ms),
            },
            wait: defaults
                .wait
                .with_timeout(Duration::from_secs(wait_timeout_secs))
                .with_initial_delay(Duration::from_secs(wait_delay_secs))
                .with_min_poll_interval(Duration::from_secs(min_poll_secs)),
        })
    }

    /// Set the XML-RPC endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.rpc.endpoint = endpoint.into();
        self
    }

    /// Set the credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.rpc.username = username.into();
        self.rpc.password = password.into();
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.rpc.request_timeout = timeout;
        self
    }

    /// Set the wait policy.
    pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

fn parse_var<F>(lookup: &F, key: &str, default: &str) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| default.to_string())
        .parse()
        .map_err(|e| SdkError::Config(format!("invalid {}: {}", key, e)))
}
