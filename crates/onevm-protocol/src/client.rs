// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blocking XML-RPC client for the OpenNebula front-end.

use std::fmt;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::codec::{RpcValue, decode_response, encode_call, unwrap_result};
use crate::error::TransportError;

/// A component that executes named remote commands.
///
/// The returned string is the command's result body, usually an XML document.
/// Callers issue calls sequentially; implementations need not support
/// concurrent calls.
pub trait RpcClient {
    /// Invoke `command` with positional `params`.
    fn call(&self, command: &str, params: &[RpcValue]) -> Result<String, TransportError>;
}

impl<T: RpcClient + ?Sized> RpcClient for &T {
    fn call(&self, command: &str, params: &[RpcValue]) -> Result<String, TransportError> {
        (**self).call(command, params)
    }
}

impl<T: RpcClient + ?Sized> RpcClient for Box<T> {
    fn call(&self, command: &str, params: &[RpcValue]) -> Result<String, TransportError> {
        (**self).call(command, params)
    }
}

/// Configuration for the XML-RPC client.
#[derive(Clone)]
pub struct RpcClientConfig {
    /// Endpoint URL (e.g. `http://localhost:2633/RPC2`)
    pub endpoint: String,
    /// User name used to build the session string
    pub username: String,
    /// Password used to build the session string
    pub password: String,
    /// Timeout for a whole request/response exchange
    pub request_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:2633/RPC2".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// The password never ends up in logs.
impl fmt::Debug for RpcClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClientConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl RpcClientConfig {
    /// Session string sent as the first parameter of every call.
    pub fn session(&self) -> String {
        format!("{}:{}", self.username, self.password)
    }
}

/// XML-RPC client speaking to a single OpenNebula endpoint over HTTP.
pub struct OneClient {
    agent: ureq::Agent,
    config: RpcClientConfig,
}

impl OneClient {
    /// Create a new client with the given configuration.
    pub fn new(config: RpcClientConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout)
            .build();
        Self { agent, config }
    }

    /// Create a client for a local front-end with the given credentials.
    pub fn localhost(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(RpcClientConfig {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &RpcClientConfig {
        &self.config
    }

    /// Send one `methodCall` and decode the raw return value.
    ///
    /// The session string is prepended to `params`.
    pub fn call_raw(&self, command: &str, params: &[RpcValue]) -> Result<RpcValue, TransportError> {
        let mut full = Vec::with_capacity(params.len() + 1);
        full.push(RpcValue::Str(self.config.session()));
        full.extend_from_slice(params);

        let body = encode_call(command, &full);
        let response = self
            .agent
            .post(&self.config.endpoint)
            .set("Content-Type", "text/xml")
            .send_string(&body)?;
        let text = response.into_string()?;

        decode_response(&text)
    }
}

impl RpcClient for OneClient {
    #[instrument(skip(self, params), fields(endpoint = %self.config.endpoint))]
    fn call(&self, command: &str, params: &[RpcValue]) -> Result<String, TransportError> {
        debug!(params = params.len(), "calling remote command");
        let value = self.call_raw(command, params)?;
        unwrap_result(value)
    }
}
