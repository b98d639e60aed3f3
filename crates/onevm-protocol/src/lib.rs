// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! onevm Protocol - XML-RPC communication layer
//!
//! This crate provides the wire protocol for talking to an OpenNebula front-end:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      onevm-protocol                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Call Layer: RpcClient::call(command, params) -> String     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Serialization: XML-RPC methodCall / methodResponse         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: HTTP POST (ureq, blocking)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every OpenNebula command answers `[success, body, error_code]`; [`RpcClient::call`]
//! unwraps that envelope so callers only see the body or a [`TransportError`].
//!
//! # Usage
//!
//! ```no_run
//! use onevm_protocol::{OneClient, RpcClient, RpcValue};
//!
//! let client = OneClient::localhost("oneadmin", "secret");
//! let xml = client.call("one.vm.info", &[RpcValue::from(42)])?;
//! println!("{}", xml);
//! # Ok::<(), onevm_protocol::TransportError>(())
//! ```

pub mod client;
pub mod codec;
pub mod error;

pub use client::{OneClient, RpcClient, RpcClientConfig};
pub use codec::{RpcValue, decode_response, encode_call, unwrap_result};
pub use error::TransportError;
