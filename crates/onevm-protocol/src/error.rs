// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport error type.

use thiserror::Error;

/// Errors raised while talking to the XML-RPC endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The endpoint answered with an XML-RPC fault.
    #[error("XML-RPC fault [{code}]: {message}")]
    Fault { code: i64, message: String },

    /// The call reached the server but the command failed.
    #[error("remote error [{code}]: {message}")]
    Remote { code: i64, message: String },

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => TransportError::Http {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => TransportError::Connection(transport.to_string()),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Connection(err.to_string())
    }
}
