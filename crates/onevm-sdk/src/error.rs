// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for onevm-sdk.

use std::time::Duration;

use onevm_protocol::TransportError;
use thiserror::Error;

use crate::attributes::ParseError;
use crate::convergence::ConvergenceError;
use crate::permissions::PermissionError;

/// Result type using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors that can occur when using the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The RPC call failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Instance not found.
    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    /// The info document could not be flattened.
    #[error("attribute error: {0}")]
    Attributes(#[from] ParseError),

    /// Invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The instance did not reach the expected state in time.
    #[error("timed out after {elapsed:?} waiting for {target} (last observed: {last_observed})")]
    WaitTimeout {
        target: String,
        elapsed: Duration,
        last_observed: String,
    },

    /// The instance reached a state other than the one waited for.
    #[error("instance {id} is in unexpected state {actual} (expected {expected})")]
    UnexpectedState {
        id: i64,
        expected: String,
        actual: String,
    },

    /// Unexpected response from server.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<PermissionError> for SdkError {
    fn from(err: PermissionError) -> Self {
        SdkError::InvalidInput(err.to_string())
    }
}

impl From<ConvergenceError<SdkError>> for SdkError {
    fn from(err: ConvergenceError<SdkError>) -> Self {
        match err {
            ConvergenceError::Probe { source, .. } => source,
            ConvergenceError::Timeout {
                target,
                elapsed,
                last_observed,
                ..
            } => SdkError::WaitTimeout {
                target,
                elapsed,
                last_observed,
            },
        }
    }
}
