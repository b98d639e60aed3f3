// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! onevm SDK
//!
//! Lifecycle management for OpenNebula virtual machines.
//!
//! The crate is built around three pieces:
//! - [`attributes`]: flattens an XML info document into a path-keyed map
//!   (`TEMPLATE/CONTEXT/ETH0_IP = "10.0.0.5"`).
//! - [`convergence`]: a blocking poll loop that waits until a probe reports its
//!   target, with a timeout and bounded backoff.
//! - [`reconcile`]: projects observed attributes onto the locally declared ones.
//!
//! [`InstanceController`] composes them over an [`RpcClient`] to create, read,
//! update and delete instances.
//!
//! # Example
//!
//! ```no_run
//! use onevm_sdk::{InstanceController, InstanceSpec};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Endpoint and credentials come from OPENNEBULA_* variables
//! let controller = InstanceController::from_env()?;
//!
//! // Instantiate template 4 and block until it is running with an IP
//! let spec = InstanceSpec::new(4, "640")
//!     .with_name("web")
//!     .with_wait_for_attribute("TEMPLATE/CONTEXT/ETH0_IP")
//!     .with_attribute("ROLE", "web");
//! let info = controller.create(&spec)?;
//! println!("VM {} is up at {}", info.id, info.ip);
//!
//! // Terminate it again
//! controller.delete(info.id)?;
//! # Ok(())
//! # }
//! ```

pub mod attributes;
mod config;
mod controller;
pub mod convergence;
mod error;
pub mod permissions;
pub mod reconcile;
mod types;

pub use attributes::{AttributeMap, ParseError, flatten};
pub use config::SdkConfig;
pub use controller::{InstanceController, NO_EXISTS_CODE};
pub use convergence::{ConvergenceError, PollOutcome, WaitLabels, WaitPolicy, wait_for};
pub use error::{Result, SdkError};
pub use permissions::{PermissionError, Permissions};
pub use reconcile::{DeclaredAttributes, ReconciliationPlan, serialize, synchronize};
pub use types::{
    DEFAULT_IP_ATTRIBUTE, InstanceInfo, InstanceSpec, InstanceUpdate, LCM_STATE_RUNNING,
    ReadOptions, USER_TEMPLATE_PREFIX, VM_ELEMENT_NAME, VmState, VmStatus,
};

pub use onevm_protocol::{OneClient, RpcClient, RpcClientConfig, RpcValue, TransportError};
