// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! High-level types for the instance controller.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::AttributeMap;
use crate::error::{Result, SdkError};
use crate::permissions::Permissions;
use crate::reconcile::{self, DeclaredAttributes, ReconciliationPlan};

/// Name of the root element of a `one.vm.info` response.
pub const VM_ELEMENT_NAME: &str = "VM";

/// Attribute holding the instance IP unless configured otherwise.
pub const DEFAULT_IP_ATTRIBUTE: &str = "TEMPLATE/CONTEXT/ETH0_IP";

/// Subtree holding user-declared attributes in a `one.vm.info` response.
pub const USER_TEMPLATE_PREFIX: &str = "USER_TEMPLATE";

/// LCM state reported while an active instance is running.
pub const LCM_STATE_RUNNING: i32 = 3;

/// Top-level state of a virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Init,
    Pending,
    Hold,
    /// Deployed; the LCM state tells what the instance is doing.
    Active,
    Stopped,
    Suspended,
    /// Terminated. The instance will not come back.
    Done,
    Failed,
    Poweroff,
    Undeployed,
    Cloning,
    CloningFailure,
    /// A state this SDK does not know about.
    Unknown(i32),
}

impl VmState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VmState::Done)
    }
}

impl From<i32> for VmState {
    fn from(value: i32) -> Self {
        match value {
            0 => VmState::Init,
            1 => VmState::Pending,
            2 => VmState::Hold,
            3 => VmState::Active,
            4 => VmState::Stopped,
            5 => VmState::Suspended,
            6 => VmState::Done,
            7 => VmState::Failed,
            8 => VmState::Poweroff,
            9 => VmState::Undeployed,
            10 => VmState::Cloning,
            11 => VmState::CloningFailure,
            other => VmState::Unknown(other),
        }
    }
}

impl From<VmState> for i32 {
    fn from(state: VmState) -> Self {
        match state {
            VmState::Init => 0,
            VmState::Pending => 1,
            VmState::Hold => 2,
            VmState::Active => 3,
            VmState::Stopped => 4,
            VmState::Suspended => 5,
            VmState::Done => 6,
            VmState::Failed => 7,
            VmState::Poweroff => 8,
            VmState::Undeployed => 9,
            VmState::Cloning => 10,
            VmState::CloningFailure => 11,
            VmState::Unknown(other) => other,
        }
    }
}

/// `STATE` and `LCM_STATE` as read from an info document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmStatus {
    pub state: VmState,
    pub lcm_state: i32,
}

impl VmStatus {
    /// Read `STATE` and `LCM_STATE` from a flattened info document.
    pub fn from_attributes(attributes: &AttributeMap) -> Result<Self> {
        Ok(Self {
            state: VmState::from(i32_attribute(attributes, "STATE")?),
            lcm_state: i32_attribute(attributes, "LCM_STATE")?,
        })
    }

    /// Active and running.
    pub fn is_running(&self) -> bool {
        self.state == VmState::Active && self.lcm_state == LCM_STATE_RUNNING
    }

    /// Terminated.
    pub fn is_done(&self) -> bool {
        self.state == VmState::Done
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "STATE={} LCM_STATE={}",
            i32::from(self.state),
            self.lcm_state
        )
    }
}

/// Typed view of a `one.vm.info` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceInfo {
    // Identity
    /// Instance ID.
    pub id: i64,
    /// Final name of the instance.
    pub name: String,
    /// Owning user ID.
    pub uid: i64,
    /// Owning group ID.
    pub gid: i64,
    /// Owning user name.
    pub uname: String,
    /// Owning group name.
    pub gname: String,

    // Status
    pub state: VmState,
    pub lcm_state: i32,

    /// Permissions in `ooo` form (e.g. `"642"`).
    pub permissions: String,
    /// IP address read from the configured IP attribute, empty if not reported.
    pub ip: String,

    // Timing
    /// When the instance was started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the instance ended (if ended).
    pub finished_at: Option<DateTime<Utc>>,

    /// Declared user attributes and the values the remote side reports for them.
    pub attributes: ReconciliationPlan,
}

impl InstanceInfo {
    /// Build the typed view from a flattened info document.
    pub fn from_attributes(attributes: &AttributeMap, options: &ReadOptions) -> Result<Self> {
        let status = VmStatus::from_attributes(attributes)?;
        let ip_attribute = options
            .ip_attribute
            .as_deref()
            .unwrap_or(DEFAULT_IP_ATTRIBUTE);

        Ok(Self {
            id: int_attribute(attributes, "ID")?,
            name: text_attribute(attributes, "NAME"),
            uid: int_attribute(attributes, "UID")?,
            gid: int_attribute(attributes, "GID")?,
            uname: text_attribute(attributes, "UNAME"),
            gname: text_attribute(attributes, "GNAME"),
            state: status.state,
            lcm_state: status.lcm_state,
            permissions: Permissions::from_attributes(attributes).to_string(),
            ip: text_attribute(attributes, ip_attribute),
            started_at: timestamp_attribute(attributes, "STIME"),
            finished_at: timestamp_attribute(attributes, "ETIME"),
            attributes: reconcile::synchronize(
                options.declared.as_ref(),
                Some(attributes),
                USER_TEMPLATE_PREFIX,
            ),
        })
    }

    /// Status part of the info.
    pub fn status(&self) -> VmStatus {
        VmStatus {
            state: self.state,
            lcm_state: self.lcm_state,
        }
    }
}

/// Options for reading an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Attribute path to read the IP from. Defaults to [`DEFAULT_IP_ATTRIBUTE`].
    pub ip_attribute: Option<String>,
    /// Locally declared user attributes to reconcile against the remote ones.
    pub declared: Option<DeclaredAttributes>,
}

impl ReadOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the IP from a different attribute.
    pub fn with_ip_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.ip_attribute = Some(attribute.into());
        self
    }

    /// Reconcile these declared attributes.
    pub fn with_declared(mut self, declared: DeclaredAttributes) -> Self {
        self.declared = Some(declared);
        self
    }
}

/// Options for creating an instance from a template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Template to instantiate.
    pub template_id: i64,
    /// Instance name. If empty, the server picks `<template name>-<id>`.
    pub name: String,
    /// Permissions in `ooo` form.
    pub permissions: String,
    /// Attribute that must be present before creation is considered complete.
    pub wait_for_attribute: Option<String>,
    /// Attribute to read the IP from.
    pub ip_attribute: Option<String>,
    /// User attributes merged into the instance template.
    pub attributes: DeclaredAttributes,
}

impl InstanceSpec {
    /// Create new options with required fields.
    pub fn new(template_id: i64, permissions: impl Into<String>) -> Self {
        Self {
            template_id,
            permissions: permissions.into(),
            ..Default::default()
        }
    }

    /// Set the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Wait for an attribute to appear after the instance is running.
    pub fn with_wait_for_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.wait_for_attribute = Some(attribute.into());
        self
    }

    /// Read the IP from a different attribute.
    pub fn with_ip_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.ip_attribute = Some(attribute.into());
        self
    }

    /// Add a single user attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Options for reading the instance back after creation.
    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            ip_attribute: self.ip_attribute.clone(),
            declared: (!self.attributes.is_empty()).then(|| self.attributes.clone()),
        }
    }
}

/// Changes to apply to an existing instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceUpdate {
    /// New permissions in `ooo` form.
    pub permissions: Option<String>,
    /// User attributes to merge into the instance template.
    pub attributes: Option<DeclaredAttributes>,
}

impl InstanceUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Change permissions.
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = Some(permissions.into());
        self
    }

    /// Merge user attributes.
    pub fn with_attributes(mut self, attributes: DeclaredAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Check if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_none() && self.attributes.as_ref().is_none_or(|a| a.is_empty())
    }
}

fn text_attribute(attributes: &AttributeMap, key: &str) -> String {
    attributes.get(key).cloned().unwrap_or_default()
}

fn int_attribute(attributes: &AttributeMap, key: &str) -> Result<i64> {
    let raw = attributes
        .get(key)
        .ok_or_else(|| SdkError::UnexpectedResponse(format!("missing {} attribute", key)))?;
    raw.trim().parse().map_err(|e| {
        SdkError::UnexpectedResponse(format!("invalid {} attribute {:?}: {}", key, raw, e))
    })
}

fn i32_attribute(attributes: &AttributeMap, key: &str) -> Result<i32> {
    let value = int_attribute(attributes, key)?;
    i32::try_from(value).map_err(|_| {
        SdkError::UnexpectedResponse(format!("{} attribute out of range: {}", key, value))
    })
}

/// Unix seconds to a UTC timestamp; `0`, missing and invalid values are `None`.
fn timestamp_attribute(attributes: &AttributeMap, key: &str) -> Option<DateTime<Utc>> {
    attributes
        .get(key)
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|secs| *secs > 0)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
