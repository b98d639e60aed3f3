// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Unix-style permission strings (`"642"`) for OpenNebula objects.
//!
//! Each digit covers one of owner, group and other; within a digit
//! 4 = use, 2 = manage, 1 = admin.

use std::fmt;
use std::str::FromStr;

use onevm_protocol::RpcValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attributes::AttributeMap;

/// Invalid permission string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("permissions must specify 3 permission sets (owner-group-other), got {0:?}")]
    Length(String),

    #[error("each permission set must be a digit from 0 to 7, got {0:?}")]
    Digit(String),
}

/// Use/manage/admin bits for a single subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(rename = "use")]
    pub use_: bool,
    pub manage: bool,
    pub admin: bool,
}

impl PermissionSet {
    fn from_digit(digit: u8) -> Self {
        Self {
            use_: digit & 4 != 0,
            manage: digit & 2 != 0,
            admin: digit & 1 != 0,
        }
    }

    fn digit(&self) -> u8 {
        (u8::from(self.use_) << 2) | (u8::from(self.manage) << 1) | u8::from(self.admin)
    }

    fn from_attributes(attributes: &AttributeMap, subject: &str) -> Self {
        let bit = |suffix: &str| {
            attributes
                .get(&format!("PERMISSIONS/{}_{}", subject, suffix))
                .is_some_and(|v| v.trim() == "1")
        };
        Self {
            use_: bit("U"),
            manage: bit("M"),
            admin: bit("A"),
        }
    }
}

/// Permissions of an object for its owner, its group and everyone else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub owner: PermissionSet,
    pub group: PermissionSet,
    pub other: PermissionSet,
}

impl Permissions {
    /// Read the `PERMISSIONS/*` bits of a flattened info document.
    ///
    /// Missing bits count as unset.
    pub fn from_attributes(attributes: &AttributeMap) -> Self {
        Self {
            owner: PermissionSet::from_attributes(attributes, "OWNER"),
            group: PermissionSet::from_attributes(attributes, "GROUP"),
            other: PermissionSet::from_attributes(attributes, "OTHER"),
        }
    }

    /// Positional parameters of a `one.*.chmod` call for object `id`.
    pub fn chmod_params(&self, id: i64) -> Vec<RpcValue> {
        let mut params = vec![RpcValue::Int(id)];
        for set in [self.owner, self.group, self.other] {
            params.push(RpcValue::from(u8::from(set.use_)));
            params.push(RpcValue::from(u8::from(set.manage)));
            params.push(RpcValue::from(u8::from(set.admin)));
        }
        params
    }
}

impl FromStr for Permissions {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().count() != 3 {
            return Err(PermissionError::Length(s.to_string()));
        }

        let digits: Vec<u8> = s
            .chars()
            .map(|c| match c {
                '0'..='7' => Ok(c as u8 - b'0'),
                _ => Err(PermissionError::Digit(s.to_string())),
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            owner: PermissionSet::from_digit(digits[0]),
            group: PermissionSet::from_digit(digits[1]),
            other: PermissionSet::from_digit(digits[2]),
        })
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.owner.digit(),
            self.group.digit(),
            self.other.digit()
        )
    }
}
