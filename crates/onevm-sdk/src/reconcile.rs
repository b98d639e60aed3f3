// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Declared-vs-observed attribute reconciliation.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::attributes::{AttributeMap, PATH_SEPARATOR};

/// Locally declared attributes, keyed by attribute name.
pub type DeclaredAttributes = BTreeMap<String, Value>;

/// Declared keys mapped to the value the remote side currently reports.
///
/// An empty string means the key is declared but not (yet) reported remotely.
pub type ReconciliationPlan = BTreeMap<String, String>;

/// Project `observed` onto the declared key set.
///
/// Each declared key resolves to the value found under `prefix/key` in
/// `observed`, or to `""` when no such entry exists. Keys reported remotely but
/// not declared locally are not part of the result. The separator is always
/// present, so an empty prefix looks up `/key`.
pub fn synchronize(
    declared: Option<&DeclaredAttributes>,
    observed: Option<&AttributeMap>,
    prefix: &str,
) -> ReconciliationPlan {
    let Some(declared) = declared else {
        return ReconciliationPlan::new();
    };

    declared
        .keys()
        .map(|key| {
            let path = observed_key(prefix, key);
            let value = observed
                .and_then(|attributes| attributes.get(&path))
                .cloned()
                .unwrap_or_default();
            (key.clone(), value)
        })
        .collect()
}

/// Render declared attributes as newline-separated `key=value` lines.
///
/// Lines are ordered by key. An absent or empty mapping renders as `""`.
pub fn serialize(declared: Option<&DeclaredAttributes>) -> String {
    let Some(declared) = declared else {
        return String::new();
    };

    declared
        .iter()
        .map(|(key, value)| format!("{}={}", key, scalar_text(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Declared keys whose observed value differs from the declared one.
pub fn drifted_keys(declared: &DeclaredAttributes, plan: &ReconciliationPlan) -> Vec<String> {
    declared
        .iter()
        .filter(|(key, value)| {
            plan.get(*key).map(String::as_str) != Some(scalar_text(value).as_str())
        })
        .map(|(key, _)| key.clone())
        .collect()
}

/// Text form of a declared scalar; strings are rendered without quotes.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn observed_key(prefix: &str, key: &str) -> String {
    format!("{}{}{}", prefix, PATH_SEPARATOR, key)
}
