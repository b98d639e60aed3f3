// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Attribute flattening tests for onevm-sdk.

use onevm_sdk::{AttributeMap, ParseError, flatten};

fn map(pairs: &[(&str, &str)]) -> AttributeMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

const VM_INFO: &str = r#"<?xml version="1.0"?>
<VM>
  <ID>12</ID>
  <NAME>web-12</NAME>
  <STATE>3</STATE>
  <LCM_STATE>3</LCM_STATE>
  <PERMISSIONS>
    <OWNER_U>1</OWNER_U>
    <OWNER_M>1</OWNER_M>
    <OWNER_A>0</OWNER_A>
  </PERMISSIONS>
  <TEMPLATE>
    <CONTEXT>
      <ETH0_IP><![CDATA[10.0.0.5]]></ETH0_IP>
      <NETWORK><![CDATA[YES]]></NETWORK>
    </CONTEXT>
    <DISK>
      <IMAGE>ubuntu</IMAGE>
    </DISK>
  </TEMPLATE>
  <USER_TEMPLATE>
    <ROLE>web</ROLE>
  </USER_TEMPLATE>
</VM>
"#;

// ============================================================================
// Documented scenarios
// ============================================================================

#[test]
fn test_mixed_content_concatenates_own_text_runs() {
    let attributes = flatten(
        b"<VM><PARENT><CHILD>child value</CHILD> parent value</PARENT></VM>",
        "VM",
    )
    .unwrap();
    assert_eq!(
        attributes,
        map(&[("PARENT", "parent value"), ("PARENT/CHILD", "child value")])
    );
}

#[test]
fn test_root_nested_in_wrapper_elements() {
    let attributes = flatten(b"<ROOT><WRAP><VM><E>value</E></VM></WRAP></ROOT>", "VM").unwrap();
    assert_eq!(attributes, map(&[("E", "value")]));
}

#[test]
fn test_truncated_document_is_malformed() {
    let result = flatten(b"<VM><E>value</E", "VM");
    assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
}

// ============================================================================
// Failure cases
// ============================================================================

#[test]
fn test_empty_document() {
    assert_eq!(
        flatten(b"", "VM"),
        Err(ParseError::RootElementNotFound("VM".to_string()))
    );
}

#[test]
fn test_empty_root_name_never_matches() {
    assert!(matches!(
        flatten(VM_INFO.as_bytes(), ""),
        Err(ParseError::RootElementNotFound(_))
    ));
    assert!(matches!(
        flatten(b"", ""),
        Err(ParseError::RootElementNotFound(_))
    ));
}

#[test]
fn test_root_not_present() {
    let result = flatten(b"<IMAGE><ID>1</ID></IMAGE>", "VM");
    assert_eq!(result, Err(ParseError::RootElementNotFound("VM".to_string())));
}

#[test]
fn test_root_name_is_matched_exactly() {
    let result = flatten(b"<VMS><VM_POOL><ID>1</ID></VM_POOL></VMS>", "VM");
    assert!(matches!(result, Err(ParseError::RootElementNotFound(_))));
}

#[test]
fn test_unclosed_root_is_malformed() {
    let result = flatten(b"<VM><ID>1</ID>", "VM");
    assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
}

#[test]
fn test_mismatched_end_tag_is_malformed() {
    let result = flatten(b"<VM><ID>1</NAME></VM>", "VM");
    assert!(matches!(result, Err(ParseError::MalformedDocument(_))));
}

// ============================================================================
// Shape of the result
// ============================================================================

#[test]
fn test_full_info_document() {
    let attributes = flatten(VM_INFO.as_bytes(), "VM").unwrap();

    assert_eq!(attributes["ID"], "12");
    assert_eq!(attributes["NAME"], "web-12");
    assert_eq!(attributes["STATE"], "3");
    assert_eq!(attributes["PERMISSIONS/OWNER_U"], "1");
    assert_eq!(attributes["PERMISSIONS/OWNER_A"], "0");
    assert_eq!(attributes["TEMPLATE/CONTEXT/ETH0_IP"], "10.0.0.5");
    assert_eq!(attributes["TEMPLATE/CONTEXT/NETWORK"], "YES");
    assert_eq!(attributes["TEMPLATE/DISK/IMAGE"], "ubuntu");
    assert_eq!(attributes["USER_TEMPLATE/ROLE"], "web");
    assert_eq!(attributes.len(), 11);
}

#[test]
fn test_root_is_never_a_key() {
    let attributes = flatten(b"<VM>stray<ID>1</ID></VM>", "VM").unwrap();
    assert!(!attributes.contains_key("VM"));
    assert!(!attributes.contains_key(""));
    assert_eq!(attributes, map(&[("ID", "1")]));
}

#[test]
fn test_whitespace_only_text_is_ignored() {
    let attributes = flatten(b"<VM>\n  <T>\n    <A>\t</A>\n  </T>\n</VM>", "VM").unwrap();
    assert!(attributes.is_empty());
}

#[test]
fn test_text_is_trimmed() {
    let attributes = flatten(b"<VM><NAME>\n   web   \n</NAME></VM>", "VM").unwrap();
    assert_eq!(attributes["NAME"], "web");
}

#[test]
fn test_repeated_siblings_are_joined() {
    let attributes = flatten(
        b"<VM><TEMPLATE><NIC><IP>10.0.0.1</IP></NIC><NIC><IP>10.0.0.2</IP></NIC></TEMPLATE></VM>",
        "VM",
    )
    .unwrap();
    assert_eq!(attributes["TEMPLATE/NIC/IP"], "10.0.0.1 10.0.0.2");
}

#[test]
fn test_self_similar_nesting() {
    let attributes = flatten(
        b"<VM><ID>1</ID><VM><ID>2</ID><VM><ID>3</ID></VM></VM><NAME>outer</NAME></VM>",
        "VM",
    )
    .unwrap();
    assert_eq!(
        attributes,
        map(&[
            ("ID", "1"),
            ("VM/ID", "2"),
            ("VM/VM/ID", "3"),
            ("NAME", "outer"),
        ])
    );
}

#[test]
fn test_first_occurrence_at_any_depth_wins() {
    let attributes = flatten(
        b"<POOL><GROUP><VM><ID>1</ID></VM></GROUP><VM><ID>2</ID></VM></POOL>",
        "VM",
    )
    .unwrap();
    assert_eq!(attributes, map(&[("ID", "1")]));
}

#[test]
fn test_namespaced_elements_use_local_names() {
    let attributes = flatten(
        br#"<one:VM xmlns:one="http://opennebula.org/XMLSchema"><one:ID>4</one:ID></one:VM>"#,
        "VM",
    )
    .unwrap();
    assert_eq!(attributes, map(&[("ID", "4")]));
}

#[test]
fn test_flatten_is_deterministic() {
    let first = flatten(VM_INFO.as_bytes(), "VM").unwrap();
    let second = flatten(VM_INFO.as_bytes(), "VM").unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_flatten_other_root() {
    let attributes = flatten(VM_INFO.as_bytes(), "CONTEXT").unwrap();
    assert_eq!(
        attributes,
        map(&[("ETH0_IP", "10.0.0.5"), ("NETWORK", "YES")])
    );
}
