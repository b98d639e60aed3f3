// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flattening of nested XML documents into path-keyed attribute maps.
//!
//! Given a document and the name of a root element, every text-bearing element
//! below the first occurrence of that root is addressed by the `/`-joined names
//! of its ancestors (root excluded):
//!
//! ```text
//! <VM>
//!   <TEMPLATE>
//!     <CONTEXT><ETH0_IP>10.0.0.5</ETH0_IP></CONTEXT>
//!   </TEMPLATE>
//! </VM>
//! ```
//!
//! yields `TEMPLATE/CONTEXT/ETH0_IP = "10.0.0.5"`. Element attributes and
//! namespaces are ignored; only local names and character data count.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Separator between element names in an attribute path.
pub const PATH_SEPARATOR: &str = "/";

/// Separator between the text runs of a mixed-content element.
pub const VALUE_SEPARATOR: &str = " ";

/// Flattened view of an XML subtree: attribute path to trimmed text.
pub type AttributeMap = BTreeMap<String, String>;

/// Errors produced while flattening a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The requested root element does not occur in the document.
    #[error("root element <{0}> not found")]
    RootElementNotFound(String),

    /// The document is truncated or not well-formed.
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

/// Flatten the subtree below the first `root` element of `document`.
///
/// Text runs of the same element are trimmed and joined with a single space, so
/// `<P> before <C>x</C> after </P>` yields `P = "before after"` and `P/C = "x"`.
/// Whitespace-only text never produces a key. Text directly inside the root is
/// dropped, since the root itself never becomes a key.
///
/// On error nothing is returned; callers never see a partially built map.
pub fn flatten(document: &[u8], root: &str) -> Result<AttributeMap, ParseError> {
    if root.is_empty() {
        return Err(ParseError::RootElementNotFound(String::new()));
    }

    let mut reader = Reader::from_reader(document);

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) if e.local_name().as_ref() == root.as_bytes() => {
                return flatten_subtree(&mut reader);
            }
            // `<VM/>` is a root without any descendants.
            Event::Empty(e) if e.local_name().as_ref() == root.as_bytes() => {
                return Ok(AttributeMap::new());
            }
            Event::Eof => return Err(ParseError::RootElementNotFound(root.to_string())),
            _ => {}
        }
    }
}

/// Consume events up to the end tag matching the already consumed root start tag.
fn flatten_subtree(reader: &mut Reader<&[u8]>) -> Result<AttributeMap, ParseError> {
    let mut attributes = AttributeMap::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(malformed)?;
                append_text(&mut attributes, &path, &text);
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e);
                append_text(&mut attributes, &path, &text);
            }
            Event::End(e) => {
                // End tags are checked against their start tags by the reader, so an
                // empty path means this closes the root, including when elements
                // with the root's name are nested inside it.
                if path.is_empty() {
                    return Ok(attributes);
                }
                if path
                    .last()
                    .is_some_and(|top| top.as_bytes() == e.local_name().as_ref())
                {
                    path.pop();
                }
            }
            Event::Eof => {
                return Err(ParseError::MalformedDocument(
                    "document ended before the root element was closed".to_string(),
                ));
            }
            _ => {}
        }
    }
}

fn append_text(attributes: &mut AttributeMap, path: &[String], text: &str) {
    let value = text.trim();
    if value.is_empty() || path.is_empty() {
        return;
    }

    let key = path.join(PATH_SEPARATOR);
    attributes
        .entry(key)
        .and_modify(|existing| {
            existing.push_str(VALUE_SEPARATOR);
            existing.push_str(value);
        })
        .or_insert_with(|| value.to_string());
}

fn malformed(err: quick_xml::Error) -> ParseError {
    ParseError::MalformedDocument(err.to_string())
}
