// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! XML-RPC wire format.
//!
//! Each call is a single HTTP POST carrying a `methodCall` document:
//! - `methodName`: the remote command (e.g. `one.vm.info`)
//! - `params`: positional parameters, each wrapped in `<param><value>...</value></param>`
//!
//! The server answers with a `methodResponse` holding either one `param` or a `fault`.

use std::collections::BTreeMap;
use std::fmt;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::error::TransportError;

/// A single XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    /// `<i4>`, `<int>` or `<i8>`
    Int(i64),
    /// `<boolean>`
    Bool(bool),
    /// `<double>`
    Double(f64),
    /// `<string>` or an untyped `<value>`
    Str(String),
    /// `<array><data>...</data></array>`
    Array(Vec<RpcValue>),
    /// `<struct>` with named members
    Struct(BTreeMap<String, RpcValue>),
}

impl RpcValue {
    /// Borrow the value as a string slice, if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RpcValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RpcValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    fn write_xml(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            RpcValue::Int(n) if i32::try_from(*n).is_ok() => {
                out.push_str(&format!("<i4>{}</i4>", n));
            }
            RpcValue::Int(n) => out.push_str(&format!("<i8>{}</i8>", n)),
            RpcValue::Bool(b) => {
                out.push_str(if *b {
                    "<boolean>1</boolean>"
                } else {
                    "<boolean>0</boolean>"
                });
            }
            RpcValue::Double(d) => out.push_str(&format!("<double>{}</double>", d)),
            RpcValue::Str(s) => {
                out.push_str("<string>");
                out.push_str(&escape(s.as_str()));
                out.push_str("</string>");
            }
            RpcValue::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write_xml(out);
                }
                out.push_str("</data></array>");
            }
            RpcValue::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str("<member><name>");
                    out.push_str(&escape(name.as_str()));
                    out.push_str("</name>");
                    value.write_xml(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
        }
        out.push_str("</value>");
    }
}

impl fmt::Display for RpcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcValue::Int(n) => write!(f, "{}", n),
            RpcValue::Bool(b) => write!(f, "{}", b),
            RpcValue::Double(d) => write!(f, "{}", d),
            RpcValue::Str(s) => f.write_str(s),
            RpcValue::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            RpcValue::Struct(members) => {
                let rendered: Vec<String> = members
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
        }
    }
}

impl From<i64> for RpcValue {
    fn from(value: i64) -> Self {
        RpcValue::Int(value)
    }
}

impl From<i32> for RpcValue {
    fn from(value: i32) -> Self {
        RpcValue::Int(i64::from(value))
    }
}

impl From<u32> for RpcValue {
    fn from(value: u32) -> Self {
        RpcValue::Int(i64::from(value))
    }
}

impl From<u8> for RpcValue {
    fn from(value: u8) -> Self {
        RpcValue::Int(i64::from(value))
    }
}

impl From<bool> for RpcValue {
    fn from(value: bool) -> Self {
        RpcValue::Bool(value)
    }
}

impl From<&str> for RpcValue {
    fn from(value: &str) -> Self {
        RpcValue::Str(value.to_string())
    }
}

impl From<String> for RpcValue {
    fn from(value: String) -> Self {
        RpcValue::Str(value)
    }
}

/// Render a `methodCall` document.
pub fn encode_call(method: &str, params: &[RpcValue]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        param.write_xml(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Parse a `methodResponse` document into its single return value.
///
/// A `fault` response is returned as [`TransportError::Fault`].
pub fn decode_response(body: &str) -> Result<RpcValue, TransportError> {
    let mut parser = ResponseParser {
        reader: Reader::from_str(body),
    };
    parser.response()
}

/// Unwrap the `[success, body, error_code]` envelope every OpenNebula call returns.
///
/// On success the body is rendered as a string; numeric bodies (such as the id
/// returned when an instance is created) are rendered in decimal.
pub fn unwrap_result(value: RpcValue) -> Result<String, TransportError> {
    let RpcValue::Array(items) = value else {
        return Err(TransportError::Decode(format!(
            "expected result array, got {}",
            value
        )));
    };

    let mut items = items.into_iter();
    let success = match items.next() {
        Some(RpcValue::Bool(b)) => b,
        Some(RpcValue::Int(n)) => n != 0,
        other => {
            return Err(TransportError::Decode(format!(
                "expected success flag, got {:?}",
                other
            )));
        }
    };
    let body = items
        .next()
        .ok_or_else(|| TransportError::Decode("result array has no body".to_string()))?;

    if success {
        return Ok(body.to_string());
    }

    let code = items.next().and_then(|v| v.as_i64()).unwrap_or(0);
    Err(TransportError::Remote {
        code,
        message: body.to_string(),
    })
}

struct ResponseParser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> ResponseParser<'a> {
    fn response(&mut self) -> Result<RpcValue, TransportError> {
        self.expect_start("methodResponse")?;
        match self.next_structural()? {
            Event::Start(e) if e.local_name().as_ref() == b"params" => {
                self.expect_start("param")?;
                self.expect_start("value")?;
                self.value()
            }
            Event::Start(e) if e.local_name().as_ref() == b"fault" => {
                self.expect_start("value")?;
                let fault = self.value()?;
                Err(fault_error(fault))
            }
            other => Err(unexpected("params or fault", &other)),
        }
    }

    /// Parse the content of a `<value>` whose start tag was already consumed.
    fn value(&mut self) -> Result<RpcValue, TransportError> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(e) => {
                    let unescaped = e.unescape().map_err(decode_error)?;
                    text.push_str(&unescaped);
                }
                Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
                Event::End(e) if e.local_name().as_ref() == b"value" => {
                    return Ok(RpcValue::Str(text));
                }
                Event::Empty(e) => {
                    let value = match e.local_name().as_ref() {
                        b"string" | b"nil" | b"base64" => RpcValue::Str(String::new()),
                        b"array" => RpcValue::Array(Vec::new()),
                        b"struct" => RpcValue::Struct(BTreeMap::new()),
                        other => {
                            return Err(TransportError::Decode(format!(
                                "empty <{}> is not a valid value",
                                String::from_utf8_lossy(other)
                            )));
                        }
                    };
                    self.expect_end("value")?;
                    return Ok(value);
                }
                Event::Start(e) => {
                    let tag = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    let value = self.typed(&tag)?;
                    self.expect_end("value")?;
                    return Ok(value);
                }
                other => return Err(unexpected("value content", &other)),
            }
        }
    }

    fn typed(&mut self, tag: &str) -> Result<RpcValue, TransportError> {
        match tag {
            "i4" | "int" | "i8" => {
                let raw = self.text_until(tag)?;
                raw.trim()
                    .parse()
                    .map(RpcValue::Int)
                    .map_err(|e| TransportError::Decode(format!("invalid <{}>: {}", tag, e)))
            }
            "boolean" => match self.text_until(tag)?.trim() {
                "1" | "true" => Ok(RpcValue::Bool(true)),
                "0" | "false" => Ok(RpcValue::Bool(false)),
                other => Err(TransportError::Decode(format!(
                    "invalid <boolean>: {}",
                    other
                ))),
            },
            "double" => {
                let raw = self.text_until(tag)?;
                raw.trim()
                    .parse()
                    .map(RpcValue::Double)
                    .map_err(|e| TransportError::Decode(format!("invalid <double>: {}", e)))
            }
            "string" | "dateTime.iso8601" | "base64" => self.text_until(tag).map(RpcValue::Str),
            "array" => {
                let mut items = Vec::new();
                match self.next_structural()? {
                    Event::Empty(e) if e.local_name().as_ref() == b"data" => {}
                    Event::Start(e) if e.local_name().as_ref() == b"data" => loop {
                        match self.next_structural()? {
                            Event::Start(e) if e.local_name().as_ref() == b"value" => {
                                items.push(self.value()?);
                            }
                            Event::End(e) if e.local_name().as_ref() == b"data" => break,
                            other => return Err(unexpected("array item", &other)),
                        }
                    },
                    other => return Err(unexpected("data", &other)),
                }
                self.expect_end("array")?;
                Ok(RpcValue::Array(items))
            }
            "struct" => {
                let mut members = BTreeMap::new();
                loop {
                    match self.next_structural()? {
                        Event::Start(e) if e.local_name().as_ref() == b"member" => {
                            self.expect_start("name")?;
                            let name = self.text_until("name")?;
                            self.expect_start("value")?;
                            let value = self.value()?;
                            self.expect_end("member")?;
                            members.insert(name, value);
                        }
                        Event::End(e) if e.local_name().as_ref() == b"struct" => break,
                        other => return Err(unexpected("struct member", &other)),
                    }
                }
                Ok(RpcValue::Struct(members))
            }
            other => Err(TransportError::Decode(format!(
                "unsupported value type <{}>",
                other
            ))),
        }
    }

    /// Collect character data until the end tag `name`.
    fn text_until(&mut self, name: &str) -> Result<String, TransportError> {
        let mut text = String::new();
        loop {
            match self.next_event()? {
                Event::Text(e) => {
                    let unescaped = e.unescape().map_err(decode_error)?;
                    text.push_str(&unescaped);
                }
                Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
                Event::End(e) if e.local_name().as_ref() == name.as_bytes() => return Ok(text),
                other => return Err(unexpected(name, &other)),
            }
        }
    }

    fn expect_start(&mut self, name: &str) -> Result<(), TransportError> {
        match self.next_structural()? {
            Event::Start(e) if e.local_name().as_ref() == name.as_bytes() => Ok(()),
            other => Err(unexpected(name, &other)),
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<(), TransportError> {
        match self.next_structural()? {
            Event::End(e) if e.local_name().as_ref() == name.as_bytes() => Ok(()),
            other => Err(unexpected(name, &other)),
        }
    }

    /// Next event that is not whitespace-only text.
    fn next_structural(&mut self) -> Result<Event<'a>, TransportError> {
        loop {
            let event = self.next_event()?;
            if let Event::Text(ref e) = event
                && e.iter().all(u8::is_ascii_whitespace)
            {
                continue;
            }
            return Ok(event);
        }
    }

    /// Next event, skipping prolog, comments and processing instructions.
    fn next_event(&mut self) -> Result<Event<'a>, TransportError> {
        loop {
            match self.reader.read_event().map_err(decode_error)? {
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
                Event::Eof => {
                    return Err(TransportError::Decode(
                        "unexpected end of response".to_string(),
                    ));
                }
                event => return Ok(event),
            }
        }
    }
}

fn fault_error(fault: RpcValue) -> TransportError {
    match fault {
        RpcValue::Struct(members) => TransportError::Fault {
            code: members
                .get("faultCode")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            message: members
                .get("faultString")
                .map(|v| v.to_string())
                .unwrap_or_default(),
        },
        other => TransportError::Fault {
            code: 0,
            message: other.to_string(),
        },
    }
}

fn decode_error(err: quick_xml::Error) -> TransportError {
    TransportError::Decode(err.to_string())
}

fn unexpected(expected: &str, found: &Event<'_>) -> TransportError {
    TransportError::Decode(format!("expected <{}>, found {:?}", expected, found))
}
