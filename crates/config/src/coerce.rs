//! Permissive conversions applied by the typed accessors.
//!
//! Values stay untyped inside the engine; these helpers decide what a caller
//! asking for a `bool` or an `i64` gets out of a string read from an
//! environment variable or a float read from JSON.

use crate::{
    error::{Error, Result},
    value::Value,
};

/// Render a leaf as text. Tables and arrays do not convert.
#[must_use]
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(x) => Some(x.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

/// Booleans pass through, numbers are `true` when non-zero, and strings use
/// the usual spellings (`1`, `t`, `true`, `TRUE`, `0`, `f`, ...).
#[must_use]
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Integer(i) => Some(*i != 0),
        Value::Float(x) => Some(*x != 0.0),
        Value::String(s) => parse_bool(s.trim()),
        Value::Array(_) | Value::Table(_) => None,
    }
}

/// Floats truncate toward zero, booleans map to 0/1, strings parse as
/// decimal or `0x`/`0o`/`0b` prefixed integers.
#[must_use]
pub fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(x) if x.is_finite() => Some(x.trunc() as i64),
        Value::Boolean(b) => Some(i64::from(*b)),
        Value::String(s) => parse_int(s.trim()),
        Value::Float(_) | Value::Array(_) | Value::Table(_) => None,
    }
}

#[must_use]
pub fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(x) => Some(*x),
        #[allow(clippy::cast_precision_loss)]
        Value::Integer(i) => Some(*i as f64),
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(_) | Value::Table(_) => None,
    }
}

pub fn to_string(key: &str, value: &Value) -> Result<String> {
    as_string(value).ok_or_else(|| coercion_error(key, "string", value))
}

pub fn to_bool(key: &str, value: &Value) -> Result<bool> {
    as_bool(value).ok_or_else(|| coercion_error(key, "bool", value))
}

pub fn to_int(key: &str, value: &Value) -> Result<i64> {
    as_int(value).ok_or_else(|| coercion_error(key, "integer", value))
}

pub fn to_float(key: &str, value: &Value) -> Result<f64> {
    as_float(value).ok_or_else(|| coercion_error(key, "float", value))
}

fn coercion_error(key: &str, expected: &'static str, value: &Value) -> Error {
    let found = match value {
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) | Value::Table(_) => value.kind().to_owned(),
        leaf => format!("{} {leaf}", leaf.kind()),
    };
    Error::Coercion {
        key: key.to_owned(),
        expected,
        found,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_int(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = if let Some(hex) = lower.strip_prefix("0x") {
        (16, hex)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (8, oct)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (2, bin)
    } else {
        (10, lower.as_str())
    };
    if body.is_empty() || body.starts_with(['+', '-']) {
        return None;
    }
    if negative {
        i64::from_str_radix(&format!("-{body}"), radix).ok()
    } else {
        i64::from_str_radix(body, radix).ok()
    }
}
