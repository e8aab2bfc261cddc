//! Extract integers from JSON-RPC responses.
//!
//! Nodes report numbers in three shapes: native JSON numbers, `0x`-prefixed hex strings and
//! decimal strings. Keys may address nested objects with dots (`result.number`).

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when extracting a number.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid json: {0}")]
    InvalidJson(String),
    #[error("missing key: {0}")]
    MissingKey(String),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("unsupported value at {0}")]
    UnsupportedType(String),
}

/// Extracts the integer stored at `key` in the JSON document `body`.
pub fn integer(body: &[u8], key: &str) -> Result<u64, Error> {
    let value = big(body, key)?;
    u64::try_from(value).map_err(|_| Error::InvalidNumber(value.to_string()))
}

/// Extracts the (possibly very large) integer stored at `key` in the JSON document `body`.
pub fn big(body: &[u8], key: &str) -> Result<u128, Error> {
    let document: Value =
        serde_json::from_slice(body).map_err(|e| Error::InvalidJson(e.to_string()))?;
    let value = lookup(&document, key)?;
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(u128::from)
            .or_else(|| {
                // Floats without a fractional part (e.g. `1.0e3`) are accepted
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u128::MAX as f64)
                    .map(|f| f as u128)
            })
            .ok_or_else(|| Error::InvalidNumber(n.to_string())),
        Value::String(s) => number(s),
        _ => Err(Error::UnsupportedType(key.to_string())),
    }
}

/// Parses a bare number: `0x`-prefixed hex or decimal (leading zeros allowed).
pub fn number(s: &str) -> Result<u128, Error> {
    let trimmed = s.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some("") => None,
        Some(hex) => u128::from_str_radix(hex, 16).ok(),
        None => trimmed.parse::<u128>().ok(),
    };
    parsed.ok_or_else(|| Error::InvalidNumber(s.to_string()))
}

fn lookup<'a>(document: &'a Value, key: &str) -> Result<&'a Value, Error> {
    if let Some(value) = document.get(key) {
        return Ok(value);
    }
    let mut current = document;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| Error::MissingKey(key.to_string()))?;
    }
    Ok(current)
}
