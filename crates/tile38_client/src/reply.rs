//! Decoding of Tile38 RESP replies.
//!
//! Search and scan commands answer with a two element array: the next
//! cursor (0 when exhausted) followed by the page of results.

use crate::error::{Error, Result};
use redis::Value;

/// An object returned by `SCAN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub id: String,
    /// Raw GeoJSON as stored.
    pub object: String,
}

/// Read a string-ish reply value.
pub fn value_to_string(value: &Value) -> Result<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone())
            .map_err(|e| Error::InvalidReply(format!("non utf-8 string: {}", e))),
        Value::SimpleString(s) => Ok(s.clone()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Okay => Ok("OK".to_string()),
        other => Err(Error::InvalidReply(format!("expected string, got {:?}", other))),
    }
}

/// Read the cursor element of a paged reply.
pub fn parse_cursor(value: &Value) -> Result<u64> {
    match value {
        Value::Int(n) if *n >= 0 => Ok(*n as u64),
        Value::Int(n) => Err(Error::InvalidReply(format!("negative cursor {}", n))),
        other => {
            let s = value_to_string(other)?;
            s.trim()
                .parse()
                .map_err(|_| Error::InvalidReply(format!("invalid cursor '{}'", s)))
        }
    }
}

fn split_page(value: Value) -> Result<(u64, Vec<Value>)> {
    let mut parts = match value {
        Value::Array(parts) => parts,
        other => {
            return Err(Error::InvalidReply(format!(
                "expected [cursor, results], got {:?}",
                other
            )))
        }
    };
    if parts.len() < 2 {
        // An empty collection may answer with only the cursor.
        let cursor = match parts.first() {
            Some(c) => parse_cursor(c)?,
            None => 0,
        };
        return Ok((cursor, Vec::new()));
    }
    let items = match parts.swap_remove(1) {
        Value::Array(items) => items,
        Value::Nil => Vec::new(),
        other => {
            return Err(Error::InvalidReply(format!(
                "expected result array, got {:?}",
                other
            )))
        }
    };
    let cursor = parse_cursor(&parts[0])?;
    Ok((cursor, items))
}

/// Decode an `IDS` page.
pub fn parse_id_page(value: Value) -> Result<(u64, Vec<String>)> {
    let (cursor, items) = split_page(value)?;
    let ids = items
        .iter()
        .map(value_to_string)
        .collect::<Result<Vec<_>>>()?;
    Ok((cursor, ids))
}

/// Decode an `OBJECTS` page. Each entry is `[id, object]` optionally
/// followed by a fields array, which is ignored.
pub fn parse_object_page(value: Value) -> Result<(u64, Vec<StoredObject>)> {
    let (cursor, items) = split_page(value)?;
    let mut objects = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(entry) if entry.len() >= 2 => objects.push(StoredObject {
                id: value_to_string(&entry[0])?,
                object: value_to_string(&entry[1])?,
            }),
            other => {
                return Err(Error::InvalidReply(format!(
                    "expected [id, object], got {:?}",
                    other
                )))
            }
        }
    }
    Ok((cursor, objects))
}
