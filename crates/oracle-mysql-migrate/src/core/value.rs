//! Value codec: raw driver bytes to MySQL literal fragments.
//!
//! The source driver hands every field over as raw bytes plus a per-column
//! scan kind reported once with the result metadata. The codec collapses
//! that into a closed [`ColumnKind`] tag per column, then encodes each field
//! with a single tag switch - no per-row type inspection.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{MigrateError, Result};

/// Scan kind reported by the source driver for a result column.
///
/// This mirrors the driver's runtime value classes: plain integers and
/// floats scan as native widths, high-precision NUMBER comes back as a
/// decimal string, and everything else is opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanKind {
    Int64,
    UInt64,
    Float32,
    Float64,
    Rune,
    /// High-precision decimal (Oracle NUMBER without a native width).
    Number,
    /// Anything else: character data, LOBs, formatted dates.
    Bytes,
}

/// Encoding decision for one column, fixed at projection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Uint,
    Float,
    Double,
    Rune,
    Number,
    Text,
}

impl ColumnKind {
    /// Map a driver scan kind to the codec tag for the column.
    pub fn from_scan(scan: ScanKind) -> Self {
        match scan {
            ScanKind::Int64 => ColumnKind::Int,
            ScanKind::UInt64 => ColumnKind::Uint,
            ScanKind::Float32 => ColumnKind::Float,
            ScanKind::Float64 => ColumnKind::Double,
            ScanKind::Rune => ColumnKind::Rune,
            ScanKind::Number => ColumnKind::Number,
            ScanKind::Bytes => ColumnKind::Text,
        }
    }
}

/// Encode one field as a MySQL literal fragment.
///
/// Oracle folds the empty string into NULL, so both a missing field and an
/// empty one become the literal `NULL`. Numeric kinds are parsed and
/// re-formatted; NUMBER goes through an arbitrary-precision decimal and is
/// emitted as an integer when integral, otherwise as a 64-bit float literal.
/// Everything else is escaped and single-quoted.
pub fn encode_field(kind: ColumnKind, column: &str, raw: Option<&[u8]>) -> Result<String> {
    let raw = match raw {
        None => return Ok("NULL".to_string()),
        Some(b) if b.is_empty() => return Ok("NULL".to_string()),
        Some(b) => b,
    };

    match kind {
        ColumnKind::Int => {
            let v: i64 = parse_utf8(column, raw)?;
            Ok(v.to_string())
        }
        ColumnKind::Uint => {
            let v: u64 = parse_utf8(column, raw)?;
            Ok(v.to_string())
        }
        ColumnKind::Float => {
            let v: f32 = parse_utf8(column, raw)?;
            Ok(v.to_string())
        }
        ColumnKind::Double => {
            let v: f64 = parse_utf8(column, raw)?;
            Ok(v.to_string())
        }
        ColumnKind::Rune => {
            let v: i32 = parse_utf8(column, raw)?;
            Ok(v.to_string())
        }
        ColumnKind::Number => {
            let text = utf8(column, raw)?;
            let d = Decimal::from_str(text.trim())
                .map_err(|e| MigrateError::codec(column, format!("decimal {:?}: {}", text, e)))?;
            if d.is_integer() {
                Ok(d.normalize().to_string())
            } else {
                let v: f64 = text
                    .trim()
                    .parse()
                    .map_err(|e| MigrateError::codec(column, format!("float {:?}: {}", text, e)))?;
                Ok(v.to_string())
            }
        }
        ColumnKind::Text => Ok(format!("'{}'", escape_mysql_bytes(raw))),
    }
}

/// Encode a full row as a parenthesized tuple literal.
pub fn encode_row(kinds: &[ColumnKind], names: &[String], row: &[Option<Vec<u8>>]) -> Result<String> {
    let mut fields = Vec::with_capacity(row.len());
    for (i, raw) in row.iter().enumerate() {
        let column = names.get(i).map(String::as_str).unwrap_or("?");
        let kind = kinds.get(i).copied().ok_or_else(|| {
            MigrateError::codec(column, "row has more fields than result columns")
        })?;
        fields.push(encode_field(kind, column, raw.as_deref())?);
    }
    Ok(format!("({})", fields.join(",")))
}

/// Backslash-escape the characters MySQL treats specially inside a quoted
/// string literal: NUL, newline, carriage return, backslash, both quote
/// characters, and ctrl-Z.
pub fn escape_mysql_bytes(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len() + 2);
    for &b in raw {
        match b {
            0x00 => out.extend_from_slice(b"\\0"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\'' => out.extend_from_slice(b"\\'"),
            b'"' => out.extend_from_slice(b"\\\""),
            0x1a => out.extend_from_slice(b"\\Z"),
            _ => out.push(b),
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn utf8<'a>(column: &str, raw: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(raw).map_err(|e| MigrateError::codec(column, e))
}

fn parse_utf8<T>(column: &str, raw: &[u8]) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = utf8(column, raw)?;
    text.trim()
        .parse()
        .map_err(|e| MigrateError::codec(column, format!("{:?}: {}", text, e)))
}
