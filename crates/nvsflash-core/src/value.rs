//! Typed NVS values and their text encodings.
//!
//! The encoding names are the ones used in `nvs_partition_gen` CSV files:
//! `u8`, `i8`, `u16`, `i16`, `u32`, `i32`, `u64`, `i64`, `string`,
//! `hex2bin`, `base64` and `binary`.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::NvsError;
use crate::nvs::ItemType;

/// Value encoding named in an input row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    String,
    Hex2bin,
    Base64,
    Binary,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::U8 => "u8",
            Encoding::I8 => "i8",
            Encoding::U16 => "u16",
            Encoding::I16 => "i16",
            Encoding::U32 => "u32",
            Encoding::I32 => "i32",
            Encoding::U64 => "u64",
            Encoding::I64 => "i64",
            Encoding::String => "string",
            Encoding::Hex2bin => "hex2bin",
            Encoding::Base64 => "base64",
            Encoding::Binary => "binary",
        }
    }
}

impl FromStr for Encoding {
    type Err = NvsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "u8" => Encoding::U8,
            "i8" => Encoding::I8,
            "u16" => Encoding::U16,
            "i16" => Encoding::I16,
            "u32" => Encoding::U32,
            "i32" => Encoding::I32,
            "u64" => Encoding::U64,
            "i64" => Encoding::I64,
            "string" => Encoding::String,
            "hex2bin" => Encoding::Hex2bin,
            "base64" => Encoding::Base64,
            "binary" => Encoding::Binary,
            _ => return Err(NvsError::UnsupportedEncoding(s.to_string())),
        })
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value as stored in NVS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum NvsValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    #[serde(rename = "string")]
    Str(String),
    Blob(Vec<u8>),
}

impl NvsValue {
    /// Parse `raw` as `encoding`. `key` is only used in error messages.
    ///
    /// `binary` has no text form; it is only produced from file contents.
    pub fn parse(key: &str, encoding: Encoding, raw: &str) -> Result<Self, NvsError> {
        let enc = encoding.as_str();
        match encoding {
            Encoding::U8 => int(key, enc, raw).map(NvsValue::U8),
            Encoding::I8 => int(key, enc, raw).map(NvsValue::I8),
            Encoding::U16 => int(key, enc, raw).map(NvsValue::U16),
            Encoding::I16 => int(key, enc, raw).map(NvsValue::I16),
            Encoding::U32 => int(key, enc, raw).map(NvsValue::U32),
            Encoding::I32 => int(key, enc, raw).map(NvsValue::I32),
            Encoding::U64 => int(key, enc, raw).map(NvsValue::U64),
            Encoding::I64 => int(key, enc, raw).map(NvsValue::I64),
            Encoding::String => Ok(NvsValue::Str(raw.to_string())),
            Encoding::Hex2bin => {
                let digits = raw.trim();
                if digits.len() % 2 != 0 {
                    return Err(NvsError::invalid_value(
                        key,
                        enc,
                        "Invalid data length. Should be multiple of 2.",
                    ));
                }
                hex::decode(digits)
                    .map(NvsValue::Blob)
                    .map_err(|e| NvsError::invalid_value(key, enc, e.to_string()))
            }
            Encoding::Base64 => {
                let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map(NvsValue::Blob)
                    .map_err(|e| NvsError::invalid_value(key, enc, e.to_string()))
            }
            Encoding::Binary => Err(NvsError::invalid_value(
                key,
                enc,
                "binary values must come from a file entry",
            )),
        }
    }

    /// Decode file contents for a `file` row.
    pub fn from_file(key: &str, encoding: Encoding, contents: Vec<u8>) -> Result<Self, NvsError> {
        match encoding {
            Encoding::Binary => Ok(NvsValue::Blob(contents)),
            _ => {
                let text = String::from_utf8(contents).map_err(|_| {
                    NvsError::invalid_value(key, encoding.as_str(), "file is not valid UTF-8")
                })?;
                Self::parse(key, encoding, &text)
            }
        }
    }

    /// Item type and little-endian bytes of an integer value.
    pub fn primitive_bytes(&self) -> Option<(ItemType, Vec<u8>)> {
        Some(match *self {
            NvsValue::U8(v) => (ItemType::U8, v.to_le_bytes().to_vec()),
            NvsValue::I8(v) => (ItemType::I8, v.to_le_bytes().to_vec()),
            NvsValue::U16(v) => (ItemType::U16, v.to_le_bytes().to_vec()),
            NvsValue::I16(v) => (ItemType::I16, v.to_le_bytes().to_vec()),
            NvsValue::U32(v) => (ItemType::U32, v.to_le_bytes().to_vec()),
            NvsValue::I32(v) => (ItemType::I32, v.to_le_bytes().to_vec()),
            NvsValue::U64(v) => (ItemType::U64, v.to_le_bytes().to_vec()),
            NvsValue::I64(v) => (ItemType::I64, v.to_le_bytes().to_vec()),
            NvsValue::Str(_) | NvsValue::Blob(_) => return None,
        })
    }

    /// Rebuild an integer value from an entry's data field.
    pub fn from_primitive(item_type: ItemType, data: &[u8; 8]) -> Option<Self> {
        let b = data;
        Some(match item_type {
            ItemType::U8 => NvsValue::U8(b[0]),
            ItemType::I8 => NvsValue::I8(b[0] as i8),
            ItemType::U16 => NvsValue::U16(u16::from_le_bytes([b[0], b[1]])),
            ItemType::I16 => NvsValue::I16(i16::from_le_bytes([b[0], b[1]])),
            ItemType::U32 => NvsValue::U32(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ItemType::I32 => NvsValue::I32(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ItemType::U64 => NvsValue::U64(u64::from_le_bytes(*b)),
            ItemType::I64 => NvsValue::I64(i64::from_le_bytes(*b)),
            _ => return None,
        })
    }

    /// Encoding name matching this value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            NvsValue::U8(_) => "u8",
            NvsValue::I8(_) => "i8",
            NvsValue::U16(_) => "u16",
            NvsValue::I16(_) => "i16",
            NvsValue::U32(_) => "u32",
            NvsValue::I32(_) => "i32",
            NvsValue::U64(_) => "u64",
            NvsValue::I64(_) => "i64",
            NvsValue::Str(_) => "string",
            NvsValue::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for NvsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NvsValue::U8(v) => write!(f, "{v}"),
            NvsValue::I8(v) => write!(f, "{v}"),
            NvsValue::U16(v) => write!(f, "{v}"),
            NvsValue::I16(v) => write!(f, "{v}"),
            NvsValue::U32(v) => write!(f, "{v}"),
            NvsValue::I32(v) => write!(f, "{v}"),
            NvsValue::U64(v) => write!(f, "{v}"),
            NvsValue::I64(v) => write!(f, "{v}"),
            NvsValue::Str(s) => write!(f, "{s:?}"),
            NvsValue::Blob(data) => write!(f, "{} bytes: {}", data.len(), hex::encode(data)),
        }
    }
}

/// Parse decimal (optionally signed) or `0x` hex and range-check it.
fn int<T: TryFrom<i128>>(key: &str, encoding: &str, raw: &str) -> Result<T, NvsError> {
    let text = raw.trim().replace('_', "");
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(&text)),
    };

    let not_an_integer =
        || NvsError::invalid_value(key, encoding, format!("`{raw}` is not an integer"));
    let (radix, body) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => (16, hex),
        None => (10, digits),
    };
    // `from_str_radix` takes its own sign; only the one before `0x` counts.
    if body.starts_with(['+', '-']) {
        return Err(not_an_integer());
    }

    let magnitude = i128::from_str_radix(body, radix).map_err(|_| not_an_integer())?;
    let value = if negative {
        magnitude.checked_neg().ok_or_else(|| {
            NvsError::invalid_value(key, encoding, format!("`{raw}` is out of range"))
        })?
    } else {
        magnitude
    };
    T::try_from(value)
        .map_err(|_| NvsError::invalid_value(key, encoding, format!("{value} is out of range")))
}
