//! Method argument values
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use serde::{Deserialize, Serialize};
use std::fmt;

/// Subset of OPC UA variants used by the key service methods
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Variant {
    Null,
    String(String),
    UInt32(u32),
    /// `Duration` values are carried as milliseconds in a double
    Double(f64),
    ByteString(Vec<u8>),
    ByteStringArray(Vec<Vec<u8>>),
}

impl Variant {
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Null => "Null",
            Variant::String(_) => "String",
            Variant::UInt32(_) => "UInt32",
            Variant::Double(_) => "Double",
            Variant::ByteString(_) => "ByteString",
            Variant::ByteStringArray(_) => "ByteString[]",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Variant::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte_string(&self) -> Option<&[u8]> {
        match self {
            Variant::ByteString(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_byte_string_array(&self) -> Option<&[Vec<u8>]> {
        match self {
            Variant::ByteStringArray(items) => Some(items),
            _ => None,
        }
    }
}

// Byte strings usually hold key material: only their sizes are printed.
impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "Null"),
            Variant::String(s) => write!(f, "String({:?})", s),
            Variant::UInt32(v) => write!(f, "UInt32({})", v),
            Variant::Double(v) => write!(f, "Double({})", v),
            Variant::ByteString(bytes) => write!(f, "ByteString(<{} bytes>)", bytes.len()),
            Variant::ByteStringArray(items) => {
                write!(f, "ByteString[](<{} items>)", items.len())
            }
        }
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<u32> for Variant {
    fn from(value: u32) -> Self {
        Variant::UInt32(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}
