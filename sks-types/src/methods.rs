//! Argument contracts of the `GetSecurityKeys` and `SetSecurityKeys` methods
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


use crate::error::{Result, TypesError};
use crate::variant::Variant;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Browse name of the key pull method
pub const GET_SECURITY_KEYS: &str = "GetSecurityKeys";
/// Browse name of the key push method
pub const SET_SECURITY_KEYS: &str = "SetSecurityKeys";

const GET_SECURITY_KEYS_INPUTS: usize = 3;
const GET_SECURITY_KEYS_OUTPUTS: usize = 5;
const SET_SECURITY_KEYS_INPUTS: usize = 7;

// ============================================================================
// Argument decoding helpers
// ============================================================================

fn expect_count(args: &[Variant], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(TypesError::ArgumentCount {
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

fn type_error(args: &[Variant], index: usize, name: &'static str, expected: &'static str) -> TypesError {
    TypesError::ArgumentType {
        index,
        name,
        expected,
        actual: args[index].type_name(),
    }
}

fn string_arg(args: &[Variant], index: usize, name: &'static str) -> Result<String> {
    args[index]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| type_error(args, index, name, "String"))
}

fn u32_arg(args: &[Variant], index: usize, name: &'static str) -> Result<u32> {
    args[index]
        .as_u32()
        .ok_or_else(|| type_error(args, index, name, "UInt32"))
}

fn f64_arg(args: &[Variant], index: usize, name: &'static str) -> Result<f64> {
    args[index]
        .as_f64()
        .ok_or_else(|| type_error(args, index, name, "Double"))
}

fn bytes_arg(args: &[Variant], index: usize, name: &'static str) -> Result<Vec<u8>> {
    args[index]
        .as_byte_string()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| type_error(args, index, name, "ByteString"))
}

fn bytes_array_arg(args: &[Variant], index: usize, name: &'static str) -> Result<Vec<Vec<u8>>> {
    match &args[index] {
        Variant::ByteStringArray(items) => Ok(items.clone()),
        // An empty array may be encoded as a null variant
        Variant::Null => Ok(Vec::new()),
        _ => Err(type_error(args, index, name, "ByteString[]")),
    }
}

/// Convert an OPC UA `Duration` (ms as double) to integral milliseconds.
///
/// Negative, non-finite and values above `u32::MAX` are rejected.
pub fn duration_to_millis(value: f64, name: &str) -> Result<u32> {
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return Err(TypesError::InvalidArgument(format!(
            "{} out of range: {}",
            name, value
        )));
    }
    Ok(value as u32)
}

// ============================================================================
// GetSecurityKeys
// ============================================================================

/// Input arguments of `GetSecurityKeys`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSecurityKeysRequest {
    pub security_group_id: String,
    /// `0` asks for the current token
    pub starting_token_id: u32,
    pub requested_key_count: u32,
}

impl GetSecurityKeysRequest {
    pub fn new(security_group_id: impl Into<String>, starting_token_id: u32, requested_key_count: u32) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            starting_token_id,
            requested_key_count,
        }
    }

    /// Decode the three input arguments `(String, UInt32, UInt32)`
    pub fn from_arguments(args: &[Variant]) -> Result<Self> {
        expect_count(args, GET_SECURITY_KEYS_INPUTS)?;
        Ok(Self {
            security_group_id: string_arg(args, 0, "SecurityGroupId")?,
            starting_token_id: u32_arg(args, 1, "StartingTokenId")?,
            requested_key_count: u32_arg(args, 2, "RequestedKeyCount")?,
        })
    }

    pub fn into_arguments(self) -> Vec<Variant> {
        vec![
            Variant::String(self.security_group_id),
            Variant::UInt32(self.starting_token_id),
            Variant::UInt32(self.requested_key_count),
        ]
    }
}

/// Output arguments of `GetSecurityKeys`
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GetSecurityKeysResponse {
    pub security_policy_uri: String,
    pub first_token_id: u32,
    /// Keys for `first_token_id`, `first_token_id + 1`, ...
    pub keys: Vec<Vec<u8>>,
    pub time_to_next_key_ms: f64,
    pub key_lifetime_ms: f64,
}

impl GetSecurityKeysResponse {
    /// Decode the five output arguments
    pub fn from_arguments(args: &[Variant]) -> Result<Self> {
        expect_count(args, GET_SECURITY_KEYS_OUTPUTS)?;
        Ok(Self {
            security_policy_uri: string_arg(args, 0, "SecurityPolicyUri")?,
            first_token_id: u32_arg(args, 1, "FirstTokenId")?,
            keys: bytes_array_arg(args, 2, "Keys")?,
            time_to_next_key_ms: f64_arg(args, 3, "TimeToNextKey")?,
            key_lifetime_ms: f64_arg(args, 4, "KeyLifetime")?,
        })
    }

    pub fn into_arguments(self) -> Vec<Variant> {
        vec![
            Variant::String(self.security_policy_uri),
            Variant::UInt32(self.first_token_id),
            Variant::ByteStringArray(self.keys),
            Variant::Double(self.time_to_next_key_ms),
            Variant::Double(self.key_lifetime_ms),
        ]
    }
}

impl fmt::Debug for GetSecurityKeysResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetSecurityKeysResponse")
            .field("security_policy_uri", &self.security_policy_uri)
            .field("first_token_id", &self.first_token_id)
            .field("keys", &format_args!("<{} keys>", self.keys.len()))
            .field("time_to_next_key_ms", &self.time_to_next_key_ms)
            .field("key_lifetime_ms", &self.key_lifetime_ms)
            .finish()
    }
}

// ============================================================================
// SetSecurityKeys
// ============================================================================

/// Input arguments of `SetSecurityKeys`
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSecurityKeysRequest {
    pub security_group_id: String,
    pub security_policy_uri: String,
    pub current_token_id: u32,
    pub current_key: Vec<u8>,
    pub future_keys: Vec<Vec<u8>>,
    pub time_to_next_key_ms: f64,
    pub key_lifetime_ms: f64,
}

impl SetSecurityKeysRequest {
    /// Decode the seven input arguments
    pub fn from_arguments(args: &[Variant]) -> Result<Self> {
        expect_count(args, SET_SECURITY_KEYS_INPUTS)?;
        Ok(Self {
            security_group_id: string_arg(args, 0, "SecurityGroupId")?,
            security_policy_uri: string_arg(args, 1, "SecurityPolicyUri")?,
            current_token_id: u32_arg(args, 2, "CurrentTokenId")?,
            current_key: bytes_arg(args, 3, "CurrentKey")?,
            future_keys: bytes_array_arg(args, 4, "FutureKeys")?,
            time_to_next_key_ms: f64_arg(args, 5, "TimeToNextKey")?,
            key_lifetime_ms: f64_arg(args, 6, "KeyLifetime")?,
        })
    }

    pub fn into_arguments(self) -> Vec<Variant> {
        vec![
            Variant::String(self.security_group_id),
            Variant::String(self.security_policy_uri),
            Variant::UInt32(self.current_token_id),
            Variant::ByteString(self.current_key),
            Variant::ByteStringArray(self.future_keys),
            Variant::Double(self.time_to_next_key_ms),
            Variant::Double(self.key_lifetime_ms),
        ]
    }

    /// Number of keys carried, current key included
    pub fn key_count(&self) -> usize {
        1 + self.future_keys.len()
    }
}

impl fmt::Debug for SetSecurityKeysRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetSecurityKeysRequest")
            .field("security_group_id", &self.security_group_id)
            .field("security_policy_uri", &self.security_policy_uri)
            .field("current_token_id", &self.current_token_id)
            .field("keys", &format_args!("<{} keys>", self.key_count()))
            .field("time_to_next_key_ms", &self.time_to_next_key_ms)
            .field("key_lifetime_ms", &self.key_lifetime_ms)
            .finish()
    }
}
