//! Key type definitions
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


use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Token id meaning "the current token" in key requests
pub const CURRENT_TOKEN_ID: u32 = 0;

/// Key lifetime of a freshly created manager (one hour)
pub const DEFAULT_KEY_LIFETIME_MS: u32 = 3_600_000;

/// Opaque key material of one token.
///
/// The buffer is wiped when dropped and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecurityKey(Vec<u8>);

impl SecurityKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy the key material out, e.g. to put it on the wire
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.clone()
    }
}

impl fmt::Debug for SecurityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecurityKey(<{} bytes>)", self.0.len())
    }
}

impl From<Vec<u8>> for SecurityKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for SecurityKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// A window of consecutive tokens, as returned by `get_keys` and accepted by `set_keys`
#[derive(Clone, Default, PartialEq)]
pub struct KeySet {
    /// `None` when the manager has no policy configured
    pub security_policy_uri: Option<String>,
    pub first_token_id: u32,
    pub keys: Vec<SecurityKey>,
    pub time_to_next_key_ms: u32,
    pub key_lifetime_ms: u32,
}

impl KeySet {
    pub fn len(&self) -> u32 {
        u32::try_from(self.keys.len()).unwrap_or(u32::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// False when the set carries no usable token.
    ///
    /// Zero ids and durations are the protocol's "not valid" signal.
    pub fn is_valid(&self) -> bool {
        !self.keys.is_empty()
            && self.first_token_id != 0
            && self.time_to_next_key_ms != 0
            && self.key_lifetime_ms != 0
    }

    /// Id of the last token in the window, if the window is representable
    pub fn last_token_id(&self) -> Option<u32> {
        if self.keys.is_empty() {
            return None;
        }
        self.first_token_id.checked_add(self.len() - 1)
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySet")
            .field("security_policy_uri", &self.security_policy_uri)
            .field("first_token_id", &self.first_token_id)
            .field("keys", &format_args!("<{} keys>", self.keys.len()))
            .field("time_to_next_key_ms", &self.time_to_next_key_ms)
            .field("key_lifetime_ms", &self.key_lifetime_ms)
            .finish()
    }
}

/// PubSub security policies and their key layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityPolicy {
    PubSubAes128Ctr,
    PubSubAes256Ctr,
}

impl SecurityPolicy {
    pub const AES128_CTR_URI: &'static str =
        "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes128-CTR";
    pub const AES256_CTR_URI: &'static str =
        "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes256-CTR";

    pub fn uri(&self) -> &'static str {
        match self {
            SecurityPolicy::PubSubAes128Ctr => Self::AES128_CTR_URI,
            SecurityPolicy::PubSubAes256Ctr => Self::AES256_CTR_URI,
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            Self::AES128_CTR_URI => Some(SecurityPolicy::PubSubAes128Ctr),
            Self::AES256_CTR_URI => Some(SecurityPolicy::PubSubAes256Ctr),
            _ => None,
        }
    }

    pub fn signing_key_length(&self) -> usize {
        32
    }

    pub fn encrypting_key_length(&self) -> usize {
        match self {
            SecurityPolicy::PubSubAes128Ctr => 16,
            SecurityPolicy::PubSubAes256Ctr => 32,
        }
    }

    pub fn key_nonce_length(&self) -> usize {
        4
    }

    /// Length of one token: signing key, encrypting key and nonce concatenated
    pub fn key_length(&self) -> usize {
        self.signing_key_length() + self.encrypting_key_length() + self.key_nonce_length()
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Monotonic time source for key expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
