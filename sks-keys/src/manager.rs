//! Per security group key ring
//!
//! A [`KeyManager`] stores the ordered tokens of one security group, tracks
//! which token is current and hands out copies of the key window to
//! publishers, subscribers and remote peers.
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


use crate::error::{KeyError, KeyResult};
use crate::key_types::{
    Clock, KeySet, SecurityKey, SystemClock, CURRENT_TOKEN_ID, DEFAULT_KEY_LIFETIME_MS,
};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Opaque data attached to a manager by the application
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Key storage of one security group.
///
/// Every operation is atomic with respect to the others: the scheduler and
/// request handlers may call the same manager concurrently.
pub trait KeyManager: Send + Sync {
    fn security_group_id(&self) -> &str;

    fn user_data(&self) -> Option<UserData>;

    /// Number of stored tokens, expired ones included
    fn size(&self) -> u32;

    fn key_lifetime(&self) -> u32;

    fn set_key_lifetime(&self, lifetime_ms: u32) -> KeyResult<()>;

    fn security_policy_uri(&self) -> Option<String>;

    fn set_security_policy_uri(&self, uri: &str) -> KeyResult<()>;

    /// Replace the whole ring with `key_set`
    fn set_keys(&self, key_set: KeySet) -> KeyResult<()>;

    /// Append tokens after the last stored one and return how many were added
    fn add_keys(&self, keys: Vec<SecurityKey>) -> KeyResult<u32>;

    /// Copy up to `nb_requested` tokens starting at `starting_token_id`
    /// (`CURRENT_TOKEN_ID` for the current token)
    fn get_keys(&self, starting_token_id: u32, nb_requested: u32) -> KeyResult<KeySet>;

    /// Time in ms until the last stored token expires, 0 when none is usable
    fn all_keys_lifetime(&self) -> u32;

    /// Drop every stored token
    fn clear(&self);
}

#[derive(Default)]
struct KeyRing {
    first_token_id: u32,
    /// Wider than a token id so that running past `u32::MAX` is representable
    current_token_id: u64,
    current_token_expiry: Option<Instant>,
    keys: Vec<SecurityKey>,
}

impl KeyRing {
    fn last_token_id(&self) -> u64 {
        self.first_token_id as u64 + self.keys.len() as u64 - 1
    }

    /// Move the current token forward for every lifetime elapsed since its expiry
    fn advance(&mut self, now: Instant, lifetime_ms: u32) {
        let Some(expiry) = self.current_token_expiry else {
            return;
        };
        if now < expiry {
            return;
        }

        let overdue_ms = (now - expiry).as_millis();
        let steps = u64::try_from(overdue_ms / lifetime_ms as u128 + 1).unwrap_or(u64::MAX);
        self.current_token_id = self.current_token_id.saturating_add(steps);

        let shift = Duration::from_millis((lifetime_ms as u64).saturating_mul(steps));
        let next_expiry = expiry
            .checked_add(shift)
            .unwrap_or(now + Duration::from_millis(lifetime_ms as u64));
        self.current_token_expiry = Some(next_expiry);
    }

    fn remaining_ms(&self, now: Instant) -> u32 {
        let Some(expiry) = self.current_token_expiry else {
            return 0;
        };
        let nanos = expiry.saturating_duration_since(now).as_nanos();
        let millis = nanos.div_ceil(1_000_000);
        u32::try_from(millis).unwrap_or(u32::MAX)
    }
}

struct ManagerState {
    security_policy_uri: Option<String>,
    key_lifetime_ms: u32,
    ring: KeyRing,
}

/// In-memory [`KeyManager`] guarded by a single mutex
pub struct KeyRingManager {
    security_group_id: String,
    user_data: Option<UserData>,
    clock: Arc<dyn Clock>,
    state: Mutex<ManagerState>,
}

impl KeyRingManager {
    pub fn new(security_group_id: impl Into<String>, user_data: Option<UserData>) -> Self {
        Self::with_clock(security_group_id, user_data, Arc::new(SystemClock))
    }

    pub fn with_clock(
        security_group_id: impl Into<String>,
        user_data: Option<UserData>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            security_group_id: security_group_id.into(),
            user_data,
            clock,
            state: Mutex::new(ManagerState {
                security_policy_uri: None,
                key_lifetime_ms: DEFAULT_KEY_LIFETIME_MS,
                ring: KeyRing::default(),
            }),
        }
    }
}

impl KeyManager for KeyRingManager {
    fn security_group_id(&self) -> &str {
        &self.security_group_id
    }

    fn user_data(&self) -> Option<UserData> {
        self.user_data.clone()
    }

    fn size(&self) -> u32 {
        let state = self.state.lock();
        u32::try_from(state.ring.keys.len()).unwrap_or(u32::MAX)
    }

    fn key_lifetime(&self) -> u32 {
        self.state.lock().key_lifetime_ms
    }

    fn set_key_lifetime(&self, lifetime_ms: u32) -> KeyResult<()> {
        if lifetime_ms == 0 {
            return Err(KeyError::InvalidParameters(
                "key lifetime must be greater than 0".to_string(),
            ));
        }
        self.state.lock().key_lifetime_ms = lifetime_ms;
        Ok(())
    }

    fn security_policy_uri(&self) -> Option<String> {
        self.state.lock().security_policy_uri.clone()
    }

    fn set_security_policy_uri(&self, uri: &str) -> KeyResult<()> {
        if uri.is_empty() {
            return Err(KeyError::InvalidParameters(
                "security policy URI is empty".to_string(),
            ));
        }
        self.state.lock().security_policy_uri = Some(uri.to_string());
        Ok(())
    }

    fn set_keys(&self, key_set: KeySet) -> KeyResult<()> {
        if key_set.keys.is_empty() {
            return Err(KeyError::InvalidParameters("no keys to set".to_string()));
        }
        if key_set.first_token_id == 0 {
            return Err(KeyError::InvalidParameters(
                "first token id must not be 0".to_string(),
            ));
        }
        if key_set.key_lifetime_ms == 0 {
            return Err(KeyError::InvalidParameters(
                "key lifetime must be greater than 0".to_string(),
            ));
        }
        if key_set.last_token_id().is_none() {
            return Err(KeyError::InvalidParameters(format!(
                "{} keys starting at token {} overflow the token id space",
                key_set.keys.len(),
                key_set.first_token_id
            )));
        }
        if matches!(key_set.security_policy_uri.as_deref(), Some("")) {
            return Err(KeyError::InvalidParameters(
                "security policy URI is empty".to_string(),
            ));
        }

        let now = self.clock.now();
        let nb_keys = key_set.keys.len();
        let KeySet {
            security_policy_uri,
            first_token_id,
            keys,
            time_to_next_key_ms,
            key_lifetime_ms,
        } = key_set;

        let mut state = self.state.lock();
        if security_policy_uri.is_some() {
            state.security_policy_uri = security_policy_uri;
        }
        state.key_lifetime_ms = key_lifetime_ms;
        // The previous ring is dropped here and its keys wiped
        state.ring = KeyRing {
            first_token_id,
            current_token_id: first_token_id as u64,
            current_token_expiry: Some(now + Duration::from_millis(time_to_next_key_ms as u64)),
            keys,
        };
        drop(state);

        debug!(
            security_group_id = %self.security_group_id,
            first_token_id = first_token_id,
            nb_keys = nb_keys,
            time_to_next_key_ms = time_to_next_key_ms,
            key_lifetime_ms = key_lifetime_ms,
            "Key ring replaced"
        );
        Ok(())
    }

    fn add_keys(&self, keys: Vec<SecurityKey>) -> KeyResult<u32> {
        if keys.is_empty() {
            return Ok(0);
        }

        let now = self.clock.now();
        let mut state = self.state.lock();
        let lifetime_ms = state.key_lifetime_ms;
        let ring = &mut state.ring;
        let mut added: u32 = 0;

        for key in keys {
            if ring.keys.is_empty() {
                if ring.keys.try_reserve(1).is_err() {
                    warn!(security_group_id = %self.security_group_id, "Allocation failed while adding keys");
                    break;
                }
                ring.first_token_id = 1;
                ring.current_token_id = 1;
                ring.current_token_expiry = Some(now + Duration::from_millis(lifetime_ms as u64));
                ring.keys.push(key);
                added += 1;
                continue;
            }

            if ring.last_token_id() >= u32::MAX as u64 {
                warn!(
                    security_group_id = %self.security_group_id,
                    "Token id space exhausted, remaining keys not added"
                );
                break;
            }
            if ring.keys.try_reserve(1).is_err() {
                warn!(security_group_id = %self.security_group_id, "Allocation failed while adding keys");
                break;
            }
            ring.keys.push(key);
            added += 1;
        }

        debug!(
            security_group_id = %self.security_group_id,
            added = added,
            size = ring.keys.len(),
            "Keys appended"
        );
        Ok(added)
    }

    fn get_keys(&self, starting_token_id: u32, nb_requested: u32) -> KeyResult<KeySet> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.ring.keys.is_empty() {
            return Ok(KeySet::default());
        }
        if nb_requested == 0 {
            return Err(KeyError::InvalidParameters(
                "requested key count must be greater than 0".to_string(),
            ));
        }

        let lifetime_ms = state.key_lifetime_ms;
        state.ring.advance(now, lifetime_ms);
        let ring = &state.ring;
        let last = ring.last_token_id();

        let start = if starting_token_id == CURRENT_TOKEN_ID
            || starting_token_id as u64 == ring.current_token_id
        {
            if ring.current_token_id > last {
                debug!(security_group_id = %self.security_group_id, "Every stored key has expired");
                return Ok(KeySet::default());
            }
            ring.current_token_id
        } else {
            let id = starting_token_id as u64;
            if id < ring.first_token_id as u64 || id > last {
                return Err(KeyError::TokenNotFound(starting_token_id));
            }
            id
        };

        let offset = (start - ring.first_token_id as u64) as usize;
        let available = ring.keys.len() - offset;
        let count = available.min(nb_requested as usize);

        let mut keys = Vec::new();
        keys.try_reserve_exact(count)?;
        keys.extend(ring.keys[offset..offset + count].iter().cloned());

        Ok(KeySet {
            security_policy_uri: state.security_policy_uri.clone(),
            first_token_id: start as u32,
            keys,
            time_to_next_key_ms: ring.remaining_ms(now),
            key_lifetime_ms: lifetime_ms,
        })
    }

    fn all_keys_lifetime(&self) -> u32 {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if state.ring.keys.is_empty() {
            return 0;
        }

        let lifetime_ms = state.key_lifetime_ms;
        state.ring.advance(now, lifetime_ms);
        let ring = &state.ring;
        let last = ring.last_token_id();
        if ring.current_token_id > last {
            return 0;
        }

        let future_tokens = last - ring.current_token_id;
        let total = (ring.remaining_ms(now) as u64)
            .saturating_add((lifetime_ms as u64).saturating_mul(future_tokens));
        u32::try_from(total).unwrap_or(u32::MAX)
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        let dropped = state.ring.keys.len();
        state.ring = KeyRing::default();
        drop(state);

        info!(
            security_group_id = %self.security_group_id,
            dropped = dropped,
            "Key ring cleared"
        );
    }
}
