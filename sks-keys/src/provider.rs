//! Key providers
//!
//! Providers produce key material on demand. They never store what they
//! produce: builders hand the result to a [`KeyManager`](crate::KeyManager).
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
use crate::key_types::{KeySet, SecurityKey, SecurityPolicy};
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of new key material
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Produce up to `nb_requested` keys.
    ///
    /// `starting_token_id` is a hint that local generators ignore.
    async fn get_keys(&self, starting_token_id: u32, nb_requested: u32) -> KeyResult<KeySet>;
}

/// Cryptographically secure byte source
pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> KeyResult<()>;
}

/// Operating system RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandomSource;

impl RandomSource for OsRandomSource {
    fn fill(&self, buf: &mut [u8]) -> KeyResult<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| KeyError::Crypto(e.to_string()))
    }
}

/// Generates random keys sized for a PubSub security policy
pub struct RandomKeyProvider {
    policy: SecurityPolicy,
    max_keys: u32,
    source: Arc<dyn RandomSource>,
}

impl RandomKeyProvider {
    /// Create a generator that produces at most `max_keys` keys per call
    pub fn new(policy: SecurityPolicy, max_keys: u32) -> KeyResult<Self> {
        Self::with_source(policy, max_keys, Arc::new(OsRandomSource))
    }

    pub fn with_source(
        policy: SecurityPolicy,
        max_keys: u32,
        source: Arc<dyn RandomSource>,
    ) -> KeyResult<Self> {
        if max_keys == 0 {
            return Err(KeyError::InvalidParameters(
                "random provider needs max_keys > 0".to_string(),
            ));
        }
        Ok(Self {
            policy,
            max_keys,
            source,
        })
    }

    pub fn policy(&self) -> SecurityPolicy {
        self.policy
    }

    fn generate(&self, count: usize) -> KeyResult<Vec<SecurityKey>> {
        let key_length = self.policy.key_length();
        let mut keys = Vec::new();
        keys.try_reserve_exact(count)?;

        for _ in 0..count {
            let mut bytes = Vec::new();
            bytes.try_reserve_exact(key_length)?;
            bytes.resize(key_length, 0);
            // Wrapped before filling so that a failed fill still wipes the buffer
            let mut key = SecurityKey::from(bytes);
            self.source.fill(key.as_mut_bytes())?;
            keys.push(key);
        }
        Ok(keys)
    }
}

#[async_trait]
impl KeyProvider for RandomKeyProvider {
    async fn get_keys(&self, _starting_token_id: u32, nb_requested: u32) -> KeyResult<KeySet> {
        if nb_requested == 0 {
            return Err(KeyError::InvalidParameters(
                "requested key count must be greater than 0".to_string(),
            ));
        }

        let count = nb_requested.min(self.max_keys);
        let keys = self.generate(count as usize)?;
        debug!(
            policy = %self.policy,
            count = count,
            key_length = self.policy.key_length(),
            "Generated random keys"
        );

        Ok(KeySet {
            security_policy_uri: Some(self.policy.uri().to_string()),
            keys,
            ..KeySet::default()
        })
    }
}

/// Asks each provider in turn until one returns keys
pub struct TryListProvider {
    providers: Vec<Arc<dyn KeyProvider>>,
}

impl TryListProvider {
    pub fn new(providers: Vec<Arc<dyn KeyProvider>>) -> KeyResult<Self> {
        if providers.is_empty() {
            return Err(KeyError::InvalidParameters(
                "try-list provider needs at least one provider".to_string(),
            ));
        }
        Ok(Self { providers })
    }
}

#[async_trait]
impl KeyProvider for TryListProvider {
    async fn get_keys(&self, starting_token_id: u32, nb_requested: u32) -> KeyResult<KeySet> {
        let mut last = Ok(KeySet::default());

        for (index, provider) in self.providers.iter().enumerate() {
            match provider.get_keys(starting_token_id, nb_requested).await {
                Ok(set) if !set.is_empty() => return Ok(set),
                Ok(set) => {
                    debug!(index = index, "Provider returned no keys, trying next");
                    last = Ok(set);
                }
                Err(e) => {
                    warn!(index = index, error = %e, "Provider failed, trying next");
                    last = Err(e);
                }
            }
        }
        last
    }
}
