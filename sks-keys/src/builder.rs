//! Key builders
//!
//! A builder pulls keys from a provider and merges them into a manager.
//! Builders compose: [`TruncateBuilder`] and [`CallbackBuilder`] wrap another
//! builder and run after it.
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
use crate::key_types::CURRENT_TOKEN_ID;
use crate::manager::KeyManager;
use crate::provider::KeyProvider;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Strategy that merges provider output into a manager
#[async_trait]
pub trait KeyBuilder: Send + Sync {
    async fn update(&self, provider: &dyn KeyProvider, manager: &dyn KeyManager) -> KeyResult<()>;
}

/// Appends every key the provider returns
#[derive(Debug, Default)]
pub struct AppendBuilder;

impl AppendBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl KeyBuilder for AppendBuilder {
    async fn update(&self, provider: &dyn KeyProvider, manager: &dyn KeyManager) -> KeyResult<()> {
        let set = provider.get_keys(CURRENT_TOKEN_ID, u32::MAX).await?;
        let expected = set.len();
        let added = manager.add_keys(set.keys)?;

        if added != expected {
            return Err(KeyError::InvalidState(format!(
                "only {} of {} keys appended to {}",
                added,
                expected,
                manager.security_group_id()
            )));
        }

        debug!(
            security_group_id = %manager.security_group_id(),
            added = added,
            "Append builder done"
        );
        Ok(())
    }
}

/// Keeps at most `max_size` tokens after the inner builder ran.
///
/// The current token and the nearest future ones survive; older tokens are dropped.
pub struct TruncateBuilder {
    inner: Box<dyn KeyBuilder>,
    max_size: u32,
}

impl TruncateBuilder {
    pub fn new(inner: Box<dyn KeyBuilder>, max_size: u32) -> KeyResult<Self> {
        if max_size == 0 {
            return Err(KeyError::InvalidParameters(
                "truncate builder needs max_size > 0".to_string(),
            ));
        }
        Ok(Self { inner, max_size })
    }
}

#[async_trait]
impl KeyBuilder for TruncateBuilder {
    async fn update(&self, provider: &dyn KeyProvider, manager: &dyn KeyManager) -> KeyResult<()> {
        self.inner.update(provider, manager).await?;

        let size = manager.size();
        if size <= self.max_size {
            return Ok(());
        }

        let window = manager.get_keys(CURRENT_TOKEN_ID, self.max_size)?;
        if window.is_empty() {
            return Err(KeyError::InvalidState(format!(
                "no current key left to keep in {}",
                manager.security_group_id()
            )));
        }
        let kept = window.len();
        manager.set_keys(window)?;

        debug!(
            security_group_id = %manager.security_group_id(),
            before = size,
            after = kept,
            "Key ring truncated"
        );
        Ok(())
    }
}

/// Replaces the whole ring with the provider's keys
#[derive(Debug, Default)]
pub struct SetterBuilder;

impl SetterBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl KeyBuilder for SetterBuilder {
    async fn update(&self, provider: &dyn KeyProvider, manager: &dyn KeyManager) -> KeyResult<()> {
        let set = provider.get_keys(CURRENT_TOKEN_ID, u32::MAX).await?;
        let first_token_id = set.first_token_id;
        let nb_keys = set.len();
        manager.set_keys(set)?;

        info!(
            security_group_id = %manager.security_group_id(),
            first_token_id = first_token_id,
            nb_keys = nb_keys,
            "Keys replaced from provider"
        );
        Ok(())
    }
}

/// Notified after a successful update
#[async_trait]
pub trait UpdateCallback: Send + Sync {
    async fn on_update(&self, manager: &dyn KeyManager);
}

/// Adapts a plain closure to [`UpdateCallback`]
pub struct FnCallback<F> {
    f: F,
}

impl<F> FnCallback<F>
where
    F: Fn(&dyn KeyManager) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> UpdateCallback for FnCallback<F>
where
    F: Fn(&dyn KeyManager) + Send + Sync,
{
    async fn on_update(&self, manager: &dyn KeyManager) {
        (self.f)(manager)
    }
}

/// Runs the inner builder, then the callback if the update succeeded
pub struct CallbackBuilder {
    inner: Box<dyn KeyBuilder>,
    callback: Arc<dyn UpdateCallback>,
}

impl CallbackBuilder {
    pub fn new(inner: Box<dyn KeyBuilder>, callback: Arc<dyn UpdateCallback>) -> Self {
        Self { inner, callback }
    }
}

#[async_trait]
impl KeyBuilder for CallbackBuilder {
    async fn update(&self, provider: &dyn KeyProvider, manager: &dyn KeyManager) -> KeyResult<()> {
        self.inner.update(provider, manager).await?;
        self.callback.on_update(manager).await;
        Ok(())
    }
}
