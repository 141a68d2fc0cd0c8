//! Security group registry
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
use crate::manager::KeyManager;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle of a [`SecurityGroupRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Uninitialized,
    Ready,
    Cleared,
}

struct RegistryInner {
    state: RegistryState,
    managers: HashMap<String, Arc<dyn KeyManager>>,
}

/// Maps security group ids to their key managers.
///
/// One registry is created at startup and shared with the components that
/// need it. Lookups run in parallel.
pub struct SecurityGroupRegistry {
    inner: RwLock<RegistryInner>,
}

impl SecurityGroupRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                state: RegistryState::Uninitialized,
                managers: HashMap::new(),
            }),
        }
    }

    /// Make the registry usable. Calling it again is a no-op.
    pub fn init(&self) {
        let mut inner = self.inner.write();
        if inner.state != RegistryState::Ready {
            inner.state = RegistryState::Ready;
            debug!("Security group registry ready");
        }
    }

    pub fn state(&self) -> RegistryState {
        self.inner.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == RegistryState::Ready
    }

    /// Insert or replace the manager of `security_group_id`.
    ///
    /// A replaced manager is cleared.
    pub fn set_manager(&self, security_group_id: &str, manager: Arc<dyn KeyManager>) -> KeyResult<()> {
        if security_group_id.is_empty() {
            return Err(KeyError::InvalidParameters(
                "security group id is empty".to_string(),
            ));
        }

        let previous = {
            let mut inner = self.inner.write();
            if inner.state != RegistryState::Ready {
                return Err(KeyError::InvalidState(format!(
                    "registry is {:?}",
                    inner.state
                )));
            }
            inner
                .managers
                .insert(security_group_id.to_string(), manager.clone())
        };

        match previous {
            // Registering the stored manager again replaces nothing
            Some(previous) if Arc::ptr_eq(&previous, &manager) => {
                debug!(security_group_id = %security_group_id, "Key manager already registered");
            }
            Some(previous) => {
                previous.clear();
                info!(security_group_id = %security_group_id, "Key manager replaced");
            }
            None => {
                debug!(security_group_id = %security_group_id, "Key manager registered");
            }
        }
        Ok(())
    }

    /// Register `manager` under its own security group id
    pub fn add_manager(&self, manager: Arc<dyn KeyManager>) -> KeyResult<()> {
        let security_group_id = manager.security_group_id().to_string();
        self.set_manager(&security_group_id, manager)
    }

    pub fn get_manager(&self, security_group_id: &str) -> Option<Arc<dyn KeyManager>> {
        let inner = self.inner.read();
        if inner.state != RegistryState::Ready {
            return None;
        }
        inner.managers.get(security_group_id).cloned()
    }

    /// Like [`get_manager`](Self::get_manager), failing with `NotFound`
    pub fn require_manager(&self, security_group_id: &str) -> KeyResult<Arc<dyn KeyManager>> {
        self.get_manager(security_group_id)
            .ok_or_else(|| KeyError::NotFound(security_group_id.to_string()))
    }

    pub fn security_group_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().managers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.read().managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear every manager and drop the map. Safe to call in any state.
    pub fn clear(&self) {
        let managers = {
            let mut inner = self.inner.write();
            if inner.state == RegistryState::Ready {
                inner.state = RegistryState::Cleared;
            }
            std::mem::take(&mut inner.managers)
        };

        let count = managers.len();
        for manager in managers.values() {
            manager.clear();
        }
        if count > 0 {
            info!(managers = count, "Security group registry cleared");
        }
    }
}

impl Default for SecurityGroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}
