//! Wiring of a key service node
//!
//! Every role builds the same pieces: one manager per security group in a
//! registry, the method handlers on top of it, and a scheduler feeding the
//! managers. Roles only differ in the provider and builder they schedule:
//!
//! - `Master`: random provider, append builder truncated to `max_keys`
//! - `Pull`: remote provider per group, setter builder
//! - `Push`: master pipeline, then a [`KeyPusher`] after each update
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


use crate::methods::SecurityKeyService;
use sks_config::{SksConfig, SksRole};
use sks_keys::{
    AppendBuilder, CallbackBuilder, KeyBuilder, KeyError, KeyManager, KeyProvider, KeyPusher,
    KeyRingManager, KeyScheduler, PushTarget, RandomKeyProvider, RemoteKeyProvider,
    SchedulerMonitor, SecurityGroupRegistry, SecurityKeyServiceClient, SecurityPolicy,
    SetterBuilder, TruncateBuilder, UserData,
};
use sks_types::Event;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

/// Node construction errors
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Unsupported security policy: {0}")]
    UnsupportedPolicy(String),

    #[error("Role {0:?} needs an upstream key service client")]
    MissingUpstream(SksRole),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// A running (or ready to run) key service
pub struct SksNode {
    role: SksRole,
    registry: Arc<SecurityGroupRegistry>,
    service: Arc<SecurityKeyService>,
    scheduler: KeyScheduler,
    has_tasks: bool,
}

impl SksNode {
    /// Build a node for `config.role`.
    ///
    /// `upstream` is the peer key service used by the `Pull` and `Push` roles.
    pub fn build(
        config: &SksConfig,
        upstream: Option<Arc<dyn SecurityKeyServiceClient>>,
    ) -> Result<Self, BootstrapError> {
        let policy = SecurityPolicy::from_uri(&config.security_policy_uri)
            .ok_or_else(|| BootstrapError::UnsupportedPolicy(config.security_policy_uri.clone()))?;
        let upstream = match config.role {
            SksRole::Master => None,
            role => Some(upstream.ok_or(BootstrapError::MissingUpstream(role))?),
        };

        let registry = Arc::new(SecurityGroupRegistry::new());
        registry.init();
        let mut scheduler = KeyScheduler::new();

        let local_pipeline = || -> Result<(Arc<dyn KeyProvider>, Box<dyn KeyBuilder>), KeyError> {
            let provider: Arc<dyn KeyProvider> =
                Arc::new(RandomKeyProvider::new(policy, config.generated_keys)?);
            let builder: Box<dyn KeyBuilder> = Box::new(TruncateBuilder::new(
                Box::new(AppendBuilder::new()),
                config.max_keys,
            )?);
            Ok((provider, builder))
        };

        match (config.role, upstream) {
            (SksRole::Pull, Some(client)) => {
                let builder: Arc<dyn KeyBuilder> = Arc::new(SetterBuilder::new());
                for security_group_id in &config.security_groups {
                    let manager = new_manager(config, security_group_id, None)?;
                    let provider: Arc<dyn KeyProvider> = Arc::new(RemoteKeyProvider::new(
                        client.clone(),
                        security_group_id.clone(),
                        policy,
                    ));
                    registry.add_manager(manager.clone())?;
                    scheduler.add_task(builder.clone(), provider, manager, config.initial_period_ms)?;
                }
            }
            (SksRole::Push, Some(client)) => {
                let (provider, inner) = local_pipeline()?;
                let builder: Arc<dyn KeyBuilder> = Arc::new(CallbackBuilder::new(
                    inner,
                    Arc::new(KeyPusher::from_user_data()),
                ));
                for security_group_id in &config.security_groups {
                    let target: UserData = Arc::new(PushTarget {
                        client: client.clone(),
                    });
                    let manager = new_manager(config, security_group_id, Some(target))?;
                    registry.add_manager(manager.clone())?;
                    scheduler.add_task(
                        builder.clone(),
                        provider.clone(),
                        manager,
                        config.initial_period_ms,
                    )?;
                }
            }
            _ => {
                let (provider, inner) = local_pipeline()?;
                let builder: Arc<dyn KeyBuilder> = Arc::from(inner);
                for security_group_id in &config.security_groups {
                    let manager = new_manager(config, security_group_id, None)?;
                    registry.add_manager(manager.clone())?;
                    scheduler.add_task(
                        builder.clone(),
                        provider.clone(),
                        manager,
                        config.initial_period_ms,
                    )?;
                }
            }
        }

        info!(
            role = ?config.role,
            policy = %policy,
            security_groups = config.security_groups.len(),
            "Key service node built"
        );

        Ok(Self {
            role: config.role,
            service: Arc::new(SecurityKeyService::new(registry.clone(), config.admin_user.clone())),
            registry,
            scheduler,
            has_tasks: true,
        })
    }

    /// Build a node that only serves and receives keys, without a scheduler.
    ///
    /// This is the peer a `Push` node sends its keys to.
    pub fn receiver(config: &SksConfig) -> Result<Self, BootstrapError> {
        if SecurityPolicy::from_uri(&config.security_policy_uri).is_none() {
            return Err(BootstrapError::UnsupportedPolicy(config.security_policy_uri.clone()));
        }

        let registry = Arc::new(SecurityGroupRegistry::new());
        registry.init();
        for security_group_id in &config.security_groups {
            registry.add_manager(new_manager(config, security_group_id, None)?)?;
        }

        Ok(Self {
            role: config.role,
            service: Arc::new(SecurityKeyService::new(registry.clone(), config.admin_user.clone())),
            registry,
            scheduler: KeyScheduler::new(),
            has_tasks: false,
        })
    }

    pub fn role(&self) -> SksRole {
        self.role
    }

    pub fn registry(&self) -> Arc<SecurityGroupRegistry> {
        self.registry.clone()
    }

    pub fn service(&self) -> Arc<SecurityKeyService> {
        self.service.clone()
    }

    pub fn monitor(&self) -> SchedulerMonitor {
        self.scheduler.monitor()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.scheduler.subscribe()
    }

    /// Start the key scheduler, if this node has one
    pub fn start(&mut self) -> Result<(), BootstrapError> {
        if self.has_tasks {
            self.scheduler.start()?;
        }
        Ok(())
    }

    /// Stop the scheduler, then clear every key held by the node
    pub fn shutdown(&mut self) {
        self.scheduler.stop_and_clear();
        self.registry.clear();
        info!(role = ?self.role, "Key service node stopped");
    }
}

fn new_manager(
    config: &SksConfig,
    security_group_id: &str,
    user_data: Option<UserData>,
) -> Result<Arc<dyn KeyManager>, KeyError> {
    let manager = KeyRingManager::new(security_group_id, user_data);
    manager.set_key_lifetime(config.key_lifetime_ms)?;
    manager.set_security_policy_uri(&config.security_policy_uri)?;
    Ok(Arc::new(manager))
}
