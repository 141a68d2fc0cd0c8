//! Key lifecycle for the PubSub Security Keys Service
//!
//! Keys flow through a pipeline: a [`KeyProvider`] produces them, a
//! [`KeyBuilder`] merges them into the [`KeyManager`] of a security group,
//! and a [`KeyScheduler`] repeats this before the stored keys run out.
//! Managers are looked up by security group id in a [`SecurityGroupRegistry`].
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


pub mod builder;
pub mod error;
pub mod key_types;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod remote;
pub mod scheduler;

pub use builder::{
    AppendBuilder, CallbackBuilder, FnCallback, KeyBuilder, SetterBuilder, TruncateBuilder,
    UpdateCallback,
};
pub use error::{KeyError, KeyResult};
pub use key_types::{
    Clock, KeySet, ManualClock, SecurityKey, SecurityPolicy, SystemClock, CURRENT_TOKEN_ID,
    DEFAULT_KEY_LIFETIME_MS,
};
pub use manager::{KeyManager, KeyRingManager, UserData};
pub use provider::{KeyProvider, OsRandomSource, RandomKeyProvider, RandomSource, TryListProvider};
pub use registry::{RegistryState, SecurityGroupRegistry};
pub use remote::{
    key_set_from_response, set_request_from_key_set, KeyPusher, PushTarget, RemoteKeyProvider,
    SecurityKeyServiceClient,
};
pub use scheduler::{
    next_period_ms, KeyScheduler, SchedulerMonitor, TaskSnapshot, TaskState, MIN_PERIOD_MS,
};
