//! Event payload schemas
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

/// Payload for `sks.keys.updated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysUpdatedPayload {
    pub security_group_id: String,
    /// Tokens held by the manager after the update
    pub key_count: u32,
    /// Delay before the next run of this task
    pub next_period_ms: u32,
}

/// Payload for `sks.keys.update_failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysUpdateFailedPayload {
    pub security_group_id: String,
    pub error: String,
    pub next_period_ms: u32,
}

/// Payload for `sks.task.degraded`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDegradedPayload {
    pub security_group_id: String,
    pub reason: String,
}
