//! Security Keys Service server library
//!
//! This library provides:
//! - `GetSecurityKeys` / `SetSecurityKeys` method handlers
//! - An in-process key service client
//! - Node bootstrap for the master, pull and push roles
//! - A health check endpoint
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


pub mod bootstrap;
pub mod client;
pub mod health;
pub mod methods;

pub use bootstrap::{BootstrapError, SksNode};
pub use client::LocalSksClient;
pub use health::{health_report, shutdown_signal, HealthServer};
pub use methods::{SecurityKeyService, ServiceError};
