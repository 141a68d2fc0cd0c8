//! Error types for key management
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


use thiserror::Error;

/// Key management errors
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Security group not found: {0}")]
    NotFound(String),

    #[error("Token {0} is outside the managed key window")]
    TokenNotFound(u32),

    #[error("Random generation error: {0}")]
    Crypto(String),

    #[error("Remote key service error: {0}")]
    Remote(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::collections::TryReserveError> for KeyError {
    fn from(err: std::collections::TryReserveError) -> Self {
        KeyError::OutOfMemory(err.to_string())
    }
}

impl From<sks_types::TypesError> for KeyError {
    fn from(err: sks_types::TypesError) -> Self {
        KeyError::Remote(err.to_string())
    }
}

/// Result type for key operations
pub type KeyResult<T> = Result<T, KeyError>;
