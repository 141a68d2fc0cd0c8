//! `GetSecurityKeys` and `SetSecurityKeys` method handlers
//!
//! The handlers receive already decoded calls: the secure channel and session
//! layers supply a [`CallContext`] and the raw input arguments. Checks run in
//! a fixed order: security mode, user, arguments, security group, manager.
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


use sks_keys::{KeyError, KeyManager, KeySet, SecurityGroupRegistry, SecurityKey};
use sks_types::{
    duration_to_millis, CallContext, GetSecurityKeysRequest, GetSecurityKeysResponse,
    MessageSecurityMode, SetSecurityKeysRequest, StatusCode, TypesError, Variant,
    GET_SECURITY_KEYS, SET_SECURITY_KEYS,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Method call failures, each carrying an OPC UA status code
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Security mode {0:?} is insufficient, SignAndEncrypt required")]
    SecurityModeInsufficient(MessageSecurityMode),

    #[error("User access denied")]
    UserAccessDenied,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Security group not found: {0}")]
    NotFound(String),

    #[error("No valid keys for security group {0}")]
    NoData(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::SecurityModeInsufficient(_) => StatusCode::BadSecurityModeInsufficient,
            ServiceError::UserAccessDenied => StatusCode::BadUserAccessDenied,
            ServiceError::InvalidArgument(_) => StatusCode::BadInvalidArgument,
            ServiceError::NotFound(_) => StatusCode::BadNotFound,
            ServiceError::NoData(_) => StatusCode::BadNoData,
            ServiceError::MethodNotFound(_) => StatusCode::BadMethodInvalid,
            ServiceError::Internal(_) => StatusCode::BadInternalError,
        }
    }
}

impl From<TypesError> for ServiceError {
    fn from(err: TypesError) -> Self {
        ServiceError::InvalidArgument(err.to_string())
    }
}

fn map_key_error(security_group_id: &str, err: KeyError) -> ServiceError {
    match err {
        KeyError::InvalidParameters(msg) => ServiceError::InvalidArgument(msg),
        KeyError::TokenNotFound(_) => ServiceError::NoData(security_group_id.to_string()),
        KeyError::NotFound(id) => ServiceError::NotFound(id),
        other => ServiceError::Internal(other.to_string()),
    }
}

/// Key service method handlers backed by a security group registry
pub struct SecurityKeyService {
    registry: Arc<SecurityGroupRegistry>,
    admin_user: String,
}

impl SecurityKeyService {
    pub fn new(registry: Arc<SecurityGroupRegistry>, admin_user: impl Into<String>) -> Self {
        Self {
            registry,
            admin_user: admin_user.into(),
        }
    }

    pub fn registry(&self) -> &Arc<SecurityGroupRegistry> {
        &self.registry
    }

    /// Dispatch a method call by browse name
    pub fn call(
        &self,
        context: &CallContext,
        method: &str,
        arguments: &[Variant],
    ) -> Result<Vec<Variant>, ServiceError> {
        match method {
            GET_SECURITY_KEYS => self.get_security_keys(context, arguments),
            SET_SECURITY_KEYS => self.set_security_keys(context, arguments).map(|()| Vec::new()),
            other => Err(ServiceError::MethodNotFound(other.to_string())),
        }
    }

    fn check_access(&self, context: &CallContext) -> Result<(), ServiceError> {
        if context.security_mode != MessageSecurityMode::SignAndEncrypt {
            warn!(
                secure_channel_id = context.secure_channel_id,
                security_mode = ?context.security_mode,
                "Key request rejected: channel not encrypted"
            );
            return Err(ServiceError::SecurityModeInsufficient(context.security_mode));
        }
        if context.user.username() != Some(self.admin_user.as_str()) {
            warn!(
                secure_channel_id = context.secure_channel_id,
                "Key request rejected: user not authorized"
            );
            return Err(ServiceError::UserAccessDenied);
        }
        Ok(())
    }

    fn lookup(&self, security_group_id: &str) -> Result<Arc<dyn KeyManager>, ServiceError> {
        self.registry
            .require_manager(security_group_id)
            .map_err(|e| map_key_error(security_group_id, e))
    }

    /// Handle `GetSecurityKeys` and return its five output arguments
    pub fn get_security_keys(
        &self,
        context: &CallContext,
        arguments: &[Variant],
    ) -> Result<Vec<Variant>, ServiceError> {
        self.check_access(context)?;
        let request = GetSecurityKeysRequest::from_arguments(arguments)?;
        let manager = self.lookup(&request.security_group_id)?;

        let key_set = manager
            .get_keys(request.starting_token_id, request.requested_key_count)
            .map_err(|e| map_key_error(&request.security_group_id, e))?;
        if !key_set.is_valid() {
            return Err(ServiceError::NoData(request.security_group_id));
        }
        let Some(security_policy_uri) = key_set.security_policy_uri.clone() else {
            return Err(ServiceError::NoData(request.security_group_id));
        };

        debug!(
            security_group_id = %request.security_group_id,
            starting_token_id = request.starting_token_id,
            first_token_id = key_set.first_token_id,
            nb_keys = key_set.len(),
            "GetSecurityKeys served"
        );

        let response = GetSecurityKeysResponse {
            security_policy_uri,
            first_token_id: key_set.first_token_id,
            keys: key_set.keys.iter().map(SecurityKey::to_vec).collect(),
            time_to_next_key_ms: key_set.time_to_next_key_ms as f64,
            key_lifetime_ms: key_set.key_lifetime_ms as f64,
        };
        Ok(response.into_arguments())
    }

    /// Handle `SetSecurityKeys`: replace the ring of the security group
    pub fn set_security_keys(
        &self,
        context: &CallContext,
        arguments: &[Variant],
    ) -> Result<(), ServiceError> {
        self.check_access(context)?;
        let request = SetSecurityKeysRequest::from_arguments(arguments)?;
        let time_to_next_key_ms = duration_to_millis(request.time_to_next_key_ms, "TimeToNextKey")?;
        let key_lifetime_ms = duration_to_millis(request.key_lifetime_ms, "KeyLifetime")?;
        let manager = self.lookup(&request.security_group_id)?;

        let nb_keys = request.key_count();
        let SetSecurityKeysRequest {
            security_group_id,
            security_policy_uri,
            current_token_id,
            current_key,
            future_keys,
            ..
        } = request;

        let mut keys = Vec::with_capacity(nb_keys);
        keys.push(SecurityKey::from(current_key));
        keys.extend(future_keys.into_iter().map(SecurityKey::from));

        manager
            .set_keys(KeySet {
                security_policy_uri: Some(security_policy_uri),
                first_token_id: current_token_id,
                keys,
                time_to_next_key_ms,
                key_lifetime_ms,
            })
            .map_err(|e| map_key_error(&security_group_id, e))?;

        info!(
            security_group_id = %security_group_id,
            current_token_id = current_token_id,
            nb_keys = nb_keys,
            "SetSecurityKeys applied"
        );
        Ok(())
    }
}
