//! Key exchange with a remote Security Keys Service
//!
//! Pull model: [`RemoteKeyProvider`] fetches keys with `GetSecurityKeys`.
//! Push model: [`KeyPusher`] sends the local ring with `SetSecurityKeys`
//! after every update.

use crate::builder::UpdateCallback;
use crate::error::{KeyError, KeyResult};
use crate::key_types::{KeySet, SecurityKey, SecurityPolicy, CURRENT_TOKEN_ID};
use crate::manager::KeyManager;
use crate::provider::KeyProvider;
use async_trait::async_trait;
use sks_types::{duration_to_millis, GetSecurityKeysRequest, GetSecurityKeysResponse, SetSecurityKeysRequest};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Transport used to call the key service methods of a remote server
#[async_trait]
pub trait SecurityKeyServiceClient: Send + Sync {
    async fn get_security_keys(
        &self,
        request: GetSecurityKeysRequest,
    ) -> KeyResult<GetSecurityKeysResponse>;

    async fn set_security_keys(&self, request: SetSecurityKeysRequest) -> KeyResult<()>;
}

/// Check a `GetSecurityKeys` answer and turn it into a [`KeySet`]
pub fn key_set_from_response(
    response: GetSecurityKeysResponse,
    policy: SecurityPolicy,
) -> KeyResult<KeySet> {
    if response.security_policy_uri != policy.uri() {
        return Err(KeyError::Remote(format!(
            "unexpected security policy {}",
            response.security_policy_uri
        )));
    }
    if response.keys.is_empty() {
        return Err(KeyError::Remote("no key received".to_string()));
    }
    if response.first_token_id == 0 {
        return Err(KeyError::Remote("first token id is 0".to_string()));
    }
    if let Some(bad) = response.keys.iter().find(|k| k.len() != policy.key_length()) {
        return Err(KeyError::Remote(format!(
            "key of {} bytes, expected {}",
            bad.len(),
            policy.key_length()
        )));
    }

    let time_to_next_key_ms = duration_to_millis(response.time_to_next_key_ms, "TimeToNextKey")?;
    let key_lifetime_ms = duration_to_millis(response.key_lifetime_ms, "KeyLifetime")?;
    if time_to_next_key_ms == 0 || key_lifetime_ms == 0 {
        return Err(KeyError::Remote("zero key duration received".to_string()));
    }

    Ok(KeySet {
        security_policy_uri: Some(response.security_policy_uri),
        first_token_id: response.first_token_id,
        keys: response.keys.into_iter().map(SecurityKey::from).collect(),
        time_to_next_key_ms,
        key_lifetime_ms,
    })
}

/// Build the `SetSecurityKeys` arguments that publish `key_set` for a group
pub fn set_request_from_key_set(
    security_group_id: &str,
    key_set: &KeySet,
) -> KeyResult<SetSecurityKeysRequest> {
    let Some((current, future)) = key_set.keys.split_first() else {
        return Err(KeyError::InvalidParameters("no key to push".to_string()));
    };
    let Some(security_policy_uri) = key_set.security_policy_uri.clone() else {
        return Err(KeyError::InvalidParameters(
            "no security policy configured".to_string(),
        ));
    };

    Ok(SetSecurityKeysRequest {
        security_group_id: security_group_id.to_string(),
        security_policy_uri,
        current_token_id: key_set.first_token_id,
        current_key: current.to_vec(),
        future_keys: future.iter().map(SecurityKey::to_vec).collect(),
        time_to_next_key_ms: key_set.time_to_next_key_ms as f64,
        key_lifetime_ms: key_set.key_lifetime_ms as f64,
    })
}

/// Pulls keys of one security group from a remote key service
pub struct RemoteKeyProvider {
    client: Arc<dyn SecurityKeyServiceClient>,
    security_group_id: String,
    policy: SecurityPolicy,
}

impl RemoteKeyProvider {
    pub fn new(
        client: Arc<dyn SecurityKeyServiceClient>,
        security_group_id: impl Into<String>,
        policy: SecurityPolicy,
    ) -> Self {
        Self {
            client,
            security_group_id: security_group_id.into(),
            policy,
        }
    }
}

#[async_trait]
impl KeyProvider for RemoteKeyProvider {
    async fn get_keys(&self, starting_token_id: u32, nb_requested: u32) -> KeyResult<KeySet> {
        let request =
            GetSecurityKeysRequest::new(self.security_group_id.clone(), starting_token_id, nb_requested);
        let response = self.client.get_security_keys(request).await?;
        let set = key_set_from_response(response, self.policy)?;

        debug!(
            security_group_id = %self.security_group_id,
            first_token_id = set.first_token_id,
            nb_keys = set.len(),
            "Keys pulled from remote key service"
        );
        Ok(set)
    }
}

/// Stored as a manager's user data to tell [`KeyPusher`] where to push
pub struct PushTarget {
    pub client: Arc<dyn SecurityKeyServiceClient>,
}

/// Pushes the manager's keys to a remote key service after each update.
///
/// Failures are logged; the local update is already done.
pub struct KeyPusher {
    client: Option<Arc<dyn SecurityKeyServiceClient>>,
}

impl KeyPusher {
    /// Always push to `client`
    pub fn new(client: Arc<dyn SecurityKeyServiceClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Push to the [`PushTarget`] found in the manager's user data
    pub fn from_user_data() -> Self {
        Self { client: None }
    }

    fn resolve_client(&self, manager: &dyn KeyManager) -> Option<Arc<dyn SecurityKeyServiceClient>> {
        if let Some(client) = &self.client {
            return Some(client.clone());
        }
        manager
            .user_data()
            .and_then(|data| data.downcast::<PushTarget>().ok())
            .map(|target| target.client.clone())
    }

    async fn push(&self, manager: &dyn KeyManager) -> KeyResult<usize> {
        let client = self.resolve_client(manager).ok_or_else(|| {
            KeyError::InvalidState("no push target for this security group".to_string())
        })?;

        let key_set = manager.get_keys(CURRENT_TOKEN_ID, u32::MAX)?;
        if !key_set.is_valid() {
            return Err(KeyError::InvalidState("no valid key to push".to_string()));
        }

        let request = set_request_from_key_set(manager.security_group_id(), &key_set)?;
        let count = request.key_count();
        client.set_security_keys(request).await?;
        Ok(count)
    }
}

#[async_trait]
impl UpdateCallback for KeyPusher {
    async fn on_update(&self, manager: &dyn KeyManager) {
        match self.push(manager).await {
            Ok(count) => debug!(
                security_group_id = %manager.security_group_id(),
                nb_keys = count,
                "Keys pushed to remote key service"
            ),
            Err(KeyError::InvalidState(reason)) => warn!(
                security_group_id = %manager.security_group_id(),
                reason = %reason,
                "Skipping key push"
            ),
            Err(e) => error!(
                security_group_id = %manager.security_group_id(),
                error = %e,
                "Failed to push keys"
            ),
        }
    }
}
