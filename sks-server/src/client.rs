//! In-process key service client

use crate::methods::SecurityKeyService;
use async_trait::async_trait;
use sks_keys::{KeyError, KeyResult, SecurityKeyServiceClient};
use sks_types::{
    CallContext, GetSecurityKeysRequest, GetSecurityKeysResponse, SetSecurityKeysRequest,
    GET_SECURITY_KEYS, SET_SECURITY_KEYS,
};
use std::sync::Arc;

/// Calls a [`SecurityKeyService`] of the same process.
///
/// Arguments go through the same `Variant` encoding as a remote call, with a
/// fixed call context standing in for the session.
pub struct LocalSksClient {
    service: Arc<SecurityKeyService>,
    context: CallContext,
}

impl LocalSksClient {
    pub fn new(service: Arc<SecurityKeyService>, context: CallContext) -> Self {
        Self { service, context }
    }
}

#[async_trait]
impl SecurityKeyServiceClient for LocalSksClient {
    async fn get_security_keys(
        &self,
        request: GetSecurityKeysRequest,
    ) -> KeyResult<GetSecurityKeysResponse> {
        let outputs = self
            .service
            .call(&self.context, GET_SECURITY_KEYS, &request.into_arguments())
            .map_err(|e| KeyError::Remote(format!("{} ({})", e, e.status_code())))?;
        Ok(GetSecurityKeysResponse::from_arguments(&outputs)?)
    }

    async fn set_security_keys(&self, request: SetSecurityKeysRequest) -> KeyResult<()> {
        self.service
            .call(&self.context, SET_SECURITY_KEYS, &request.into_arguments())
            .map_err(|e| KeyError::Remote(format!("{} ({})", e, e.status_code())))?;
        Ok(())
    }
}
