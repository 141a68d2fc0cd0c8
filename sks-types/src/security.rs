//! Security context of an incoming method call
//!
//! The secure channel and session layers live outside this workspace; they hand
//! the key service a [`CallContext`] describing what they negotiated.

use serde::{Deserialize, Serialize};

/// Message security mode of the secure channel carrying the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSecurityMode {
    Invalid,
    None,
    Sign,
    SignAndEncrypt,
}

impl MessageSecurityMode {
    /// Whether messages are both signed and encrypted
    pub fn is_confidential(&self) -> bool {
        matches!(self, MessageSecurityMode::SignAndEncrypt)
    }
}

/// Identity activated on the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIdentity {
    Anonymous,
    Username(String),
    Certificate { thumbprint: String },
}

impl UserIdentity {
    pub fn username(&self) -> Option<&str> {
        match self {
            UserIdentity::Username(name) => Some(name),
            _ => None,
        }
    }
}

/// What the session layer knows about the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub security_mode: MessageSecurityMode,
    pub user: UserIdentity,
    /// Secure channel the request arrived on, for logging
    #[serde(default)]
    pub secure_channel_id: u32,
}

impl CallContext {
    pub fn new(security_mode: MessageSecurityMode, user: UserIdentity) -> Self {
        Self {
            security_mode,
            user,
            secure_channel_id: 0,
        }
    }

    pub fn with_secure_channel(mut self, secure_channel_id: u32) -> Self {
        self.secure_channel_id = secure_channel_id;
        self
    }
}
