//! OPC UA status codes returned by the key service methods

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status codes the SKS methods can answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Good,
    BadInternalError,
    BadOutOfMemory,
    BadNotFound,
    BadInvalidArgument,
    BadInvalidState,
    BadNoData,
    BadMethodInvalid,
    BadUserAccessDenied,
    BadSecurityModeInsufficient,
}

impl StatusCode {
    /// Numeric value as defined by OPC UA Part 4
    pub fn code(&self) -> u32 {
        match self {
            StatusCode::Good => 0x0000_0000,
            StatusCode::BadInternalError => 0x8002_0000,
            StatusCode::BadOutOfMemory => 0x8003_0000,
            StatusCode::BadUserAccessDenied => 0x801F_0000,
            StatusCode::BadNotFound => 0x803E_0000,
            StatusCode::BadMethodInvalid => 0x8075_0000,
            StatusCode::BadNoData => 0x809B_0000,
            StatusCode::BadInvalidArgument => 0x80AB_0000,
            StatusCode::BadInvalidState => 0x80AF_0000,
            StatusCode::BadSecurityModeInsufficient => 0x80E6_0000,
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, StatusCode::Good)
    }

    pub fn name(&self) -> &'static str {
        match self {
            StatusCode::Good => "Good",
            StatusCode::BadInternalError => "BadInternalError",
            StatusCode::BadOutOfMemory => "BadOutOfMemory",
            StatusCode::BadNotFound => "BadNotFound",
            StatusCode::BadInvalidArgument => "BadInvalidArgument",
            StatusCode::BadInvalidState => "BadInvalidState",
            StatusCode::BadNoData => "BadNoData",
            StatusCode::BadMethodInvalid => "BadMethodInvalid",
            StatusCode::BadUserAccessDenied => "BadUserAccessDenied",
            StatusCode::BadSecurityModeInsufficient => "BadSecurityModeInsufficient",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.code())
    }
}
