//! SKS Types
//!
//! Wire-level payloads shared by the Security Keys Service crates: method
//! arguments, status codes, call security context and key lifecycle events.

pub mod error;
pub mod events;
pub mod methods;
pub mod schemas;
pub mod security;
pub mod status;
pub mod variant;

pub use error::*;
pub use events::*;
pub use methods::*;
pub use schemas::*;
pub use security::*;
pub use status::*;
pub use variant::*;
