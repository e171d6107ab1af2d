//! Registration / Identity Abstraction
//!
//! The registration handshake itself is owned by the host; the core only needs
//! the resulting device id and auth token, plus a way to ask for a fresh
//! registration during recovery.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait RegistrationProvider: Send + Sync {
    /// Backend-assigned device id, `None` before registration.
    async fn device_id(&self) -> Option<String>;

    /// Whether the device holds a valid registration.
    async fn is_registered(&self) -> bool;

    /// Bearer token for backend and CDN requests.
    async fn auth_token(&self) -> Option<String>;

    /// Re-run the registration handshake.
    async fn re_register(&self) -> Result<()>;
}
