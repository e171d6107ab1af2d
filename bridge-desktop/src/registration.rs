//! Registration provider for devices provisioned out of band.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    identity::RegistrationProvider,
};
use parking_lot::RwLock;

/// Device id and token supplied at install time (env, config file, QR pairing
/// handled by the host shell). `re_register` cannot mint new credentials on
/// its own; hosts with a real handshake provide their own provider.
pub struct ProvisionedRegistration {
    credentials: RwLock<Option<(String, String)>>,
}

impl ProvisionedRegistration {
    pub fn new(device_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            credentials: RwLock::new(Some((device_id.into(), auth_token.into()))),
        }
    }

    pub fn unprovisioned() -> Self {
        Self {
            credentials: RwLock::new(None),
        }
    }

    /// Reads `SIGNAGE_DEVICE_ID` / `SIGNAGE_AUTH_TOKEN`.
    pub fn from_env() -> Self {
        match (
            std::env::var("SIGNAGE_DEVICE_ID"),
            std::env::var("SIGNAGE_AUTH_TOKEN"),
        ) {
            (Ok(id), Ok(token)) if !id.is_empty() => Self::new(id, token),
            _ => Self::unprovisioned(),
        }
    }

    /// Install credentials obtained by the host's pairing flow.
    pub fn provision(&self, device_id: impl Into<String>, auth_token: impl Into<String>) {
        *self.credentials.write() = Some((device_id.into(), auth_token.into()));
    }

    /// Drop credentials after the backend rejected them.
    pub fn revoke(&self) {
        *self.credentials.write() = None;
    }
}

#[async_trait]
impl RegistrationProvider for ProvisionedRegistration {
    async fn device_id(&self) -> Option<String> {
        self.credentials.read().as_ref().map(|(id, _)| id.clone())
    }

    async fn is_registered(&self) -> bool {
        self.credentials.read().is_some()
    }

    async fn auth_token(&self) -> Option<String> {
        self.credentials.read().as_ref().map(|(_, token)| token.clone())
    }

    async fn re_register(&self) -> Result<()> {
        if self.credentials.read().is_some() {
            Ok(())
        } else {
            Err(BridgeError::NotAvailable(
                "device has no provisioned credentials".to_string(),
            ))
        }
    }
}
