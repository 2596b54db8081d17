use super::rental::{RentalId, RentalStarted, Settlement};
use super::scooter::{FrameCode, ScooterRecord};
use super::tariff::TariffId;
use crate::error::BackendError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// The three backend operations the rental flow depends on.
///
/// Implementations authorize every call themselves; a missing or refused
/// credential comes back as [`BackendError::Unauthorized`].
#[async_trait]
pub trait RentalBackend: Send + Sync {
    async fn scooter_by_frame(&self, frame: &FrameCode) -> Result<ScooterRecord, BackendError>;

    async fn start_rental(
        &self,
        frame: &FrameCode,
        tariff: TariffId,
    ) -> Result<RentalStarted, BackendError>;

    async fn end_rental(&self, rental: RentalId) -> Result<Settlement, BackendError>;
}

pub type RentalBackendBox = Arc<dyn RentalBackend>;

/// An opaque bearer credential issued by the authentication service.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Read-only access to the current credential. Only the authentication
/// collaborator replaces it.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<BearerToken>;
}

pub type CredentialSourceBox = Arc<dyn CredentialSource>;
