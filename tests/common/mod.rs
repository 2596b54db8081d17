#![allow(dead_code)]

use async_trait::async_trait;
use scooter_rent::application::clock::EngineConfig;
use scooter_rent::application::engine::RentalEngine;
use scooter_rent::domain::ports::RentalBackend;
use scooter_rent::domain::rental::{RentalId, RentalStarted, Settlement};
use scooter_rent::domain::scooter::{FrameCode, ScooterRecord};
use scooter_rent::domain::tariff::{TariffCatalog, TariffId};
use scooter_rent::error::BackendError;
use scooter_rent::infrastructure::in_memory::InMemoryFleet;
use std::sync::Arc;
use tokio::sync::Notify;

pub fn frame(code: &str) -> FrameCode {
    FrameCode::parse(code).unwrap()
}

pub fn sample_fleet() -> Arc<InMemoryFleet> {
    Arc::new(InMemoryFleet::with_sample_fleet(TariffCatalog::with_defaults()))
}

pub fn engine_over(backend: Arc<dyn RentalBackend>) -> RentalEngine {
    RentalEngine::new(backend, TariffCatalog::with_defaults(), EngineConfig::default())
}

/// Holds start and end requests until the test releases them.
pub struct GatedBackend {
    pub fleet: Arc<InMemoryFleet>,
    entered: Notify,
    gate: Notify,
}

impl GatedBackend {
    pub fn new(fleet: Arc<InMemoryFleet>) -> Self {
        Self {
            fleet,
            entered: Notify::new(),
            gate: Notify::new(),
        }
    }

    /// Resolves once a gated request is waiting.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Lets one gated request through.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.gate.notified().await;
    }
}

#[async_trait]
impl RentalBackend for GatedBackend {
    async fn scooter_by_frame(&self, frame: &FrameCode) -> Result<ScooterRecord, BackendError> {
        self.fleet.scooter_by_frame(frame).await
    }

    async fn start_rental(
        &self,
        frame: &FrameCode,
        tariff: TariffId,
    ) -> Result<RentalStarted, BackendError> {
        self.pass().await;
        self.fleet.start_rental(frame, tariff).await
    }

    async fn end_rental(&self, rental: RentalId) -> Result<Settlement, BackendError> {
        self.pass().await;
        self.fleet.end_rental(rental).await
    }
}
