mod common;

use common::{engine_over, frame, sample_fleet};
use scooter_rent::domain::ports::{RentalBackend, RentalBackendBox};
use scooter_rent::domain::rental::RentalState;
use scooter_rent::domain::tariff::TariffId;
use std::sync::Arc;

#[tokio::test]
async fn test_backend_as_trait_object() {
    let backend: RentalBackendBox = sample_fleet();

    // Send + Sync: the same backend serves two tasks.
    let lookups = {
        let backend = backend.clone();
        tokio::spawn(async move { backend.scooter_by_frame(&frame("GD029")).await.unwrap() })
    };
    let starts = {
        let backend = backend.clone();
        tokio::spawn(async move {
            backend
                .start_rental(&frame("AB123"), TariffId(2))
                .await
                .unwrap()
        })
    };

    assert_eq!(lookups.await.unwrap().model, "Xiaomi M365");
    let started = starts.await.unwrap();
    let settlement = backend.end_rental(started.id).await.unwrap();
    assert_eq!(settlement.duration_minutes, 0);
}

#[tokio::test]
async fn test_engine_driven_from_spawned_tasks() {
    let engine = Arc::new(engine_over(sample_fleet()));

    let started = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.start(&frame("GD029"), TariffId(1)).await })
    };
    assert_eq!(started.await.unwrap().unwrap().state(), RentalState::Active);

    let ended = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.end().await })
    };
    assert_eq!(ended.await.unwrap().unwrap().state(), RentalState::Ended);
}
