use crate::application::engine::RentalEngine;
use crate::domain::rental::{RentalSession, RentalState};
use crate::domain::scooter::ScooterRecord;
use crate::domain::tariff::{BillingMode, TariffCatalog};
use crate::error::{RentalError, Result};
use comfy_table::{Cell, CellAlignment, Color, Table, modifiers, presets};
use std::future::Future;
use tracing::warn;

pub fn build_tariffs_table(catalog: &TariffCatalog) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_header(vec!["ID", "Name", "Billing", "Rate"]);
    for tariff in catalog.iter() {
        let billing = match tariff.mode {
            BillingMode::PerMinute => "per minute",
            BillingMode::Fixed => "fixed",
        };
        table.add_row(vec![
            Cell::new(tariff.id.0).set_alignment(CellAlignment::Right),
            Cell::new(&tariff.name),
            Cell::new(billing),
            Cell::new(tariff.rate).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn build_scooter_table(scooter: &ScooterRecord) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    let rentable = if scooter.is_rentable() {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::Red)
    };
    table.add_row(vec![Cell::new("Frame"), Cell::new(&scooter.frame)]);
    table.add_row(vec![Cell::new("Model"), Cell::new(&scooter.model)]);
    table.add_row(vec![Cell::new("Battery"), Cell::new(format!("{}%", scooter.battery))]);
    table.add_row(vec![Cell::new("Status"), Cell::new(format!("{:?}", scooter.status))]);
    table.add_row(vec![Cell::new("Connection"), Cell::new(format!("{:?}", scooter.connection))]);
    table.add_row(vec![Cell::new("Location"), Cell::new(&scooter.location)]);
    table.add_row(vec![Cell::new("Rentable"), rentable]);
    table
}

/// One status line per session snapshot.
pub fn session_line(session: &RentalSession) -> String {
    let rental = session.id().map(|id| format!("rental {id}: ")).unwrap_or_default();
    match session.state() {
        RentalState::Idle => "ready".to_string(),
        RentalState::AwaitingFrame => "looking up the scooter…".to_string(),
        RentalState::ScooterFound => session
            .scooter()
            .map(|scooter| format!("found {} {}", scooter.frame, scooter.model))
            .unwrap_or_else(|| "scooter found".to_string()),
        RentalState::Active => format!(
            "{rental}{} min, {}",
            session.elapsed_minutes(),
            session.accrued_cost()
        ),
        RentalState::Settling => format!("{rental}ending…"),
        RentalState::Ended => format!(
            "{rental}ended after {} min, total {}",
            session.elapsed_minutes(),
            session.accrued_cost()
        ),
    }
}

/// Ends the rental, asking again after every failure that leaves it active.
///
/// `retry` is awaited after each such failure; when it yields `false` the
/// last error is returned and the backend rental stays open.
pub async fn end_until_settled<F, Fut>(engine: &RentalEngine, mut retry: F) -> Result<RentalSession>
where
    F: FnMut(&RentalError) -> Fut,
    Fut: Future<Output = bool>,
{
    loop {
        let error = match engine.end().await {
            Ok(ended) => return Ok(ended),
            Err(error) => error,
        };
        let still_active = engine
            .session()
            .is_some_and(|session| session.state() == RentalState::Active);
        if !still_active {
            return Err(error);
        }
        warn!(%error, "Rental is still active");
        if !retry(&error).await {
            return Err(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::EngineConfig;
    use crate::domain::scooter::FrameCode;
    use crate::domain::tariff::TariffId;
    use crate::error::BackendError;
    use crate::infrastructure::in_memory::InMemoryFleet;
    use std::sync::Arc;

    async fn riding() -> (RentalEngine, Arc<InMemoryFleet>) {
        let fleet = Arc::new(InMemoryFleet::with_sample_fleet(TariffCatalog::with_defaults()));
        let engine = RentalEngine::new(
            fleet.clone(),
            TariffCatalog::with_defaults(),
            EngineConfig::default(),
        );
        let gd029 = FrameCode::parse("GD029").unwrap();
        engine.start(&gd029, TariffId(2)).await.unwrap();
        (engine, fleet)
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_retried_after_refusal() {
        let (engine, fleet) = riding().await;
        fleet
            .fail_next_end(BackendError::Transport("timed out".to_string()))
            .await;

        let mut asked = Vec::new();
        let ended = end_until_settled(&engine, |error| {
            asked.push(error.clone());
            async { true }
        })
        .await
        .unwrap();

        assert_eq!(ended.state(), RentalState::Ended);
        assert_eq!(asked, vec![RentalError::TransportError("timed out".to_string())]);
        assert_eq!(fleet.end_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_giving_up_leaves_rental_active() {
        let (engine, fleet) = riding().await;
        fleet
            .fail_next_end(BackendError::Rejected("payment declined".to_string()))
            .await;

        let result = end_until_settled(&engine, |_| async { false }).await;
        assert_eq!(
            result,
            Err(RentalError::RentalEndError("payment declined".to_string()))
        );
        assert_eq!(engine.session().unwrap().state(), RentalState::Active);
    }

    #[test]
    fn test_tariffs_table_lists_defaults() {
        let rendered = build_tariffs_table(&TariffCatalog::with_defaults()).to_string();
        assert!(rendered.contains("Per minute"));
        assert!(rendered.contains("5.00"));
        assert!(rendered.contains("Fixed ride"));
        assert!(rendered.contains("100.00"));
    }

    #[test]
    fn test_idle_session_line() {
        assert_eq!(session_line(&RentalSession::new()), "ready");
    }
}
