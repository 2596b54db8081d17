use super::money::Money;
use super::scooter::{FrameCode, ScooterRecord};
use super::tariff::{Tariff, TariffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the backend assigns to a started rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RentalId(pub u64);

impl fmt::Display for RentalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RentalState {
    Idle,
    AwaitingFrame,
    ScooterFound,
    Active,
    Settling,
    Ended,
}

impl RentalState {
    /// States in which no rental exists on the backend yet.
    pub fn is_pre_active(self) -> bool {
        matches!(
            self,
            RentalState::Idle | RentalState::AwaitingFrame | RentalState::ScooterFound
        )
    }

    /// States that block a new rental for the same renter.
    pub fn is_in_progress(self) -> bool {
        matches!(self, RentalState::Active | RentalState::Settling)
    }
}

/// What the backend answers to a successful start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalStarted {
    pub id: RentalId,
    pub started_at: DateTime<Utc>,
}

/// The backend's authoritative figures for a finished rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub final_cost: Money,
    pub duration_minutes: u32,
}

/// One rental flow, from opening the screen to settlement.
///
/// Fields are only reachable through accessors; every mutation goes through
/// a transition method that checks the current state, so `elapsed_minutes`
/// can only move forward through [`RentalSession::accrue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RentalSession {
    id: Option<RentalId>,
    scooter: Option<ScooterRecord>,
    frame: Option<FrameCode>,
    tariff_id: Option<TariffId>,
    started_at: Option<DateTime<Utc>>,
    elapsed_minutes: u32,
    accrued_cost: Money,
    state: RentalState,
}

impl Default for RentalSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RentalSession {
    pub fn new() -> Self {
        Self {
            id: None,
            scooter: None,
            frame: None,
            tariff_id: None,
            started_at: None,
            elapsed_minutes: 0,
            accrued_cost: Money::ZERO,
            state: RentalState::Idle,
        }
    }

    pub fn id(&self) -> Option<RentalId> {
        self.id
    }

    /// The scooter found by the last successful lookup.
    pub fn scooter(&self) -> Option<&ScooterRecord> {
        self.scooter.as_ref()
    }

    pub fn frame(&self) -> Option<&FrameCode> {
        self.frame.as_ref()
    }

    pub fn tariff_id(&self) -> Option<TariffId> {
        self.tariff_id
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn elapsed_minutes(&self) -> u32 {
        self.elapsed_minutes
    }

    pub fn accrued_cost(&self) -> Money {
        self.accrued_cost
    }

    pub fn state(&self) -> RentalState {
        self.state
    }

    /// A frame code was submitted for lookup.
    pub(crate) fn await_frame(&mut self) {
        debug_assert!(self.state.is_pre_active());
        self.scooter = None;
        self.state = RentalState::AwaitingFrame;
    }

    pub(crate) fn scooter_found(&mut self, scooter: ScooterRecord) {
        debug_assert_eq!(self.state, RentalState::AwaitingFrame);
        self.scooter = Some(scooter);
        self.state = RentalState::ScooterFound;
    }

    /// Binds the backend's answer and charges the tariff's initial cost.
    pub(crate) fn activate(&mut self, frame: FrameCode, tariff: &Tariff, started: RentalStarted) {
        debug_assert!(self.state.is_pre_active());
        if self.scooter.as_ref().is_some_and(|scooter| scooter.frame != frame) {
            self.scooter = None;
        }
        self.id = Some(started.id);
        self.frame = Some(frame);
        self.tariff_id = Some(tariff.id);
        self.started_at = Some(started.started_at);
        self.elapsed_minutes = 0;
        self.accrued_cost = tariff.initial_cost();
        self.state = RentalState::Active;
    }

    /// Advances the local estimate by one minute. Ignored unless active.
    pub(crate) fn accrue(&mut self, tariff: &Tariff) -> bool {
        if self.state != RentalState::Active {
            return false;
        }
        self.elapsed_minutes = self.elapsed_minutes.saturating_add(1);
        self.accrued_cost = tariff.cost_after(self.elapsed_minutes);
        true
    }

    pub(crate) fn begin_settling(&mut self) {
        debug_assert_eq!(self.state, RentalState::Active);
        self.state = RentalState::Settling;
    }

    /// The end request failed; billing resumes where it stopped.
    pub(crate) fn resume(&mut self) {
        debug_assert_eq!(self.state, RentalState::Settling);
        self.state = RentalState::Active;
    }

    /// Overwrites the local estimate with the backend's figures.
    pub(crate) fn settle(&mut self, settlement: Settlement) {
        debug_assert_eq!(self.state, RentalState::Settling);
        self.elapsed_minutes = settlement.duration_minutes;
        self.accrued_cost = settlement.final_cost;
        self.state = RentalState::Ended;
    }
}
