use super::clock::{AccrualClock, EngineConfig};
use super::lookup::ScooterLookup;
use crate::domain::ports::RentalBackendBox;
use crate::domain::rental::{RentalSession, RentalState};
use crate::domain::scooter::{FrameCode, ScooterRecord};
use crate::domain::tariff::{Tariff, TariffCatalog, TariffId};
use crate::error::{RentalError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Mutable rental state. Only touched with the lock held and never across an
/// `.await`.
#[derive(Default)]
struct Desk {
    session: Option<RentalSession>,
    /// Tariff bound at start.
    tariff: Option<Tariff>,
    /// Runtime instant the backend confirmed the start; ticks are counted from it.
    anchor: Option<Instant>,
    clock: Option<AccrualClock>,
    /// Bumped whenever the clock is stopped or re-armed so that a stale
    /// clock task cannot accrue.
    epoch: u64,
    in_flight: bool,
}

struct Shared {
    desk: Mutex<Desk>,
    updates: watch::Sender<Option<RentalSession>>,
    tick_period: Duration,
}

impl Shared {
    fn desk(&self) -> MutexGuard<'_, Desk> {
        self.desk.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, desk: &Desk) {
        self.updates.send_replace(desk.session.clone());
    }

    fn stop_clock(&self, desk: &mut Desk) {
        desk.epoch += 1;
        desk.clock = None;
    }

    /// Schedules the next tick one period after the last accrued minute.
    fn arm_clock(self: &Arc<Self>, desk: &mut Desk) {
        let Some(anchor) = desk.anchor else {
            return;
        };
        self.stop_clock(desk);
        let epoch = desk.epoch;
        let elapsed = desk.session.as_ref().map_or(0, RentalSession::elapsed_minutes);
        let first_tick = anchor + self.tick_period * elapsed.saturating_add(1);
        let shared = Arc::downgrade(self);
        desk.clock = AccrualClock::spawn(first_tick, self.tick_period, move || {
            shared
                .upgrade()
                .is_some_and(|shared| shared.clock_tick(epoch))
        });
        if desk.clock.is_none() {
            warn!("No async runtime, accrual clock not running");
        }
    }

    /// Called by the clock task. Returns `false` once the clock is obsolete.
    fn clock_tick(&self, epoch: u64) -> bool {
        let mut guard = self.desk();
        let desk = &mut *guard;
        if desk.epoch != epoch {
            return false;
        }
        let Some(session) = accrue(desk) else {
            return false;
        };
        debug!(
            elapsed_minutes = session.elapsed_minutes(),
            accrued_cost = %session.accrued_cost(),
            "Accrued"
        );
        self.publish(desk);
        true
    }
}

/// Accrues one minute on an active session and returns the new snapshot.
fn accrue(desk: &mut Desk) -> Option<RentalSession> {
    let (Some(session), Some(tariff)) = (desk.session.as_mut(), desk.tariff.as_ref()) else {
        return None;
    };
    session.accrue(tariff).then(|| session.clone())
}

/// Marks a backend call as in flight for the lifetime of the guard.
///
/// If the calling future is dropped before [`InFlight::complete`], the flag
/// is cleared and a session left in `Settling` goes back to `Active` with its
/// clock re-armed.
struct InFlight {
    shared: Arc<Shared>,
    armed: bool,
}

impl InFlight {
    fn complete(mut self, desk: &mut Desk) {
        desk.in_flight = false;
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut desk = self.shared.desk();
        desk.in_flight = false;
        if let Some(session) = desk.session.as_mut()
            && session.state() == RentalState::Settling
        {
            session.resume();
            self.shared.arm_clock(&mut desk);
            self.shared.publish(&desk);
        }
    }
}

/// Runs one renter's rental flow: lookup, start, accrual and settlement.
///
/// The engine owns the current [`RentalSession`] and is the only writer to
/// it. Presenters read snapshots through [`RentalEngine::session`] or
/// [`RentalEngine::subscribe`] and drive the flow with the intent methods.
/// Dropping the engine stops the accrual clock; the rental itself stays open
/// on the backend.
pub struct RentalEngine {
    backend: RentalBackendBox,
    lookup: ScooterLookup,
    catalog: TariffCatalog,
    shared: Arc<Shared>,
}

impl RentalEngine {
    /// Creates an engine with no session.
    ///
    /// # Arguments
    ///
    /// * `backend` - The rental backend all lookups, starts and ends go to.
    /// * `catalog` - Tariffs a rental may be started with.
    /// * `config` - Accrual clock settings.
    pub fn new(backend: RentalBackendBox, catalog: TariffCatalog, config: EngineConfig) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            lookup: ScooterLookup::new(backend.clone()),
            backend,
            catalog,
            shared: Arc::new(Shared {
                desk: Mutex::new(Desk::default()),
                updates,
                tick_period: config.tick_period(),
            }),
        }
    }

    pub fn catalog(&self) -> &TariffCatalog {
        &self.catalog
    }

    /// A snapshot of the current session, if any.
    pub fn session(&self) -> Option<RentalSession> {
        self.shared.desk().session.clone()
    }

    /// Receives a snapshot after every change to the session.
    pub fn subscribe(&self) -> watch::Receiver<Option<RentalSession>> {
        self.shared.updates.subscribe()
    }

    /// Opens a fresh rental flow in `Idle`, discarding a finished session.
    pub fn open(&self) -> Result<RentalSession> {
        let mut desk = self.shared.desk();
        Self::ensure_idle_desk(&desk)?;
        let session = RentalSession::new();
        desk.session = Some(session.clone());
        desk.tariff = None;
        desk.anchor = None;
        self.shared.publish(&desk);
        Ok(session)
    }

    /// Looks up the scooter behind a frame code typed by the renter.
    ///
    /// A malformed code fails with `ValidationError` without touching the
    /// session. Otherwise the session waits in `AwaitingFrame` and moves to
    /// `ScooterFound` on success; on failure it stays in `AwaitingFrame`.
    #[instrument(skip(self))]
    pub async fn lookup_frame(&self, input: &str) -> Result<ScooterRecord> {
        let frame = FrameCode::parse(input)?;

        let guard = {
            let mut desk = self.shared.desk();
            Self::ensure_idle_desk(&desk)?;
            let session = Self::current_or_new(&mut desk);
            session.await_frame();
            self.shared.publish(&desk);
            self.mark_in_flight(&mut desk)
        };

        let result = self.lookup.fetch(&frame).await;

        let mut desk = self.shared.desk();
        guard.complete(&mut desk);
        if let Ok(scooter) = &result
            && let Some(session) = desk.session.as_mut()
        {
            session.scooter_found(scooter.clone());
            self.shared.publish(&desk);
        }
        result
    }

    /// Starts a billed rental of `frame` under `tariff_id`.
    ///
    /// After a lookup, `frame` must be the scooter that was found.
    ///
    /// On success the session is `Active`, charged the tariff's initial cost,
    /// and the accrual clock runs. On failure the session is left as it was.
    #[instrument(skip(self), fields(frame = %frame))]
    pub async fn start(&self, frame: &FrameCode, tariff_id: TariffId) -> Result<RentalSession> {
        let tariff = self.catalog.resolve(tariff_id)?.clone();

        let guard = {
            let mut desk = self.shared.desk();
            Self::ensure_idle_desk(&desk)?;
            let session = Self::current_or_new(&mut desk);
            if let Some(found) = session.scooter()
                && found.frame != *frame
            {
                return Err(RentalError::FrameMismatch {
                    found: found.frame.clone(),
                    requested: frame.clone(),
                });
            }
            self.shared.publish(&desk);
            self.mark_in_flight(&mut desk)
        };

        let result = self.backend.start_rental(frame, tariff.id).await;

        let mut desk = self.shared.desk();
        guard.complete(&mut desk);
        let started = result.map_err(|e| {
            warn!(error = %e, "Backend refused to start the rental");
            e.into_start_error()
        })?;

        let rental_id = started.id;
        let session = Self::current_or_new(&mut desk);
        session.activate(frame.clone(), &tariff, started);
        let snapshot = session.clone();
        desk.tariff = Some(tariff);
        desk.anchor = Some(Instant::now());
        self.shared.arm_clock(&mut desk);
        self.shared.publish(&desk);
        info!(
            rental = %rental_id,
            accrued_cost = %snapshot.accrued_cost(),
            "Rental started"
        );
        Ok(snapshot)
    }

    /// Advances an active rental by one minute.
    ///
    /// For presenters that drive time themselves after [`RentalEngine::detach`].
    /// Refused with `ClockRunning` while the accrual clock is armed, so a
    /// minute is never counted twice.
    pub fn tick(&self) -> Result<RentalSession> {
        let mut guard = self.shared.desk();
        let desk = &mut *guard;
        if desk.clock.is_some() {
            return Err(RentalError::ClockRunning);
        }
        let Some(snapshot) = accrue(desk) else {
            return Err(RentalError::InvalidState {
                intent: "tick",
                state: desk.session.as_ref().map(RentalSession::state),
            });
        };
        self.shared.publish(desk);
        Ok(snapshot)
    }

    /// Ends the active rental and applies the backend's settlement.
    ///
    /// The clock is stopped before the request is sent. If the backend fails,
    /// the session returns to `Active` and billing continues from the last
    /// accrued minute.
    #[instrument(skip(self))]
    pub async fn end(&self) -> Result<RentalSession> {
        let (guard, rental_id) = {
            let mut desk = self.shared.desk();
            if desk.in_flight {
                return Err(RentalError::OperationInProgress);
            }
            let state = desk.session.as_ref().map(RentalSession::state);
            let rental_id = match desk.session.as_ref() {
                Some(session) if session.state() == RentalState::Active => session.id(),
                _ => None,
            };
            let Some(rental_id) = rental_id else {
                return Err(RentalError::InvalidState {
                    intent: "end",
                    state,
                });
            };
            self.shared.stop_clock(&mut desk);
            if let Some(session) = desk.session.as_mut() {
                session.begin_settling();
            }
            self.shared.publish(&desk);
            (self.mark_in_flight(&mut desk), rental_id)
        };

        let result = self.backend.end_rental(rental_id).await;

        let mut desk = self.shared.desk();
        guard.complete(&mut desk);
        let Some(session) = desk.session.as_mut() else {
            return Err(RentalError::InvalidState {
                intent: "end",
                state: None,
            });
        };
        match result {
            Ok(settlement) => {
                session.settle(settlement);
                let snapshot = session.clone();
                desk.anchor = None;
                self.shared.publish(&desk);
                info!(
                    rental = %rental_id,
                    final_cost = %settlement.final_cost,
                    duration_minutes = settlement.duration_minutes,
                    "Rental settled"
                );
                Ok(snapshot)
            }
            Err(e) => {
                session.resume();
                self.shared.arm_clock(&mut desk);
                self.shared.publish(&desk);
                warn!(rental = %rental_id, error = %e, "Backend refused to end the rental");
                Err(e.into_end_error())
            }
        }
    }

    /// Stops the accrual clock without touching the session.
    ///
    /// For presenters going away while a rental is active. The backend rental
    /// stays open and must still be ended.
    pub fn detach(&self) {
        let mut desk = self.shared.desk();
        if desk.clock.is_some() {
            info!("Accrual clock stopped");
        }
        self.shared.stop_clock(&mut desk);
    }

    fn ensure_idle_desk(desk: &Desk) -> Result<()> {
        if desk.in_flight {
            return Err(RentalError::OperationInProgress);
        }
        match desk.session.as_ref().map(RentalSession::state) {
            Some(state) if state.is_in_progress() => Err(RentalError::RentalAlreadyActive),
            _ => Ok(()),
        }
    }

    /// The current pre-active session, or a new one replacing a finished one.
    fn current_or_new(desk: &mut Desk) -> &mut RentalSession {
        if desk
            .session
            .as_ref()
            .is_none_or(|session| session.state() == RentalState::Ended)
        {
            desk.tariff = None;
            desk.anchor = None;
        }
        let session = desk.session.get_or_insert_with(RentalSession::new);
        if session.state() == RentalState::Ended {
            *session = RentalSession::new();
        }
        session
    }

    fn mark_in_flight(&self, desk: &mut Desk) -> InFlight {
        desk.in_flight = true;
        InFlight {
            shared: self.shared.clone(),
            armed: true,
        }
    }
}

impl Drop for RentalEngine {
    fn drop(&mut self) {
        self.detach();
    }
}
