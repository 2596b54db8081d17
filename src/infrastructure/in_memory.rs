use crate::domain::ports::RentalBackend;
use crate::domain::rental::{RentalId, RentalStarted, Settlement};
use crate::domain::scooter::{ConnectionStatus, FrameCode, ScooterRecord, ScooterStatus};
use crate::domain::tariff::{TariffCatalog, TariffId};
use crate::error::BackendError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

struct OpenRental {
    frame: FrameCode,
    tariff: TariffId,
    opened: Instant,
}

#[derive(Default)]
struct CallCounters {
    lookups: AtomicUsize,
    starts: AtomicUsize,
    ends: AtomicUsize,
}

#[derive(Default)]
struct InjectedFailures {
    start: Option<BackendError>,
    end: Option<BackendError>,
}

/// A rental backend living in process memory.
///
/// Used by the command line when no API URL is configured, and by tests.
/// Behaves like the real inventory: it refuses scooters that are busy,
/// offline or flat, and settles rentals from the time measured on the tokio
/// clock, in units of `minute`.
#[derive(Clone)]
pub struct InMemoryFleet {
    scooters: Arc<RwLock<HashMap<FrameCode, ScooterRecord>>>,
    rentals: Arc<RwLock<HashMap<RentalId, OpenRental>>>,
    failures: Arc<RwLock<InjectedFailures>>,
    calls: Arc<CallCounters>,
    next_id: Arc<AtomicU64>,
    catalog: TariffCatalog,
    minute: Duration,
}

impl InMemoryFleet {
    /// Creates an empty fleet billing with `catalog`.
    pub fn new(catalog: TariffCatalog) -> Self {
        Self {
            scooters: Arc::default(),
            rentals: Arc::default(),
            failures: Arc::default(),
            calls: Arc::default(),
            next_id: Arc::new(AtomicU64::new(1)),
            catalog,
            minute: Duration::from_secs(60),
        }
    }

    /// Creates a fleet stocked with a dozen sample scooters in central Moscow.
    pub fn with_sample_fleet(catalog: TariffCatalog) -> Self {
        use ConnectionStatus::{Offline, Online};
        use ScooterStatus::{Available, Charging, InUse, Maintenance};

        let samples = [
            ("GD029", "Xiaomi M365", "55.751244, 37.618423", 85, Available, Online),
            ("AB123", "Segway Ninebot", "55.752220, 37.615560", 90, Available, Online),
            ("DT314", "Dualtron Thunder", "55.755826, 37.617300", 70, Charging, Offline),
            ("KG300", "Kugoo S3", "55.758946, 37.620393", 60, Maintenance, Offline),
            ("YS777", "Yandex Scooter", "55.760451, 37.624056", 95, Available, Online),
            ("OK200", "OKAI ES200", "55.762890, 37.627021", 80, InUse, Online),
            ("UJ050", "Uber Jump", "55.765020, 37.630280", 50, Charging, Offline),
            ("BS040", "Bolt Scooter", "55.767550, 37.633700", 40, Maintenance, Offline),
            ("CC100", "CityCoco", "55.769800, 37.636000", 100, Available, Online),
            ("RZ300", "Razor E300", "55.772100, 37.639200", 30, InUse, Online),
            ("LM015", "Lyme", "55.755544, 37.615423", 15, Available, Online),
            ("SC008", "Scooter", "55.752220, 37.615560", 8, Available, Online),
        ];

        let scooters = samples
            .into_iter()
            .filter_map(|(frame, model, location, battery, status, connection)| {
                let frame = FrameCode::parse(frame).ok()?;
                Some((
                    frame.clone(),
                    ScooterRecord {
                        frame,
                        model: model.to_string(),
                        battery,
                        status,
                        connection,
                        location: location.to_string(),
                    },
                ))
            })
            .collect();

        Self {
            scooters: Arc::new(RwLock::new(scooters)),
            ..Self::new(catalog)
        }
    }

    /// Length of a billed minute. Defaults to sixty seconds.
    pub fn with_minute(mut self, minute: Duration) -> Self {
        self.minute = minute;
        self
    }

    pub async fn add_scooter(&self, scooter: ScooterRecord) {
        let mut scooters = self.scooters.write().await;
        scooters.insert(scooter.frame.clone(), scooter);
    }

    pub async fn scooter(&self, frame: &FrameCode) -> Option<ScooterRecord> {
        let scooters = self.scooters.read().await;
        scooters.get(frame).cloned()
    }

    /// Makes the next start request fail with `error`.
    pub async fn fail_next_start(&self, error: BackendError) {
        self.failures.write().await.start = Some(error);
    }

    /// Makes the next end request fail with `error`.
    pub async fn fail_next_end(&self, error: BackendError) {
        self.failures.write().await.end = Some(error);
    }

    pub fn lookup_calls(&self) -> usize {
        self.calls.lookups.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.calls.starts.load(Ordering::SeqCst)
    }

    pub fn end_calls(&self) -> usize {
        self.calls.ends.load(Ordering::SeqCst)
    }

    fn check_rentable(scooter: &ScooterRecord) -> Result<(), BackendError> {
        if scooter.status == ScooterStatus::InUse {
            return Err(BackendError::Rejected("scooter is already in use".to_string()));
        }
        if scooter.connection == ConnectionStatus::Offline {
            return Err(BackendError::Rejected("scooter is offline".to_string()));
        }
        if !scooter.is_rentable() {
            return Err(BackendError::Rejected(format!(
                "scooter is not available ({:?}, battery {}%)",
                scooter.status, scooter.battery
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RentalBackend for InMemoryFleet {
    async fn scooter_by_frame(&self, frame: &FrameCode) -> Result<ScooterRecord, BackendError> {
        self.calls.lookups.fetch_add(1, Ordering::SeqCst);
        let scooters = self.scooters.read().await;
        scooters.get(frame).cloned().ok_or(BackendError::NotFound)
    }

    async fn start_rental(
        &self,
        frame: &FrameCode,
        tariff: TariffId,
    ) -> Result<RentalStarted, BackendError> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.write().await.start.take() {
            return Err(error);
        }
        if self.catalog.resolve(tariff).is_err() {
            return Err(BackendError::Rejected(format!("unknown tariff {tariff}")));
        }

        let mut scooters = self.scooters.write().await;
        let scooter = scooters.get_mut(frame).ok_or(BackendError::NotFound)?;
        Self::check_rentable(scooter)?;
        scooter.status = ScooterStatus::InUse;

        let id = RentalId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.rentals.write().await.insert(
            id,
            OpenRental {
                frame: frame.clone(),
                tariff,
                opened: Instant::now(),
            },
        );
        debug!(rental = %id, frame = %frame, "Opened rental");
        Ok(RentalStarted {
            id,
            started_at: Utc::now(),
        })
    }

    async fn end_rental(&self, rental: RentalId) -> Result<Settlement, BackendError> {
        self.calls.ends.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.write().await.end.take() {
            return Err(error);
        }

        let open = self
            .rentals
            .write()
            .await
            .remove(&rental)
            .ok_or(BackendError::NotFound)?;
        let minutes = open.opened.elapsed().as_nanos() / self.minute.as_nanos().max(1);
        let duration_minutes = u32::try_from(minutes).unwrap_or(u32::MAX);
        let final_cost = self
            .catalog
            .resolve(open.tariff)
            .map_err(|e| BackendError::Rejected(e.to_string()))?
            .cost_after(duration_minutes);

        if let Some(scooter) = self.scooters.write().await.get_mut(&open.frame) {
            scooter.status = ScooterStatus::Available;
        }
        debug!(rental = %rental, duration_minutes, "Closed rental");
        Ok(Settlement {
            final_cost,
            duration_minutes,
        })
    }
}
