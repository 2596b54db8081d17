use crate::domain::ports::RentalBackendBox;
use crate::domain::scooter::{FrameCode, ScooterRecord};
use crate::error::Result;
use tracing::{info, instrument};

/// Resolves frame codes typed by the renter to scooter records.
///
/// Malformed codes are rejected before any request is made. Failures are
/// final for the attempt: there are no retries.
#[derive(Clone)]
pub struct ScooterLookup {
    backend: RentalBackendBox,
}

impl ScooterLookup {
    pub fn new(backend: RentalBackendBox) -> Self {
        Self { backend }
    }

    /// Validates `input` and fetches the matching scooter.
    pub async fn lookup(&self, input: &str) -> Result<ScooterRecord> {
        let frame = FrameCode::parse(input)?;
        self.fetch(&frame).await
    }

    /// Fetches an already validated frame code.
    #[instrument(skip(self), fields(frame = %frame))]
    pub async fn fetch(&self, frame: &FrameCode) -> Result<ScooterRecord> {
        let scooter = self
            .backend
            .scooter_by_frame(frame)
            .await
            .map_err(|e| e.into_lookup_error(frame.as_str()))?;
        info!(model = %scooter.model, battery = scooter.battery, "Scooter found");
        Ok(scooter)
    }
}
