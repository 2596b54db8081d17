use crate::domain::rental::RentalState;
use crate::domain::scooter::FrameCode;
use crate::domain::tariff::TariffId;
use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RentalError>;

/// Failures surfaced to the presenter by the lookup, the catalog and the engine.
///
/// Every variant is recoverable: the presenter either corrects the input or
/// retries the intent.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum RentalError {
    #[error("invalid frame code `{0}`")]
    #[diagnostic(
        code(rental::validation),
        help("a frame code is two uppercase letters followed by three digits, e.g. GD029")
    )]
    ValidationError(String),

    #[error("no scooter with frame `{0}`")]
    #[diagnostic(code(rental::not_found))]
    NotFoundError(String),

    #[error("unknown tariff {0}")]
    #[diagnostic(code(rental::unknown_tariff), help("run `scooter-rent tariffs` to list tariffs"))]
    UnknownTariffError(TariffId),

    #[error("rental could not be started: {0}")]
    #[diagnostic(code(rental::start))]
    RentalStartError(String),

    #[error("rental could not be ended: {0}")]
    #[diagnostic(code(rental::end), help("the rental is still active, try ending it again"))]
    RentalEndError(String),

    #[error("backend unreachable: {0}")]
    #[diagnostic(code(rental::transport))]
    TransportError(String),

    #[error("not authorized: {0}")]
    #[diagnostic(code(rental::auth))]
    AuthError(String),

    #[error("a rental is already active")]
    #[diagnostic(code(rental::already_active))]
    RentalAlreadyActive,

    #[error("frame `{requested}` does not match the scooter found, `{found}`")]
    #[diagnostic(code(rental::frame_mismatch), help("look up the scooter you want to rent first"))]
    FrameMismatch {
        found: FrameCode,
        requested: FrameCode,
    },

    #[error("the accrual clock is running, minutes are counted automatically")]
    #[diagnostic(code(rental::clock_running), help("detach the clock before ticking by hand"))]
    ClockRunning,

    #[error("another start or end request is still in flight")]
    #[diagnostic(code(rental::in_progress))]
    OperationInProgress,

    #[error("{intent} is not allowed while the rental is {state:?}")]
    #[diagnostic(code(rental::invalid_state))]
    InvalidState {
        intent: &'static str,
        state: Option<RentalState>,
    },

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(rental::config))]
    ConfigError(String),
}

/// Failures reported by a [`crate::domain::ports::RentalBackend`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("not found")]
    NotFound,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("transport: {0}")]
    Transport(String),
}

impl BackendError {
    /// Maps a failure outside of a start or end call (lookups).
    pub fn into_lookup_error(self, frame: &str) -> RentalError {
        match self {
            BackendError::NotFound => RentalError::NotFoundError(frame.to_string()),
            BackendError::Rejected(reason) => RentalError::TransportError(reason),
            other => other.into(),
        }
    }

    pub fn into_start_error(self) -> RentalError {
        match self {
            BackendError::Rejected(reason) => RentalError::RentalStartError(reason),
            BackendError::NotFound => {
                RentalError::RentalStartError("scooter is not registered".to_string())
            }
            other => other.into(),
        }
    }

    pub fn into_end_error(self) -> RentalError {
        match self {
            BackendError::Rejected(reason) => RentalError::RentalEndError(reason),
            BackendError::NotFound => {
                RentalError::RentalEndError("rental is unknown to the backend".to_string())
            }
            other => other.into(),
        }
    }
}

impl From<BackendError> for RentalError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Unauthorized(reason) => RentalError::AuthError(reason),
            BackendError::Transport(reason) => RentalError::TransportError(reason),
            BackendError::NotFound => RentalError::TransportError("resource not found".to_string()),
            BackendError::Rejected(reason) => RentalError::TransportError(reason),
        }
    }
}

impl From<std::io::Error> for RentalError {
    fn from(error: std::io::Error) -> Self {
        RentalError::ConfigError(error.to_string())
    }
}

impl From<toml::de::Error> for RentalError {
    fn from(error: toml::de::Error) -> Self {
        RentalError::ConfigError(error.to_string())
    }
}
