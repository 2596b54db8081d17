use crate::domain::money::Money;
use crate::domain::ports::{CredentialSourceBox, RentalBackend};
use crate::domain::rental::{RentalId, RentalStarted, Settlement};
use crate::domain::scooter::{FrameCode, ScooterRecord};
use crate::domain::tariff::TariffId;
use crate::error::{BackendError, RentalError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{Level, debug, instrument};

/// The rental REST API.
///
/// Every request carries the current bearer token from the credential
/// source. No token means no request: the call fails as unauthorized.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    credentials: CredentialSourceBox,
}

impl HttpBackend {
    pub fn try_new(base_url: &str, credentials: CredentialSourceBox) -> Result<Self, RentalError> {
        let client = Client::builder()
            .user_agent(concat!("scooter-rent/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RentalError::ConfigError(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or_else(|| BackendError::Unauthorized("not signed in".to_string()))?;
        Ok(self
            .client
            .request(method, format!("{}/{path}", self.base_url))
            .bearer_auth(token.expose()))
    }

    #[instrument(skip_all, level = Level::DEBUG)]
    async fn call<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = response.status();
        debug!(%status, "Received response");
        if !status.is_success() {
            return Err(classify(status, response).await);
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::Transport(format!("malformed response body: {e}")))
    }
}

async fn classify(status: StatusCode, response: Response) -> BackendError {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: Option<serde_json::Value>,
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.detail)
        .map(|detail| match detail {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
        .unwrap_or_else(|| status.to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(detail),
        StatusCode::NOT_FOUND => BackendError::NotFound,
        StatusCode::BAD_REQUEST
        | StatusCode::CONFLICT
        | StatusCode::UNPROCESSABLE_ENTITY
        | StatusCode::LOCKED => BackendError::Rejected(detail),
        _ => BackendError::Transport(format!("{status}: {detail}")),
    }
}

#[derive(Serialize)]
struct StartRentalRequest<'a> {
    frame: &'a str,
    tariff_id: TariffId,
}

#[derive(Deserialize)]
struct RentalOpened {
    id: RentalId,
    #[serde(deserialize_with = "deserialize_timestamp")]
    start_time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RentalClosed {
    total_cost: Decimal,
    duration_minutes: u32,
}

/// Accepts RFC 3339 timestamps, and naive ones which are taken as UTC.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

#[async_trait]
impl RentalBackend for HttpBackend {
    #[instrument(skip_all, fields(frame = %frame))]
    async fn scooter_by_frame(&self, frame: &FrameCode) -> Result<ScooterRecord, BackendError> {
        let request = self.request(Method::GET, &format!("scooters/{frame}"))?;
        self.call(request).await
    }

    #[instrument(skip_all, fields(frame = %frame, tariff = %tariff))]
    async fn start_rental(
        &self,
        frame: &FrameCode,
        tariff: TariffId,
    ) -> Result<RentalStarted, BackendError> {
        let request = self
            .request(Method::POST, "rentals")?
            .json(&StartRentalRequest {
                frame: frame.as_str(),
                tariff_id: tariff,
            });
        let opened: RentalOpened = self.call(request).await?;
        Ok(RentalStarted {
            id: opened.id,
            started_at: opened.start_time,
        })
    }

    #[instrument(skip_all, fields(rental = %rental))]
    async fn end_rental(&self, rental: RentalId) -> Result<Settlement, BackendError> {
        let request = self.request(Method::PATCH, &format!("rentals/{rental}/end"))?;
        let closed: RentalClosed = self.call(request).await?;
        let final_cost = Money::new(closed.total_cost)
            .map_err(|e| BackendError::Transport(format!("malformed settlement: {e}")))?;
        Ok(Settlement {
            final_cost,
            duration_minutes: closed.duration_minutes,
        })
    }
}
