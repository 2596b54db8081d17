use super::money::Money;
use crate::error::RentalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TariffId(pub u32);

impl fmt::Display for TariffId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    /// `rate` is charged for every elapsed minute.
    PerMinute,
    /// `rate` is a flat fee charged once, when the rental starts.
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: TariffId,
    pub name: String,
    pub mode: BillingMode,
    pub rate: Money,
}

impl Tariff {
    /// Cost owed at the moment the rental becomes active.
    pub fn initial_cost(&self) -> Money {
        match self.mode {
            BillingMode::PerMinute => Money::ZERO,
            BillingMode::Fixed => self.rate,
        }
    }

    /// Cost owed after `elapsed_minutes` whole minutes.
    pub fn cost_after(&self, elapsed_minutes: u32) -> Money {
        match self.mode {
            BillingMode::PerMinute => self.rate * elapsed_minutes,
            BillingMode::Fixed => self.rate,
        }
    }
}

/// Tariffs keyed by id.
///
/// The catalog is read-only once handed to the engine; new tariffs are added
/// while assembling configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TariffCatalog {
    tariffs: BTreeMap<TariffId, Tariff>,
}

#[derive(Deserialize)]
struct TariffFile {
    #[serde(default, rename = "tariff")]
    tariffs: Vec<Tariff>,
}

impl TariffCatalog {
    pub fn empty() -> Self {
        Self {
            tariffs: BTreeMap::new(),
        }
    }

    /// The two stock tariffs: 5.00 per minute, or 100.00 per ride.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::empty();
        catalog.insert(Tariff {
            id: TariffId(1),
            name: "Per minute".to_string(),
            mode: BillingMode::PerMinute,
            rate: Money::from_cents(500),
        });
        catalog.insert(Tariff {
            id: TariffId(2),
            name: "Fixed ride".to_string(),
            mode: BillingMode::Fixed,
            rate: Money::from_cents(10_000),
        });
        catalog
    }

    /// Adds a tariff, replacing any tariff with the same id.
    pub fn insert(&mut self, tariff: Tariff) -> Option<Tariff> {
        self.tariffs.insert(tariff.id, tariff)
    }

    /// Merges the `[[tariff]]` tables of a TOML document into the catalog.
    pub fn extend_from_toml(&mut self, source: &str) -> Result<usize, RentalError> {
        let file: TariffFile = toml::from_str(source)?;
        let count = file.tariffs.len();
        for tariff in file.tariffs {
            self.insert(tariff);
        }
        Ok(count)
    }

    pub fn resolve(&self, id: TariffId) -> Result<&Tariff, RentalError> {
        self.tariffs
            .get(&id)
            .ok_or(RentalError::UnknownTariffError(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tariff> {
        self.tariffs.values()
    }

    pub fn len(&self) -> usize {
        self.tariffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tariffs.is_empty()
    }
}

impl Default for TariffCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}
