//! Idempotent two-phase import of countries and their cities.
//!
//! Phase A writes every unseen country in one batch. Phase B starts only after
//! that batch is persisted, because city rows resolve their country id by name
//! against the ids assigned there.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::context::{ExecutionContext, ImportCapability};
use crate::model::{City, Country, NewCity, NewCountry};
use crate::sheet::{Sheet, SheetRow};
use crate::{Error, Result, metrics};

/// 1-based source columns.
pub mod columns {
    pub const CITY_NAME: usize = 1;
    pub const CITY_NAME_ASCII: usize = 2;
    pub const LAT: usize = 3;
    pub const LON: usize = 4;
    pub const COUNTRY_NAME: usize = 5;
    pub const ISO2: usize = 6;
    pub const ISO3: usize = 7;
}

/// Storage precision of lat/lon.
pub const COORDINATE_SCALE: u32 = 4;

const MAX_LAT: Decimal = Decimal::from_parts(90, 0, 0, false, 0);
const MAX_LON: Decimal = Decimal::from_parts(180, 0, 0, false, 0);

/// Where imported records are read from and written to.
#[async_trait]
pub trait ImportTarget: Send + Sync {
    async fn load_countries(&self) -> Result<Vec<Country>>;

    /// Persists the batch and returns it with assigned ids.
    async fn insert_countries(&self, batch: Vec<NewCountry>) -> Result<Vec<Country>>;

    async fn load_cities(&self) -> Result<Vec<City>>;

    async fn insert_cities(&self, batch: Vec<NewCity>) -> Result<Vec<City>>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub countries_added: usize,
    pub cities_added: usize,
    pub rows_skipped: usize,
}

/// Case-insensitive country lookup key.
pub fn country_key(name: &str) -> String {
    name.to_lowercase()
}

pub fn round_coordinate(value: Decimal) -> Decimal {
    value.round_dp(COORDINATE_SCALE).normalize()
}

/// Natural key of a city: homonyms are common, so name alone is not enough.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CityKey {
    name: String,
    lat: Decimal,
    lon: Decimal,
    country_id: i32,
}

impl CityKey {
    pub fn new(name: &str, lat: Decimal, lon: Decimal, country_id: i32) -> Self {
        Self {
            name: name.to_string(),
            lat: round_coordinate(lat),
            lon: round_coordinate(lon),
            country_id,
        }
    }

    pub fn of(city: &City) -> Self {
        Self::new(&city.name, city.lat, city.lon, city.country_id)
    }
}

struct CountryRow {
    name: String,
    iso2: String,
    iso3: String,
}

impl CountryRow {
    fn parse(row: &SheetRow) -> Result<Self> {
        let name = row
            .text(columns::COUNTRY_NAME)
            .ok_or_else(|| malformed(row, "missing country name"))?;
        Ok(Self {
            name,
            iso2: row.text(columns::ISO2).unwrap_or_default(),
            iso3: row.text(columns::ISO3).unwrap_or_default(),
        })
    }
}

struct CityRow {
    name: String,
    lat: Decimal,
    lon: Decimal,
    country: String,
}

impl CityRow {
    fn parse(row: &SheetRow) -> Result<Self> {
        let name = row
            .text(columns::CITY_NAME)
            .ok_or_else(|| malformed(row, "missing city name"))?;
        let lat = row
            .decimal(columns::LAT)
            .ok_or_else(|| malformed(row, "lat is not a number"))?;
        let lon = row
            .decimal(columns::LON)
            .ok_or_else(|| malformed(row, "lon is not a number"))?;
        let country = row
            .text(columns::COUNTRY_NAME)
            .ok_or_else(|| malformed(row, "missing country name"))?;
        let (lat, lon) = (round_coordinate(lat), round_coordinate(lon));
        if lat.abs() > MAX_LAT {
            return Err(malformed(row, "lat is outside [-90, 90]"));
        }
        if lon.abs() > MAX_LON {
            return Err(malformed(row, "lon is outside [-180, 180]"));
        }
        Ok(Self {
            name,
            lat,
            lon,
            country,
        })
    }
}

fn malformed(row: &SheetRow, reason: &str) -> Error {
    Error::MalformedRow {
        row: row.number(),
        reason: reason.to_string(),
    }
}

// Overlapping runs could both miss the same row in their lookups.
static IMPORT_LOCK: Mutex<()> = Mutex::const_new(());

pub struct Importer<'a, S: ?Sized> {
    target: &'a S,
    skipped: HashSet<usize>,
}

impl<'a, S> Importer<'a, S>
where
    S: ImportTarget + ?Sized,
{
    pub fn new(target: &'a S) -> Self {
        Self {
            target,
            skipped: HashSet::new(),
        }
    }

    #[instrument(skip_all, fields(environment = %capability.environment(), rows = sheet.data_rows().len()))]
    pub async fn run(mut self, capability: &ImportCapability, sheet: &Sheet) -> Result<ImportOutcome> {
        let _guard = IMPORT_LOCK.lock().await;

        let (countries_by_name, countries_added) = self.merge_countries(sheet).await?;
        info!(countries_added, known = countries_by_name.len(), "countries merged");

        let cities_added = self.merge_cities(sheet, &countries_by_name).await?;
        info!(cities_added, "cities merged");

        let outcome = ImportOutcome {
            countries_added,
            cities_added,
            rows_skipped: self.skipped.len(),
        };
        metrics::record_import(
            outcome.countries_added as u64,
            outcome.cities_added as u64,
            outcome.rows_skipped as u64,
        );
        Ok(outcome)
    }

    async fn merge_countries(&mut self, sheet: &Sheet) -> Result<(HashMap<String, i32>, usize)> {
        let mut countries_by_name: HashMap<String, i32> = self
            .target
            .load_countries()
            .await?
            .into_iter()
            .map(|c| (country_key(&c.name), c.id))
            .collect();

        let mut staged_keys = HashSet::new();
        let mut staged = Vec::new();
        for row in sheet.data_rows() {
            let parsed = match CountryRow::parse(row) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.skip(row, &err);
                    continue;
                }
            };
            let key = country_key(&parsed.name);
            if countries_by_name.contains_key(&key) || !staged_keys.insert(key) {
                continue;
            }
            staged.push(NewCountry::new(parsed.name, parsed.iso2, parsed.iso3));
        }

        if staged.is_empty() {
            return Ok((countries_by_name, 0));
        }
        let inserted = self.target.insert_countries(staged).await?;
        let added = inserted.len();
        for country in inserted {
            countries_by_name.insert(country_key(&country.name), country.id);
        }
        Ok((countries_by_name, added))
    }

    async fn merge_cities(
        &mut self,
        sheet: &Sheet,
        countries_by_name: &HashMap<String, i32>,
    ) -> Result<usize> {
        let mut cities_by_key: HashSet<CityKey> = self
            .target
            .load_cities()
            .await?
            .iter()
            .map(CityKey::of)
            .collect();

        let mut staged = Vec::new();
        for row in sheet.data_rows() {
            let parsed = match CityRow::parse(row) {
                Ok(parsed) => parsed,
                Err(err) => {
                    self.skip(row, &err);
                    continue;
                }
            };
            let Some(&country_id) = countries_by_name.get(&country_key(&parsed.country)) else {
                let err = Error::UnresolvedForeignKey {
                    city: parsed.name,
                    country: parsed.country,
                };
                self.skip(row, &err);
                continue;
            };
            if !cities_by_key.insert(CityKey::new(&parsed.name, parsed.lat, parsed.lon, country_id)) {
                continue;
            }
            staged.push(NewCity::new(parsed.name, parsed.lat, parsed.lon, country_id));
        }

        if staged.is_empty() {
            return Ok(0);
        }
        Ok(self.target.insert_cities(staged).await?.len())
    }

    fn skip(&mut self, row: &SheetRow, err: &Error) {
        if self.skipped.insert(row.number()) {
            warn!(row = row.number(), error = %err, "skipping import row");
        }
    }
}

/// Imports `sheet` into `target`. Requires an [`ImportCapability`].
pub async fn import_sheet<S>(
    capability: &ImportCapability,
    sheet: &Sheet,
    target: &S,
) -> Result<ImportOutcome>
where
    S: ImportTarget + ?Sized,
{
    Importer::new(target).run(capability, sheet).await
}

/// Checks the context first, then reads the CSV at `path` (relative paths
/// resolve against the content root) and imports it.
pub async fn import_file<S>(ctx: &ExecutionContext, path: &Path, target: &S) -> Result<ImportOutcome>
where
    S: ImportTarget + ?Sized,
{
    let capability = ctx.import_capability()?;
    let sheet = Sheet::from_csv_path(&ctx.resolve_path(path))?;
    import_sheet(&capability, &sheet, target).await
}
