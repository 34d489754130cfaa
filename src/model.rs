use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fields::{Field, FieldKind, FieldValue, Record};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub id: i32,
    pub name: String,
    pub iso2: String,
    pub iso3: String,
}

/// A country that has not been assigned an id yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCountry {
    pub name: String,
    pub iso2: String,
    pub iso3: String,
}

impl NewCountry {
    pub fn new(name: impl Into<String>, iso2: impl Into<String>, iso3: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            iso2: iso2.into(),
            iso3: iso3.into(),
        }
    }

    pub fn with_id(self, id: i32) -> Country {
        Country {
            id,
            name: self.name,
            iso2: self.iso2,
            iso3: self.iso3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct City {
    pub id: i32,
    pub name: String,
    pub lat: Decimal,
    pub lon: Decimal,
    pub country_id: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCity {
    pub name: String,
    pub lat: Decimal,
    pub lon: Decimal,
    pub country_id: i32,
}

impl NewCity {
    pub fn new(name: impl Into<String>, lat: Decimal, lon: Decimal, country_id: i32) -> Self {
        Self {
            name: name.into(),
            lat,
            lon,
            country_id,
        }
    }

    pub fn with_id(self, id: i32) -> City {
        City {
            id,
            name: self.name,
            lat: self.lat,
            lon: self.lon,
            country_id: self.country_id,
        }
    }
}

fn country_id(c: &Country) -> FieldValue<'_> {
    FieldValue::Integer(c.id.into())
}

fn country_name(c: &Country) -> FieldValue<'_> {
    FieldValue::Text(&c.name)
}

fn country_iso2(c: &Country) -> FieldValue<'_> {
    FieldValue::Text(&c.iso2)
}

fn country_iso3(c: &Country) -> FieldValue<'_> {
    FieldValue::Text(&c.iso3)
}

static COUNTRY_FIELDS: [Field<Country>; 4] = [
    Field::new("id", "id", FieldKind::Integer, country_id),
    Field::new("name", "name", FieldKind::Text, country_name),
    Field::new("iso2", "iso2", FieldKind::Text, country_iso2),
    Field::new("iso3", "iso3", FieldKind::Text, country_iso3),
];

impl Record for Country {
    const NAME: &'static str = "Country";
    const TABLE: &'static str = "countries";

    fn fields() -> &'static [Field<Self>] {
        &COUNTRY_FIELDS
    }

    fn id(&self) -> i32 {
        self.id
    }
}

fn city_id(c: &City) -> FieldValue<'_> {
    FieldValue::Integer(c.id.into())
}

fn city_name(c: &City) -> FieldValue<'_> {
    FieldValue::Text(&c.name)
}

fn city_lat(c: &City) -> FieldValue<'_> {
    FieldValue::Decimal(c.lat)
}

fn city_lon(c: &City) -> FieldValue<'_> {
    FieldValue::Decimal(c.lon)
}

fn city_country_id(c: &City) -> FieldValue<'_> {
    FieldValue::Integer(c.country_id.into())
}

static CITY_FIELDS: [Field<City>; 5] = [
    Field::new("id", "id", FieldKind::Integer, city_id),
    Field::new("name", "name", FieldKind::Text, city_name),
    Field::new("lat", "lat", FieldKind::Decimal, city_lat),
    Field::new("lon", "lon", FieldKind::Decimal, city_lon),
    Field::new("countryId", "country_id", FieldKind::Integer, city_country_id),
];

impl Record for City {
    const NAME: &'static str = "City";
    const TABLE: &'static str = "cities";

    fn fields() -> &'static [Field<Self>] {
        &CITY_FIELDS
    }

    fn id(&self) -> i32 {
        self.id
    }
}
