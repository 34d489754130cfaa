//! In-process store with the same id assignment and constraints as the
//! Postgres schema. Backs tests and dry runs.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::import::{ImportTarget, country_key};
use crate::model::{City, Country, NewCity, NewCountry};
use crate::query::{Predicate, QuerySpec};
use crate::source::RecordSource;
use crate::{Error, Result};

#[derive(Default)]
struct Tables {
    countries: Vec<Country>,
    cities: Vec<City>,
    last_country_id: i32,
    last_city_id: i32,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn countries(&self) -> Vec<Country> {
        self.tables
            .read()
            .expect("memory store poisoned")
            .countries
            .clone()
    }

    pub fn cities(&self) -> Vec<City> {
        self.tables
            .read()
            .expect("memory store poisoned")
            .cities
            .clone()
    }

    /// Inserts all countries or none.
    pub fn add_countries(&self, batch: Vec<NewCountry>) -> Result<Vec<Country>> {
        let mut tables = self.tables.write().expect("memory store poisoned");
        let mut names: HashSet<String> = tables
            .countries
            .iter()
            .map(|c| country_key(&c.name))
            .collect();
        for country in &batch {
            if !names.insert(country_key(&country.name)) {
                return Err(Error::ConstraintViolation {
                    constraint: "countries_name_key".into(),
                    detail: format!("country `{}` already exists", country.name),
                });
            }
        }

        let mut inserted = Vec::with_capacity(batch.len());
        for country in batch {
            tables.last_country_id += 1;
            let country = country.with_id(tables.last_country_id);
            tables.countries.push(country.clone());
            inserted.push(country);
        }
        Ok(inserted)
    }

    /// Inserts all cities or none.
    pub fn add_cities(&self, batch: Vec<NewCity>) -> Result<Vec<City>> {
        let mut tables = self.tables.write().expect("memory store poisoned");
        let country_ids: HashSet<i32> = tables.countries.iter().map(|c| c.id).collect();
        if let Some(orphan) = batch.iter().find(|c| !country_ids.contains(&c.country_id)) {
            return Err(Error::ConstraintViolation {
                constraint: "cities_country_id_fkey".into(),
                detail: format!("country {} does not exist", orphan.country_id),
            });
        }

        let mut inserted = Vec::with_capacity(batch.len());
        for city in batch {
            tables.last_city_id += 1;
            let city = city.with_id(tables.last_city_id);
            tables.cities.push(city.clone());
            inserted.push(city);
        }
        Ok(inserted)
    }
}

#[async_trait]
impl RecordSource<Country> for MemoryStore {
    async fn count(&self, filter: Option<&Predicate<Country>>) -> Result<i64> {
        let tables = self.tables.read().expect("memory store poisoned");
        let count = tables
            .countries
            .iter()
            .filter(|c| filter.is_none_or(|p| p.matches(c)))
            .count();
        Ok(count as i64)
    }

    async fn fetch(&self, query: &QuerySpec<Country>) -> Result<Vec<Country>> {
        let tables = self.tables.read().expect("memory store poisoned");
        Ok(query.apply(&tables.countries).into_iter().cloned().collect())
    }
}

#[async_trait]
impl RecordSource<City> for MemoryStore {
    async fn count(&self, filter: Option<&Predicate<City>>) -> Result<i64> {
        let tables = self.tables.read().expect("memory store poisoned");
        let count = tables
            .cities
            .iter()
            .filter(|c| filter.is_none_or(|p| p.matches(c)))
            .count();
        Ok(count as i64)
    }

    async fn fetch(&self, query: &QuerySpec<City>) -> Result<Vec<City>> {
        let tables = self.tables.read().expect("memory store poisoned");
        Ok(query.apply(&tables.cities).into_iter().cloned().collect())
    }
}

#[async_trait]
impl ImportTarget for MemoryStore {
    async fn load_countries(&self) -> Result<Vec<Country>> {
        Ok(self.countries())
    }

    async fn insert_countries(&self, batch: Vec<NewCountry>) -> Result<Vec<Country>> {
        self.add_countries(batch)
    }

    async fn load_cities(&self) -> Result<Vec<City>> {
        Ok(self.cities())
    }

    async fn insert_cities(&self, batch: Vec<NewCity>) -> Result<Vec<City>> {
        self.add_cities(batch)
    }
}
