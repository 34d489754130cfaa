//! Process settings read from the environment. CLI flags override them.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::context::{Environment, ExecutionContext};
use crate::query::paging::DEFAULT_PAGE_SIZE;
use crate::query::{Shaper, SortFieldPolicy};
use crate::store::{MIN_CONNECTIONS, StoreBuilder};
use crate::{Error, Result};

pub const DEFAULT_DATA_FILE: &str = "data/worldcities.csv";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub environment: Environment,
    pub data_file: PathBuf,
    pub page_size: i64,
    pub sort_policy: SortFieldPolicy,
    pub max_connections: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            environment: Environment::Production,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            page_size: DEFAULT_PAGE_SIZE,
            sort_policy: SortFieldPolicy::Strict,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`; absent or blank keys keep their
    /// defaults. An unrecognised `APP_ENV` resolves to production.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        settings.database_url = get("DATABASE_URL");
        if let Some(env) = get("APP_ENV") {
            settings.environment = Environment::parse_or_production(&env);
        }
        if let Some(path) = get("WORLDCITIES_DATA_FILE") {
            settings.data_file = PathBuf::from(path);
        }
        if let Some(raw) = get("WORLDCITIES_PAGE_SIZE") {
            settings.page_size = parse_value("WORLDCITIES_PAGE_SIZE", &raw)?;
            if settings.page_size < 1 {
                return Err(Error::InvalidConfig {
                    key: "WORLDCITIES_PAGE_SIZE",
                    value: raw,
                });
            }
        }
        if let Some(raw) = get("WORLDCITIES_SORT_POLICY") {
            settings.sort_policy = parse_value("WORLDCITIES_SORT_POLICY", &raw)?;
        }
        if let Some(raw) = get("WORLDCITIES_MAX_CONNECTIONS") {
            settings.max_connections = parse_value("WORLDCITIES_MAX_CONNECTIONS", &raw)?;
            if settings.max_connections < MIN_CONNECTIONS {
                return Err(Error::InvalidConfig {
                    key: "WORLDCITIES_MAX_CONNECTIONS",
                    value: raw,
                });
            }
        }
        Ok(settings)
    }

    pub fn execution_context(&self) -> ExecutionContext {
        let content_root = std::env::current_dir().unwrap_or_default();
        ExecutionContext::builder()
            .environment(self.environment)
            .content_root(content_root)
            .build()
    }

    pub fn shaper(&self) -> Shaper {
        Shaper::new().policy(self.sort_policy)
    }

    pub fn store_builder(&self) -> Option<StoreBuilder> {
        self.database_url.as_ref().map(|url| {
            StoreBuilder::new(url.clone())
                .max_connections(self.max_connections)
                .acquire_timeout(DEFAULT_ACQUIRE_TIMEOUT)
        })
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| Error::InvalidConfig {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.environment, Environment::Production);
        assert!(s.store_builder().is_none());
    }

    #[test]
    fn reads_every_key() {
        let s = settings(&[
            ("DATABASE_URL", "postgres://localhost/cities"),
            ("APP_ENV", "development"),
            ("WORLDCITIES_DATA_FILE", "/data/wc.csv"),
            ("WORLDCITIES_PAGE_SIZE", "25"),
            ("WORLDCITIES_SORT_POLICY", "Lenient"),
            ("WORLDCITIES_MAX_CONNECTIONS", "8"),
        ])
        .unwrap();
        assert_eq!(s.environment, Environment::Development);
        assert_eq!(s.data_file, PathBuf::from("/data/wc.csv"));
        assert_eq!(s.page_size, 25);
        assert_eq!(s.sort_policy, SortFieldPolicy::Lenient);
        assert_eq!(s.max_connections, 8);
        assert!(s.store_builder().is_some());
    }

    #[test]
    fn unknown_app_env_fails_closed() {
        let s = settings(&[("APP_ENV", "qa")]).unwrap();
        assert_eq!(s.environment, Environment::Production);
        assert!(s.execution_context().import_capability().is_err());
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = settings(&[("WORLDCITIES_PAGE_SIZE", "0")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { key: "WORLDCITIES_PAGE_SIZE", .. }));
        let err = settings(&[("WORLDCITIES_MAX_CONNECTIONS", "many")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        let err = settings(&[("WORLDCITIES_SORT_POLICY", "loose")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn pool_must_fit_the_import_lock() {
        for raw in ["0", "1"] {
            let err = settings(&[("WORLDCITIES_MAX_CONNECTIONS", raw)]).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig { key: "WORLDCITIES_MAX_CONNECTIONS", .. }));
        }
        let s = settings(&[("WORLDCITIES_MAX_CONNECTIONS", "2")]).unwrap();
        assert_eq!(s.max_connections, MIN_CONNECTIONS);
    }
}
