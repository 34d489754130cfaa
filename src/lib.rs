//! worldcities: countries and cities reference data over Postgres, with
//! paged, sorted and filtered queries and an idempotent spreadsheet import.

pub mod config;
pub mod context;
mod error;
pub mod fields;
pub mod import;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod query;
pub mod sheet;
pub mod source;
pub mod store;
pub mod tables;
pub mod testing;

pub use context::{Environment, ExecutionContext, ImportCapability};
pub use error::{Error, Result, WithContext};
pub use fields::{Field, FieldKind, FieldRegistry, FieldValue, Record};
pub use import::{ImportOutcome, ImportTarget, import_file, import_sheet};
pub use memory::MemoryStore;
pub use model::{City, Country, NewCity, NewCountry};
pub use query::{PageRequest, PageResult, Shaper, SortFieldPolicy};
pub use source::RecordSource;
pub use store::{Store, StoreBuilder};
pub use tables::Table;

pub mod prelude {
    pub use crate::{
        City, Country, ExecutionContext, PageRequest, PageResult, RecordSource, Result, Shaper,
        Store,
    };
}
