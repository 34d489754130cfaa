//! Whitelisted, typed fields per record type.
//!
//! Every name a caller may sort or filter by is declared here ahead of time
//! together with its SQL column and an accessor. Request strings are only ever
//! compared against these names; they are never spliced into a query.

use std::cmp::Ordering;
use std::fmt;

use rust_decimal::Decimal;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Decimal,
    Text,
}

impl FieldKind {
    pub fn is_text(self) -> bool {
        matches!(self, FieldKind::Text)
    }
}

/// A borrowed field value. Variants of one field never mix, so the derived
/// ordering compares like with like: numbers numerically, text by bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue<'a> {
    Integer(i64),
    Decimal(Decimal),
    Text(&'a str),
}

impl<'a> FieldValue<'a> {
    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            FieldValue::Text(s) => Some(*s),
            _ => None,
        }
    }
}

pub type Accessor<T> = fn(&T) -> FieldValue<'_>;

pub struct Field<T> {
    name: &'static str,
    column: &'static str,
    kind: FieldKind,
    accessor: Accessor<T>,
}

impl<T> Field<T> {
    pub const fn new(
        name: &'static str,
        column: &'static str,
        kind: FieldKind,
        accessor: Accessor<T>,
    ) -> Self {
        Self {
            name,
            column,
            kind,
            accessor,
        }
    }

    /// Public (API) name, as echoed in JSON.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn column(&self) -> &'static str {
        self.column
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn value<'r>(&self, record: &'r T) -> FieldValue<'r> {
        (self.accessor)(record)
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.value(a).cmp(&self.value(b))
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A persisted record type with a fixed set of queryable fields.
pub trait Record: Sized + Send + Sync + 'static {
    /// Human readable type name used in errors.
    const NAME: &'static str;
    const TABLE: &'static str;

    fn fields() -> &'static [Field<Self>];

    fn id(&self) -> i32;

    fn registry() -> FieldRegistry<Self> {
        FieldRegistry::new(Self::fields())
    }
}

#[derive(Debug)]
pub struct FieldRegistry<T: 'static> {
    fields: &'static [Field<T>],
}

impl<T: Record> Clone for FieldRegistry<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Record> Copy for FieldRegistry<T> {}

impl<T: Record> FieldRegistry<T> {
    pub fn new(fields: &'static [Field<T>]) -> Self {
        Self { fields }
    }

    /// Case-insensitive exact lookup. No trimming: `" name"` does not resolve.
    pub fn resolve(&self, name: &str) -> Option<&'static Field<T>> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    pub fn require(&self, name: &str) -> Result<&'static Field<T>> {
        self.resolve(name).ok_or_else(|| Error::InvalidField {
            record: T::NAME,
            field: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }
}

pub fn resolve<T: Record>(name: &str) -> Option<&'static Field<T>> {
    T::registry().resolve(name)
}
