use std::cmp::Ordering;
use std::fmt;

use sqlx::{Postgres, QueryBuilder};

use crate::fields::{Field, Record};
use crate::{Error, Result};

pub mod paging;

pub use paging::{PageRequest, PageResult, Shaper, SortFieldPolicy, shape};

/// Direction for sorting results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// `"asc"` in any case selects ascending; anything else, including no
    /// value at all, falls back to descending.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchCase {
    Sensitive,
    #[default]
    Insensitive,
}

/// Prefix match on a single text field.
///
/// Case-insensitive matching folds ASCII letters only, in memory and in
/// Postgres alike (`lower()` under the "C" collation), so both stores select
/// the same rows whatever the database locale.
pub struct Predicate<T: 'static> {
    field: &'static Field<T>,
    query: String,
    case: MatchCase,
}

impl<T: Record> Predicate<T> {
    pub fn field(&self) -> &'static Field<T> {
        self.field
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn case(&self) -> MatchCase {
        self.case
    }

    pub fn matches(&self, record: &T) -> bool {
        let Some(text) = self.field.value(record).as_text() else {
            return false;
        };
        match self.case {
            MatchCase::Sensitive => text.starts_with(&self.query),
            MatchCase::Insensitive => text
                .as_bytes()
                .get(..self.query.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(self.query.as_bytes())),
        }
    }

    pub(crate) fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        match self.case {
            MatchCase::Sensitive => {
                builder.push("starts_with(");
                builder.push(self.field.column());
                builder.push(", ");
                builder.push_bind(self.query.clone());
                builder.push(")");
            }
            MatchCase::Insensitive => {
                builder.push("starts_with(lower(");
                builder.push(self.field.column());
                builder.push(" collate \"C\"), lower(");
                builder.push_bind(self.query.clone());
                builder.push(" collate \"C\"))");
            }
        }
    }
}

impl<T: 'static> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            query: self.query.clone(),
            case: self.case,
        }
    }
}

impl<T: 'static> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("field", &self.field)
            .field("query", &self.query)
            .field("case", &self.case)
            .finish()
    }
}

/// Single-key ordering.
pub struct SortSpec<T: 'static> {
    field: &'static Field<T>,
    direction: SortDirection,
}

impl<T: Record> SortSpec<T> {
    pub fn field(&self) -> &'static Field<T> {
        self.field
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        let ord = self.field.compare(a, b);
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }

    pub(crate) fn push_sql(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(self.field.column());
        if self.field.kind().is_text() {
            // byte order, independent of the database collation
            builder.push(" collate \"C\"");
        }
        builder.push(" ");
        builder.push(self.direction.as_str());
    }
}

impl<T: 'static> Clone for SortSpec<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            direction: self.direction,
        }
    }
}

impl<T: 'static> fmt::Debug for SortSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortSpec")
            .field("field", &self.field)
            .field("direction", &self.direction)
            .finish()
    }
}

pub fn build_filter<T: Record>(
    field: &'static Field<T>,
    query: impl Into<String>,
    case: MatchCase,
) -> Result<Predicate<T>> {
    if !field.kind().is_text() {
        return Err(Error::UnfilterableField {
            record: T::NAME,
            field: field.name(),
        });
    }
    Ok(Predicate {
        field,
        query: query.into(),
        case,
    })
}

pub fn build_order<T: Record>(field: &'static Field<T>, direction: SortDirection) -> SortSpec<T> {
    SortSpec { field, direction }
}

/// Everything a source needs to produce one page.
pub struct QuerySpec<T: 'static> {
    filter: Option<Predicate<T>>,
    sort: Option<SortSpec<T>>,
    offset: i64,
    limit: Option<i64>,
}

impl<T: 'static> Default for QuerySpec<T> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            offset: 0,
            limit: None,
        }
    }
}

impl<T: 'static> fmt::Debug for QuerySpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("filter", &self.filter)
            .field("sort", &self.sort)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

impl<T: Record> QuerySpec<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate<T>) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn order_by(mut self, sort: SortSpec<T>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset.max(0);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit.max(0));
        self
    }

    pub fn predicate(&self) -> Option<&Predicate<T>> {
        self.filter.as_ref()
    }

    pub fn sort(&self) -> Option<&SortSpec<T>> {
        self.sort.as_ref()
    }

    pub fn skip(&self) -> i64 {
        self.offset
    }

    pub fn take(&self) -> Option<i64> {
        self.limit
    }

    /// Runs the spec over an in-memory slice: filter, stable sort, window.
    pub fn apply<'a>(&self, rows: impl IntoIterator<Item = &'a T>) -> Vec<&'a T> {
        let mut rows: Vec<&T> = rows
            .into_iter()
            .filter(|row| self.filter.as_ref().is_none_or(|p| p.matches(row)))
            .collect();
        if let Some(sort) = &self.sort {
            rows.sort_by(|a, b| sort.compare(a, b));
        }
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let take = self
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        rows.into_iter().skip(skip).take(take).collect()
    }

    pub(crate) fn build_select(&self, columns: &str) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("select ");
        builder.push(columns);
        builder.push(" from ");
        builder.push(T::TABLE);
        push_where(&mut builder, self.filter.as_ref());

        builder.push(" order by ");
        if let Some(sort) = &self.sort {
            sort.push_sql(&mut builder);
            builder.push(", ");
        }
        builder.push("id asc");

        if let Some(limit) = self.limit {
            builder.push(" limit ");
            builder.push_bind(limit);
        }
        if self.offset > 0 {
            builder.push(" offset ");
            builder.push_bind(self.offset);
        }
        builder
    }
}

pub(crate) fn build_count<T: Record>(
    filter: Option<&Predicate<T>>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("select count(*) from ");
    builder.push(T::TABLE);
    push_where(&mut builder, filter);
    builder
}

fn push_where<T: Record>(builder: &mut QueryBuilder<'_, Postgres>, filter: Option<&Predicate<T>>) {
    if let Some(predicate) = filter {
        builder.push(" where ");
        predicate.push_sql(builder);
    }
}
