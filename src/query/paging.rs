//! Paging, sorting and filtering of a record source into a page envelope.

use std::time::Instant;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

use super::{MatchCase, QuerySpec, SortDirection, build_filter, build_order};
use crate::fields::Record;
use crate::metrics;
use crate::source::RecordSource;
use crate::{Error, Result};

pub const DEFAULT_PAGE_SIZE: i64 = 10;

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// What to do with a sort column that names no registered field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortFieldPolicy {
    /// Report it as `Error::InvalidField`.
    #[default]
    Strict,
    /// Ignore it and return rows unsorted.
    Lenient,
}

impl std::str::FromStr for SortFieldPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SortFieldPolicy::Strict),
            "lenient" => Ok(SortFieldPolicy::Lenient),
            other => Err(format!("unknown sort policy `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    #[serde(default)]
    pub page_index: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub sort_column: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default)]
    pub filter_column: Option<String>,
    #[serde(default)]
    pub filter_query: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

impl PageRequest {
    pub fn new(page_index: i64, page_size: i64) -> Self {
        Self {
            page_index,
            page_size,
            sort_column: None,
            sort_order: None,
            filter_column: None,
            filter_query: None,
        }
    }

    pub fn sort(mut self, column: impl Into<String>, order: impl Into<String>) -> Self {
        self.sort_column = Some(column.into());
        self.sort_order = Some(order.into());
        self
    }

    pub fn filter(mut self, column: impl Into<String>, query: impl Into<String>) -> Self {
        self.filter_column = Some(column.into());
        self.filter_query = Some(query.into());
        self
    }

    fn offset(&self) -> Result<i64> {
        if self.page_index < 0 || self.page_size < 1 {
            return Err(self.invalid());
        }
        self.page_index
            .checked_mul(self.page_size)
            .ok_or_else(|| self.invalid())
    }

    fn invalid(&self) -> Error {
        Error::InvalidPageParameters {
            page_index: self.page_index,
            page_size: self.page_size,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// One page of records plus the paging metadata needed to navigate.
///
/// Only `total_count` and `page_size` are stored; page counts and navigation
/// flags are always derived from them.
#[derive(Clone, Debug, PartialEq)]
pub struct PageResult<T> {
    pub data: Vec<T>,
    pub page_index: i64,
    pub page_size: i64,
    pub sort_column: Option<String>,
    pub sort_order: Option<String>,
    pub filter_column: Option<String>,
    pub filter_query: Option<String>,
    pub total_count: i64,
}

impl<T> PageResult<T> {
    pub fn total_pages(&self) -> i64 {
        if self.page_size <= 0 || self.total_count <= 0 {
            return 0;
        }
        self.total_count / self.page_size + i64::from(self.total_count % self.page_size != 0)
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 0
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index < self.total_pages() - 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            data: self.data.into_iter().map(f).collect(),
            page_index: self.page_index,
            page_size: self.page_size,
            sort_column: self.sort_column,
            sort_order: self.sort_order,
            filter_column: self.filter_column,
            filter_query: self.filter_query,
            total_count: self.total_count,
        }
    }
}

impl<T: Serialize> Serialize for PageResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PageResult", 11)?;
        s.serialize_field("data", &self.data)?;
        s.serialize_field("pageIndex", &self.page_index)?;
        s.serialize_field("pageSize", &self.page_size)?;
        s.serialize_field("sortColumn", &self.sort_column)?;
        s.serialize_field("sortOrder", &self.sort_order)?;
        s.serialize_field("filterColumn", &self.filter_column)?;
        s.serialize_field("filterQuery", &self.filter_query)?;
        s.serialize_field("totalCount", &self.total_count)?;
        s.serialize_field("totalPages", &self.total_pages())?;
        s.serialize_field("hasPreviousPage", &self.has_previous_page())?;
        s.serialize_field("hasNextPage", &self.has_next_page())?;
        s.end()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Shaper {
    policy: SortFieldPolicy,
    match_case: MatchCase,
}

impl Shaper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: SortFieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn match_case(mut self, case: MatchCase) -> Self {
        self.match_case = case;
        self
    }

    /// Validates a request against `T`'s registry and turns it into a query.
    /// Nothing is read from any source here, so every parameter error
    /// surfaces before data is touched.
    pub fn plan<T: Record>(&self, request: &PageRequest) -> Result<QuerySpec<T>> {
        self.build_plan(request)
            .inspect_err(|_| metrics::record_query_rejected())
    }

    fn build_plan<T: Record>(&self, request: &PageRequest) -> Result<QuerySpec<T>> {
        let offset = request.offset()?;
        let registry = T::registry();
        let mut spec = QuerySpec::new().offset(offset).limit(request.page_size);

        if let (Some(column), Some(query)) = (
            non_empty(&request.filter_column),
            non_empty(&request.filter_query),
        ) {
            match registry.resolve(column) {
                Some(field) => spec = spec.filter(build_filter(field, query, self.match_case)?),
                None => {
                    metrics::record_filter_ignored();
                    debug!(record = T::NAME, column, "ignoring unknown filter column");
                }
            }
        }

        if let Some(column) = non_empty(&request.sort_column) {
            let field = match (registry.resolve(column), self.policy) {
                (Some(field), _) => Some(field),
                (None, SortFieldPolicy::Strict) => {
                    return Err(Error::InvalidField {
                        record: T::NAME,
                        field: column.to_string(),
                    });
                }
                (None, SortFieldPolicy::Lenient) => {
                    debug!(record = T::NAME, column, "ignoring unknown sort column");
                    None
                }
            };
            if let Some(field) = field {
                let direction = SortDirection::parse_or_default(request.sort_order.as_deref());
                spec = spec.order_by(build_order(field, direction));
            }
        }

        Ok(spec)
    }

    pub async fn shape<T, S>(&self, source: &S, request: PageRequest) -> Result<PageResult<T>>
    where
        T: Record,
        S: RecordSource<T> + ?Sized,
    {
        let start = Instant::now();
        let spec = self.plan::<T>(&request)?;

        let total_count = source.count(spec.predicate()).await?;
        let data = if spec.skip() >= total_count {
            Vec::new()
        } else {
            source.fetch(&spec).await?
        };
        metrics::record_query_duration(start.elapsed());

        Ok(PageResult {
            data,
            page_index: request.page_index,
            page_size: request.page_size,
            sort_column: request.sort_column,
            sort_order: request.sort_order,
            filter_column: request.filter_column,
            filter_query: request.filter_query,
            total_count,
        })
    }
}

/// Shapes `source` with the default (strict, case-insensitive) shaper.
pub async fn shape<T, S>(source: &S, request: PageRequest) -> Result<PageResult<T>>
where
    T: Record,
    S: RecordSource<T> + ?Sized,
{
    Shaper::new().shape(source, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Country;
    use serde_json::json;

    fn envelope(total_count: i64, page_index: i64, page_size: i64) -> PageResult<()> {
        PageResult {
            data: Vec::new(),
            page_index,
            page_size,
            sort_column: None,
            sort_order: None,
            filter_column: None,
            filter_query: None,
            total_count,
        }
    }

    #[test]
    fn page_counts_follow_total_count() {
        let cases = [
            (0, 0, 10, 0, false, false),
            (1, 0, 10, 1, false, false),
            (10, 0, 10, 1, false, false),
            (11, 0, 10, 2, false, true),
            (25, 1, 10, 3, true, true),
            (25, 2, 10, 3, true, false),
            (25, 7, 10, 3, true, false),
            (7, 0, 1, 7, false, true),
            (3, 0, i64::MAX, 1, false, false),
            (i64::MAX, 0, 1, i64::MAX, false, true),
            (i64::MAX, i64::MAX - 1, 1, i64::MAX, true, false),
            (5, i64::MAX, 1, 5, true, false),
        ];
        for (total, index, size, pages, prev, next) in cases {
            let page = envelope(total, index, size);
            assert_eq!(page.total_pages(), pages, "total={total} size={size}");
            assert_eq!(page.has_previous_page(), prev);
            assert_eq!(page.has_next_page(), next);
        }
    }

    #[test]
    fn rejects_bad_paging_parameters() {
        let shaper = Shaper::new();
        for (index, size) in [(0, 0), (0, -3), (-1, 10), (i64::MAX, 2)] {
            let err = shaper
                .plan::<Country>(&PageRequest::new(index, size))
                .unwrap_err();
            assert!(matches!(err, Error::InvalidPageParameters { .. }), "{index}/{size}");
        }
    }

    #[test]
    fn unknown_filter_column_means_no_filter() {
        let request = PageRequest::new(0, 10).filter("\"; DROP TABLE x", "a");
        let spec = Shaper::new().plan::<Country>(&request).unwrap();
        assert!(spec.predicate().is_none());
    }

    #[test]
    fn empty_parameters_count_as_absent() {
        let request = PageRequest::new(0, 10).sort("", "ASC").filter("name", "");
        let spec = Shaper::new().plan::<Country>(&request).unwrap();
        assert!(spec.predicate().is_none());
        assert!(spec.sort().is_none());
    }

    #[test]
    fn unknown_sort_column_depends_on_policy() {
        let request = PageRequest::new(0, 10).sort("population", "ASC");
        let err = Shaper::new().plan::<Country>(&request).unwrap_err();
        assert!(err.is_client_error());

        let spec = Shaper::new()
            .policy(SortFieldPolicy::Lenient)
            .plan::<Country>(&request)
            .unwrap();
        assert!(spec.sort().is_none());
    }

    #[test]
    fn sort_direction_falls_back_to_descending() {
        let request = PageRequest::new(0, 10).sort("NAME", "sideways");
        let spec = Shaper::new().plan::<Country>(&request).unwrap();
        let sort = spec.sort().unwrap();
        assert_eq!(sort.field().name(), "name");
        assert_eq!(sort.direction(), SortDirection::Desc);
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: PageRequest =
            serde_json::from_value(json!({"sortColumn": "name", "sortOrder": "ASC"})).unwrap();
        assert_eq!(request.page_index, 0);
        assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(request.sort_column.as_deref(), Some("name"));
    }

    #[test]
    fn envelope_serializes_derived_fields() {
        let mut page = envelope(25, 1, 10);
        page.sort_column = Some("Name".into());
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["totalPages"], json!(3));
        assert_eq!(value["hasPreviousPage"], json!(true));
        assert_eq!(value["hasNextPage"], json!(true));
        assert_eq!(value["sortColumn"], json!("Name"));
        assert_eq!(value["filterQuery"], json!(null));
    }
}
