use async_trait::async_trait;

use crate::Result;
use crate::fields::Record;
use crate::query::{Predicate, QuerySpec};

/// A countable, filterable, sortable and pageable sequence of `T`.
#[async_trait]
pub trait RecordSource<T: Record>: Send + Sync {
    async fn count(&self, filter: Option<&Predicate<T>>) -> Result<i64>;

    async fn fetch(&self, query: &QuerySpec<T>) -> Result<Vec<T>>;
}

#[async_trait]
impl<T> RecordSource<T> for [T]
where
    T: Record + Clone,
{
    async fn count(&self, filter: Option<&Predicate<T>>) -> Result<i64> {
        let count = match filter {
            Some(predicate) => self.iter().filter(|row| predicate.matches(row)).count(),
            None => self.len(),
        };
        Ok(count as i64)
    }

    async fn fetch(&self, query: &QuerySpec<T>) -> Result<Vec<T>> {
        Ok(query.apply(self).into_iter().cloned().collect())
    }
}

#[async_trait]
impl<T> RecordSource<T> for Vec<T>
where
    T: Record + Clone,
{
    async fn count(&self, filter: Option<&Predicate<T>>) -> Result<i64> {
        RecordSource::count(self.as_slice(), filter).await
    }

    async fn fetch(&self, query: &QuerySpec<T>) -> Result<Vec<T>> {
        RecordSource::fetch(self.as_slice(), query).await
    }
}
