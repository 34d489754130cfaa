use std::marker::PhantomData;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use indoc::formatdoc;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder, Transaction};
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use crate::fields::Record;
use crate::model::{City, Country, NewCity, NewCountry};
use crate::query::{PageRequest, PageResult, Predicate, QuerySpec, Shaper, build_count};
use crate::source::RecordSource;
use crate::{Error, Result};

const SLOW_QUERY: Duration = Duration::from_millis(500);

// Postgres accepts at most 65535 bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// A record type stored in its own Postgres table.
pub trait TableRecord: Record + for<'r> FromRow<'r, PgRow> + Send + Unpin {
    type New: Send + Sync + 'static;

    /// Select list, `id` first.
    const COLUMNS: &'static str;
    /// Columns written from `Self::New`, in bind order.
    const WRITE_COLUMNS: &'static str;
    const WRITE_ARITY: usize;

    fn bind_new(new: Self::New, values: &mut Separated<'_, 'static, Postgres, &'static str>);
}

impl TableRecord for Country {
    type New = NewCountry;

    const COLUMNS: &'static str = "id, name, iso2, iso3";
    const WRITE_COLUMNS: &'static str = "name, iso2, iso3";
    const WRITE_ARITY: usize = 3;

    fn bind_new(new: NewCountry, values: &mut Separated<'_, 'static, Postgres, &'static str>) {
        values.push_bind(new.name);
        values.push_bind(new.iso2);
        values.push_bind(new.iso3);
    }
}

impl TableRecord for City {
    type New = NewCity;

    const COLUMNS: &'static str = "id, name, lat, lon, country_id";
    const WRITE_COLUMNS: &'static str = "name, lat, lon, country_id";
    const WRITE_ARITY: usize = 4;

    fn bind_new(new: NewCity, values: &mut Separated<'_, 'static, Postgres, &'static str>) {
        values.push_bind(new.name);
        values.push_bind(new.lat);
        values.push_bind(new.lon);
        values.push_bind(new.country_id);
    }
}

/// Repository over one table.
pub struct Table<T> {
    pool: PgPool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: TableRecord> Table<T> {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, id: i32) -> Result<Option<T>> {
        let sql = format!("select {} from {} where id = $1", T::COLUMNS, T::TABLE);
        let row = sqlx::query_as::<_, T>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn all(&self) -> Result<Vec<T>> {
        let sql = format!("select {} from {} order by id", T::COLUMNS, T::TABLE);
        Ok(sqlx::query_as::<_, T>(&sql).fetch_all(&self.pool).await?)
    }

    pub async fn insert(&self, new: T::New) -> Result<T> {
        let mut inserted = self.insert_batch(vec![new]).await?;
        inserted.pop().ok_or(Error::Db(sqlx::Error::RowNotFound))
    }

    /// Inserts every row in one transaction and returns them with their ids.
    pub async fn insert_batch(&self, rows: Vec<T::New>) -> Result<Vec<T>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let chunk_size = MAX_BIND_PARAMS / T::WRITE_ARITY;
        let mut inserted = Vec::with_capacity(rows.len());
        let mut rows = rows.into_iter().peekable();

        let mut tx = self.pool.begin().await?;
        while rows.peek().is_some() {
            let chunk: Vec<T::New> = rows.by_ref().take(chunk_size).collect();
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "insert into {} ({}) ",
                T::TABLE,
                T::WRITE_COLUMNS
            ));
            builder.push_values(chunk, |mut values, row| T::bind_new(row, &mut values));
            builder.push(" returning ");
            builder.push(T::COLUMNS);
            let mut batch = builder
                .build_query_as::<T>()
                .fetch_all(&mut *tx)
                .await
                .map_err(Error::from_db)?;
            inserted.append(&mut batch);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn update(&self, id: i32, new: T::New) -> Result<T> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "update {} set ({}) = (",
            T::TABLE,
            T::WRITE_COLUMNS
        ));
        {
            let mut values = builder.separated(", ");
            T::bind_new(new, &mut values);
        }
        builder.push(") where id = ");
        builder.push_bind(id);
        builder.push(" returning ");
        builder.push(T::COLUMNS);

        builder
            .build_query_as::<T>()
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_db)?
            .ok_or(Error::NotFound {
                record: T::NAME,
                id,
            })
    }

    /// Returns false when no row had that id.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let sql = format!("delete from {} where id = $1", T::TABLE);
        let done = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_db)?;
        Ok(done.rows_affected() == 1)
    }

    /// Shapes one page inside a read-only repeatable-read transaction, so the
    /// total count and the rows come from the same snapshot.
    pub async fn page(&self, shaper: &Shaper, request: PageRequest) -> Result<PageResult<T>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("set transaction isolation level repeatable read, read only")
            .execute(&mut *tx)
            .await?;
        let snapshot = Snapshot::<T>::new(tx);
        let page = shaper.shape(&snapshot, request).await?;
        snapshot.tx.into_inner().commit().await?;
        Ok(page)
    }
}

impl Table<Country> {
    /// True when a country other than `country_id` already has `value` in
    /// `field`. The field name goes through the registry like any sort key.
    pub async fn is_duplicate_field(&self, country_id: i32, field: &str, value: &str) -> Result<bool> {
        let field = Country::registry().require(field)?;
        let sql = formatdoc!(
            "select exists (
                select 1 from countries where {column}::text = $1 and id <> $2
            )",
            column = field.column(),
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(value)
            .bind(country_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

impl Table<City> {
    /// True when another city shares this one's natural key.
    pub async fn is_duplicate(&self, city: &City) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            select exists (
                select 1 from cities
                where name = $1 and lat = $2 and lon = $3 and country_id = $4 and id <> $5
            )
            "#,
        )
        .bind(&city.name)
        .bind(city.lat)
        .bind(city.lon)
        .bind(city.country_id)
        .bind(city.id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

async fn count_rows<'e, T, E>(executor: E, filter: Option<&Predicate<T>>) -> Result<i64>
where
    T: TableRecord,
    E: PgExecutor<'e>,
{
    let mut builder = build_count(filter);
    let count = builder
        .build_query_scalar::<i64>()
        .fetch_one(executor)
        .await?;
    Ok(count)
}

#[instrument(skip_all, fields(table = T::TABLE))]
async fn fetch_rows<'e, T, E>(executor: E, query: &QuerySpec<T>) -> Result<Vec<T>>
where
    T: TableRecord,
    E: PgExecutor<'e>,
{
    let mut builder = query.build_select(T::COLUMNS);
    let sql_captured = builder.sql().to_string();
    let start = Instant::now();
    let rows = builder.build_query_as::<T>().fetch_all(executor).await?;
    if start.elapsed() > SLOW_QUERY {
        warn!(target: "worldcities::slow_query", elapsed_ms = start.elapsed().as_millis() as u64, sql = %sql_captured, "slow page query");
    }
    Ok(rows)
}

/// Each statement runs on whichever pooled connection is free. Use
/// [`Table::page`] when count and rows must agree under concurrent writes.
#[async_trait]
impl<T: TableRecord> RecordSource<T> for Table<T> {
    async fn count(&self, filter: Option<&Predicate<T>>) -> Result<i64> {
        count_rows(&self.pool, filter).await
    }

    async fn fetch(&self, query: &QuerySpec<T>) -> Result<Vec<T>> {
        fetch_rows(&self.pool, query).await
    }
}

/// A table read through one open transaction.
struct Snapshot<T> {
    tx: Mutex<Transaction<'static, Postgres>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Snapshot<T> {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Mutex::new(tx),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TableRecord> RecordSource<T> for Snapshot<T> {
    async fn count(&self, filter: Option<&Predicate<T>>) -> Result<i64> {
        let mut tx = self.tx.lock().await;
        count_rows(&mut **tx, filter).await
    }

    async fn fetch(&self, query: &QuerySpec<T>) -> Result<Vec<T>> {
        let mut tx = self.tx.lock().await;
        fetch_rows(&mut **tx, query).await
    }
}
