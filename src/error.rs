use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{record} has no sortable or filterable field `{field}`")]
    InvalidField { record: &'static str, field: String },
    #[error("{record}.{field} is not a text field and cannot be prefix-filtered")]
    UnfilterableField {
        record: &'static str,
        field: &'static str,
    },
    #[error("invalid paging parameters: page index {page_index}, page size {page_size}")]
    InvalidPageParameters { page_index: i64, page_size: i64 },
    #[error("import is not allowed in the {environment} environment")]
    UnauthorizedImport { environment: String },
    #[error("{resource} is unavailable: {source}")]
    SourceUnavailable {
        resource: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("city `{city}` references unknown country `{country}`")]
    UnresolvedForeignKey { city: String, country: String },
    #[error("row {row} is malformed: {reason}")]
    MalformedRow { row: usize, reason: String },
    #[error("{record} {id} not found")]
    NotFound { record: &'static str, id: i32 },
    #[error("constraint violation on `{constraint}`: {detail}")]
    ConstraintViolation { constraint: String, detail: String },
    #[error("invalid value `{value}` for {key}")]
    InvalidConfig { key: &'static str, value: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True for errors caused by the caller's parameters rather than by the service.
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::InvalidField { .. }
            | Error::UnfilterableField { .. }
            | Error::InvalidPageParameters { .. } => true,
            Error::Context { source, .. } => source.is_client_error(),
            _ => false,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        match self {
            Error::UnauthorizedImport { .. } => true,
            Error::Context { source, .. } => source.is_access_denied(),
            _ => false,
        }
    }

    pub(crate) fn unavailable(
        resource: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::SourceUnavailable {
            resource: resource.into(),
            source: Box::new(source),
        }
    }

    /// Maps foreign key and unique violations onto `ConstraintViolation`.
    pub(crate) fn from_db(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_foreign_key_violation() || db.is_unique_violation() {
                return Error::ConstraintViolation {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                    detail: db.message().to_string(),
                };
            }
        }
        Error::Db(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait WithContext<T> {
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T> WithContext<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: msg.into(),
            source: Box::new(e),
        })
    }
}
