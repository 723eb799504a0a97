/// Error taxonomy shared by every collaborator store.
///
/// Stages decide between dropping and retrying a message purely from the
/// variant, so backends must map their native errors carefully.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("transient store error: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::AlreadyExists,
            sqlx::Error::Database(db) if db.is_check_violation() => {
                StoreError::InvalidFormat(db.message().to_owned())
            }
            other => StoreError::Transient(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Transient(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        StoreError::Transient(e.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for StoreError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        StoreError::Transient(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        StoreError::Transient(format!("lock poisoned: {e}"))
    }
}
