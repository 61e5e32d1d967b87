//! Mapping from `sqlx` errors to store errors.

use storefront_core::store::StoreError;

/// SQLite result codes meaning another connection holds the lock:
/// BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT.
const BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| BUSY_CODES.contains(&code.as_ref())) =>
        {
            StoreError::Busy(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Busy(e.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(e.to_string())
        }
        _ => StoreError::Query(e.to_string()),
    }
}

pub(crate) fn open_err(e: sqlx::Error) -> StoreError {
    StoreError::Open(e.to_string())
}

pub(crate) fn corrupt(what: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(what.to_string())
}
