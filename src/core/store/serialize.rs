//! SQLite serialization for typed columns
//!
//! Implements ToSql and FromSql for EntityId and RequestStatus
//! to enable typed storage and retrieval from SQLite.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::core::identity::EntityId;
use crate::entities::request::RequestStatus;

fn invalid_data(message: String) -> FromSqlError {
    FromSqlError::Other(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        message,
    )))
}

// =========================================================================
// EntityId - ToSql/FromSql
// =========================================================================

impl ToSql for EntityId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for EntityId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e: crate::core::identity::IdParseError| invalid_data(e.to_string()))
    }
}

// =========================================================================
// RequestStatus - ToSql/FromSql
// =========================================================================

impl ToSql for RequestStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for RequestStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(invalid_data)
    }
}
