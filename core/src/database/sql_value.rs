use bytes::BytesMut;
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSqlOutput, Value as SqliteOwnedValue, ValueRef as SqliteValueRef};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type as PgType};
use uuid::Uuid;

/// A single bound parameter value for a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Json(Value),
    Uuid(Uuid),
}

impl SqlValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "Null",
            SqlValue::Bool(_) => "Bool",
            SqlValue::I16(_) => "I16",
            SqlValue::I32(_) => "I32",
            SqlValue::I64(_) => "I64",
            SqlValue::F64(_) => "F64",
            SqlValue::Numeric(_) => "Numeric",
            SqlValue::Text(_) => "Text",
            SqlValue::Bytes(_) => "Bytes",
            SqlValue::DateTime(_) => "DateTime",
            SqlValue::Json(_) => "Json",
            SqlValue::Uuid(_) => "Uuid",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(value) => value.to_sql_checked(ty, out),
            SqlValue::I16(value) => value.to_sql_checked(ty, out),
            SqlValue::I32(value) => value.to_sql_checked(ty, out),
            SqlValue::I64(value) => value.to_sql_checked(ty, out),
            SqlValue::F64(value) => value.to_sql_checked(ty, out),
            SqlValue::Numeric(value) => value.to_sql_checked(ty, out),
            SqlValue::Text(value) => value.to_sql_checked(ty, out),
            SqlValue::Bytes(value) => value.to_sql_checked(ty, out),
            SqlValue::DateTime(value) => value.to_sql_checked(ty, out),
            SqlValue::Json(value) => value.to_sql_checked(ty, out),
            SqlValue::Uuid(value) => value.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &PgType) -> bool {
        // each variant checks the column type itself in to_sql
        true
    }

    to_sql_checked!();
}

// SQLite has no native decimal, timestamp, json or uuid storage so those go in as TEXT.
impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteOwnedValue::Null),
            SqlValue::Bool(value) => ToSqlOutput::Owned(SqliteOwnedValue::Integer(*value as i64)),
            SqlValue::I16(value) => ToSqlOutput::Owned(SqliteOwnedValue::Integer(*value as i64)),
            SqlValue::I32(value) => ToSqlOutput::Owned(SqliteOwnedValue::Integer(*value as i64)),
            SqlValue::I64(value) => ToSqlOutput::Owned(SqliteOwnedValue::Integer(*value)),
            SqlValue::F64(value) => ToSqlOutput::Owned(SqliteOwnedValue::Real(*value)),
            SqlValue::Numeric(value) => ToSqlOutput::Owned(SqliteOwnedValue::Text(value.to_string())),
            SqlValue::Text(value) => ToSqlOutput::Borrowed(SqliteValueRef::Text(value.as_bytes())),
            SqlValue::Bytes(value) => ToSqlOutput::Borrowed(SqliteValueRef::Blob(value)),
            SqlValue::DateTime(value) => {
                ToSqlOutput::Owned(SqliteOwnedValue::Text(value.to_rfc3339()))
            }
            SqlValue::Json(value) => ToSqlOutput::Owned(SqliteOwnedValue::Text(value.to_string())),
            SqlValue::Uuid(value) => ToSqlOutput::Owned(SqliteOwnedValue::Text(value.to_string())),
        };

        Ok(output)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::I16(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::I32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::I64(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::I64(value as i64)
    }
}

// u64 does not fit BIGINT so it is carried as NUMERIC
impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        SqlValue::Numeric(Decimal::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::F64(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        SqlValue::Numeric(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Bytes(value)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        SqlValue::Bytes(value.to_vec())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::DateTime(value)
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        SqlValue::Json(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Builds a row of [`SqlValue`]s from any values convertible into one.
///
/// ```
/// use sqlbulk::{row, SqlValue};
///
/// let row = row![1_i64, "alice", None::<i32>];
/// assert_eq!(row, vec![SqlValue::I64(1), SqlValue::Text("alice".to_string()), SqlValue::Null]);
/// ```
#[macro_export]
macro_rules! row {
    () => {
        ::std::vec::Vec::<$crate::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::SqlValue::from($value)),+]
    };
}
