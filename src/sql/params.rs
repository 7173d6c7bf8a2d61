//! Convert serde_json::Value to values that sqlx can bind against MySQL.

use crate::error::AppError;
use crate::model::{FieldDescriptor, SemanticType};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::mysql::{MySql, MySqlTypeInfo};
use sqlx::{Database, Type};

/// A value that can be bound to a MySQL query.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    DateTime(NaiveDateTime),
    /// Arrays and objects, sent as JSON text.
    Json(Value),
}

impl BindValue {
    /// Untyped conversion, used where no column type is known.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => BindValue::Null,
            Value::Bool(b) => BindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    BindValue::I64(i)
                } else if let Some(u) = n.as_u64() {
                    BindValue::U64(u)
                } else {
                    BindValue::F64(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => BindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => BindValue::Json(v.clone()),
        }
    }

    /// Coerce a JSON value (often a query-string string) to the column's semantic type.
    pub fn for_column(field: &FieldDescriptor, v: &Value) -> Result<Self, AppError> {
        if v.is_null() {
            return Ok(BindValue::Null);
        }
        let invalid = || AppError::BadRequest(format!("invalid value for {}: {}", field.column, v));
        let ty = field.semantic_type.unwrapped();
        if ty.is_integer() {
            return match v {
                Value::Number(n) => n
                    .as_i64()
                    .map(BindValue::I64)
                    .or_else(|| n.as_u64().map(BindValue::U64))
                    .ok_or_else(invalid),
                Value::String(s) => s.trim().parse().map(BindValue::I64).map_err(|_| invalid()),
                Value::Bool(b) => Ok(BindValue::I64(i64::from(*b))),
                _ => Err(invalid()),
            };
        }
        if ty.is_float() {
            return match v {
                Value::Number(n) => n.as_f64().map(BindValue::F64).ok_or_else(invalid),
                Value::String(s) => s.trim().parse().map(BindValue::F64).map_err(|_| invalid()),
                _ => Err(invalid()),
            };
        }
        match ty {
            SemanticType::Bool => match v {
                Value::Bool(b) => Ok(BindValue::Bool(*b)),
                Value::Number(n) => Ok(BindValue::Bool(n.as_i64().unwrap_or(0) != 0)),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(BindValue::Bool(true)),
                    "false" | "0" => Ok(BindValue::Bool(false)),
                    _ => Err(invalid()),
                },
                _ => Err(invalid()),
            },
            SemanticType::Timestamp => match v {
                Value::String(s) => parse_timestamp(s).map(BindValue::DateTime).ok_or_else(invalid),
                _ => Err(invalid()),
            },
            SemanticType::String => match v {
                Value::String(s) => Ok(BindValue::String(s.clone())),
                Value::Number(n) => Ok(BindValue::String(n.to_string())),
                Value::Bool(b) => Ok(BindValue::String(b.to_string())),
                _ => Err(invalid()),
            },
            _ => Ok(BindValue::from_json(v)),
        }
    }
}

/// RFC 3339 (converted to UTC), `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare date.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl<'q> Encode<'q, MySql> for BindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <MySql as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            BindValue::Null => IsNull::Yes,
            BindValue::Bool(b) => <bool as Encode<MySql>>::encode_by_ref(b, buf)?,
            BindValue::I64(n) => <i64 as Encode<MySql>>::encode_by_ref(n, buf)?,
            BindValue::U64(n) => <u64 as Encode<MySql>>::encode_by_ref(n, buf)?,
            BindValue::F64(n) => <f64 as Encode<MySql>>::encode_by_ref(n, buf)?,
            BindValue::String(s) => <String as Encode<MySql>>::encode_by_ref(s, buf)?,
            BindValue::DateTime(dt) => <NaiveDateTime as Encode<MySql>>::encode_by_ref(dt, buf)?,
            BindValue::Json(v) => {
                let text = v.to_string();
                <String as Encode<MySql>>::encode_by_ref(&text, buf)?
            }
        })
    }

    fn produces(&self) -> Option<MySqlTypeInfo> {
        Some(match self {
            BindValue::Null | BindValue::String(_) | BindValue::Json(_) => <str as Type<MySql>>::type_info(),
            BindValue::Bool(_) => <bool as Type<MySql>>::type_info(),
            BindValue::I64(_) => <i64 as Type<MySql>>::type_info(),
            BindValue::U64(_) => <u64 as Type<MySql>>::type_info(),
            BindValue::F64(_) => <f64 as Type<MySql>>::type_info(),
            BindValue::DateTime(_) => <NaiveDateTime as Type<MySql>>::type_info(),
        })
    }
}

impl Type<MySql> for BindValue {
    fn type_info() -> MySqlTypeInfo {
        <str as Type<MySql>>::type_info()
    }

    fn compatible(_ty: &MySqlTypeInfo) -> bool {
        true
    }
}
