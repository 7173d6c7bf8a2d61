//! Decode MySQL rows into JSON objects, dispatching on the column's reported type.

use serde_json::{Map, Number, Value};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo};

pub fn row_to_json(row: &MySqlRow) -> Value {
    let mut map = Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        let v = cell_to_value(row, idx, col.type_info().name());
        map.insert(col.name().to_string(), v);
    }
    Value::Object(map)
}

fn float(n: Option<f64>) -> Value {
    n.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null)
}

fn cell_to_value(row: &MySqlRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "BOOLEAN" => {
            if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
                return v.map(Value::Bool).unwrap_or(Value::Null);
            }
        }
        t if t.ends_with("UNSIGNED") => {
            if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
                return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
            }
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
                return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
            }
        }
        "FLOAT" => {
            if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
                return float(v.map(f64::from));
            }
        }
        "DOUBLE" => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
                return float(v);
            }
        }
        "DATETIME" => {
            if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
                return v
                    .map(|d| Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                    .unwrap_or(Value::Null);
            }
        }
        "TIMESTAMP" => {
            if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
                return v.map(|d| Value::String(d.to_rfc3339())).unwrap_or(Value::Null);
            }
        }
        "DATE" => {
            if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
                return v
                    .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null);
            }
        }
        "JSON" => {
            if let Ok(v) = row.try_get::<Option<Value>, _>(idx) {
                return v.unwrap_or(Value::Null);
            }
        }
        _ => {}
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(Some(bytes)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return Value::String(String::from_utf8_lossy(&bytes).into_owned());
    }
    Value::Null
}
