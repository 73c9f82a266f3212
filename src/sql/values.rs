//! JSON-safe conversion of result values.
//!
//! Everything returned to a caller (or fed back to the model) must survive a
//! JSON round trip through a client that stores numbers as IEEE doubles:
//!
//! - 64-bit integers within ±(2^53 − 1) stay numbers, larger ones become strings
//! - `bytea` becomes a plain array of byte values
//! - date/time values become ISO-8601 text
//!
//! [`json_safe`] is idempotent: applying it to its own output changes nothing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Largest integer a double represents exactly (`Number.MAX_SAFE_INTEGER`).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Narrow a 64-bit integer to a JSON number when safe, else a string.
pub fn int_to_json(v: i64) -> Value {
    if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&v) {
        Value::Number(Number::from(v))
    } else {
        Value::String(v.to_string())
    }
}

/// Binary payloads become plain arrays of byte numbers.
pub fn bytes_to_json(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::Number(Number::from(*b))).collect())
}

/// Recursively stringify integers outside the safe range.
pub fn json_safe(value: Value) -> Value {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                int_to_json(i)
            } else if let Some(u) = n.as_u64() {
                if u <= MAX_SAFE_INTEGER as u64 {
                    Value::Number(n)
                } else {
                    Value::String(u.to_string())
                }
            } else {
                Value::Number(n)
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(json_safe).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, json_safe(v))).collect()),
        other => other,
    }
}

/// Convert one result row into a JSON object keyed by column name.
///
/// Duplicate column names (e.g. `SELECT 1 AS a, 2 AS a`) keep the last value,
/// matching what JSON-object clients see.
pub fn row_to_json(row: &PgRow) -> Map<String, Value> {
    let mut obj = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        obj.insert(column.name().to_string(), cell_to_json(row, idx));
    }
    obj
}

pub(crate) fn cell_to_json(row: &PgRow, idx: usize) -> Value {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) => raw,
        Err(_) => return Value::Null,
    };
    if raw.is_null() {
        return Value::Null;
    }
    let type_name = raw.type_info().name().to_string();

    let typed = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(idx).ok().map(Value::Bool),
        "INT2" => row.try_get::<i16, _>(idx).ok().map(|v| int_to_json(v as i64)),
        "INT4" => row.try_get::<i32, _>(idx).ok().map(|v| int_to_json(v as i64)),
        "INT8" => row.try_get::<i64, _>(idx).ok().map(int_to_json),
        "FLOAT4" => row
            .try_get::<f32, _>(idx)
            .ok()
            .map(|v| float_to_json(v as f64)),
        "FLOAT8" => row.try_get::<f64, _>(idx).ok().map(float_to_json),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx).ok().map(json_safe),
        "BYTEA" => row.try_get::<Vec<u8>, _>(idx).ok().map(|b| bytes_to_json(&b)),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .map(|v| Value::String(v.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .ok()
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .ok()
            .map(|v| Value::String(v.format("%Y-%m-%d").to_string())),
        "TIME" => row
            .try_get::<NaiveTime, _>(idx)
            .ok()
            .map(|v| Value::String(v.format("%H:%M:%S%.f").to_string())),
        "UUID" => row
            .try_get::<uuid::Uuid, _>(idx)
            .ok()
            .map(|v| Value::String(v.to_string())),
        _ => None,
    };

    typed.unwrap_or_else(|| text_fallback(row, idx, &type_name))
}

/// Simple-protocol results arrive as text, so anything without a dedicated
/// decoder (NUMERIC, INET, arrays, enums, ...) is returned verbatim.
fn text_fallback(row: &PgRow, idx: usize, type_name: &str) -> Value {
    match row.try_get_unchecked::<String, _>(idx) {
        Ok(s) => Value::String(s),
        Err(_) => Value::String(format!("<{}>", type_name.to_ascii_lowercase())),
    }
}

fn float_to_json(v: f64) -> Value {
    Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn safe_integers_stay_numbers() {
        assert_eq!(int_to_json(42), json!(42));
        assert_eq!(int_to_json(MAX_SAFE_INTEGER), json!(9_007_199_254_740_991i64));
        assert_eq!(int_to_json(-MAX_SAFE_INTEGER), json!(-9_007_199_254_740_991i64));
    }

    #[test]
    fn unsafe_integers_become_strings() {
        assert_eq!(int_to_json(MAX_SAFE_INTEGER + 1), json!("9007199254740992"));
        assert_eq!(int_to_json(i64::MIN), json!("-9223372036854775808"));
    }

    #[test]
    fn bytes_become_plain_arrays() {
        assert_eq!(bytes_to_json(&[0xde, 0xad, 0x00]), json!([222, 173, 0]));
        assert_eq!(bytes_to_json(&[]), json!([]));
    }

    #[test]
    fn json_safe_walks_nested_values() {
        let input = json!({
            "id": 1,
            "big": u64::MAX,
            "rows": [{"n": 9_007_199_254_740_993i64, "f": 1.5, "s": "x"}],
            "ok": true,
            "none": null
        });
        let out = json_safe(input);
        assert_eq!(out["id"], json!(1));
        assert_eq!(out["big"], json!("18446744073709551615"));
        assert_eq!(out["rows"][0]["n"], json!("9007199254740993"));
        assert_eq!(out["rows"][0]["f"], json!(1.5));
        assert_eq!(out["ok"], json!(true));
        assert_eq!(out["none"], json!(null));
    }

    #[test]
    fn json_safe_is_idempotent() {
        let input = json!({"a": [i64::MAX, 3, "7"], "b": {"c": -12_345_678_901_234_567i64}});
        let once = json_safe(input);
        let twice = json_safe(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn non_finite_floats_are_stringified() {
        assert_eq!(float_to_json(f64::NAN), json!("NaN"));
        assert_eq!(float_to_json(2.25), json!(2.25));
    }
}
