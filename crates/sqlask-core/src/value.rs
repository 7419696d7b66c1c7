//! Store-neutral scalar values and their JSON rendering
//!
//! JSON numbers are read as IEEE-754 doubles by most consumers, so integers
//! outside +/-(2^53 - 1) are emitted as decimal strings. Parsing the string
//! back into the original width recovers the value exactly.

use serde_json::{Map, Number, Value};

/// Largest integer a double represents exactly along with all smaller ones
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    /// Signed integers up to 64 bits
    Int(i64),
    /// Unsigned integers up to 64 bits
    UInt(u64),
    /// 128-bit integers (DuckDB HUGEINT / UHUGEINT within range)
    HugeInt(i128),
    Float(f64),
    /// Text, and every store type without a JSON counterpart rendered as text
    Text(String),
}

/// One sanitized result row, keyed by column name in result order
pub type Row = Map<String, Value>;

impl Scalar {
    /// Transport-safe JSON value
    pub fn sanitize(self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => {
                if i.unsigned_abs() <= MAX_SAFE_INTEGER as u64 {
                    Value::Number(i.into())
                } else {
                    Value::String(i.to_string())
                }
            }
            Scalar::UInt(u) => {
                if u <= MAX_SAFE_INTEGER as u64 {
                    Value::Number(u.into())
                } else {
                    Value::String(u.to_string())
                }
            }
            Scalar::HugeInt(i) => {
                if i.unsigned_abs() <= MAX_SAFE_INTEGER as u128 {
                    Value::Number((i as i64).into())
                } else {
                    Value::String(i.to_string())
                }
            }
            // NaN and infinities have no JSON spelling
            Scalar::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            Scalar::Text(s) => Value::String(s),
        }
    }
}

/// Zip column names with sanitized values.
///
/// A repeated column name keeps the last value, as a JSON object would.
pub fn sanitize_row(columns: &[String], values: Vec<Scalar>) -> Row {
    columns
        .iter()
        .cloned()
        .zip(values.into_iter().map(Scalar::sanitize))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wide_integers_become_exact_strings() {
        let v = i64::MAX;
        let out = Scalar::Int(v).sanitize();
        assert_eq!(out, json!("9223372036854775807"));
        assert_eq!(out.as_str().unwrap().parse::<i64>().unwrap(), v);

        let neg = Scalar::Int(i64::MIN).sanitize();
        assert_eq!(neg.as_str().unwrap().parse::<i64>().unwrap(), i64::MIN);

        let big = u64::MAX;
        let out = Scalar::UInt(big).sanitize();
        assert_eq!(out.as_str().unwrap().parse::<u64>().unwrap(), big);

        let huge = 170141183460469231731687303715884105727i128;
        let out = Scalar::HugeInt(huge).sanitize();
        assert_eq!(out.as_str().unwrap().parse::<i128>().unwrap(), huge);
    }

    #[test]
    fn test_safe_range_keeps_numeric_type() {
        assert_eq!(Scalar::Int(MAX_SAFE_INTEGER).sanitize(), json!(9007199254740991i64));
        assert_eq!(Scalar::Int(-MAX_SAFE_INTEGER).sanitize(), json!(-9007199254740991i64));
        assert_eq!(Scalar::UInt(42).sanitize(), json!(42));
        assert_eq!(Scalar::HugeInt(-7).sanitize(), json!(-7));
        assert!(Scalar::Int(MAX_SAFE_INTEGER + 1).sanitize().is_string());
    }

    #[test]
    fn test_other_scalars_pass_through() {
        assert_eq!(Scalar::Null.sanitize(), Value::Null);
        assert_eq!(Scalar::Bool(true).sanitize(), json!(true));
        assert_eq!(Scalar::Float(2.5).sanitize(), json!(2.5));
        assert_eq!(Scalar::Text("north".into()).sanitize(), json!("north"));
        assert_eq!(Scalar::Float(f64::NAN).sanitize(), Value::Null);
    }

    #[test]
    fn test_sanitize_row_preserves_column_order() {
        let columns = vec!["z".to_string(), "a".to_string()];
        let row = sanitize_row(&columns, vec![Scalar::Int(1), Scalar::Text("x".into())]);
        let keys: Vec<&String> = row.keys().collect();
        assert_eq!(keys, ["z", "a"]);
    }
}
