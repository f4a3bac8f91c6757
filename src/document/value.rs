//! Typed attribute values and time sampling

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::core::types::{DMat4, DVec3};
use crate::core::{Error, Result};
use crate::math::matrix;

/// Value type of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Double,
    String,
    Token,
    Double3,
    Double3Array,
    DoubleArray,
    StringArray,
    Matrix4d,
}

/// A typed attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Token(String),
    Double3([f64; 3]),
    Double3Array(Vec<[f64; 3]>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
    Matrix4d([[f64; 4]; 4]),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Token(_) => ValueKind::Token,
            Value::Double3(_) => ValueKind::Double3,
            Value::Double3Array(_) => ValueKind::Double3Array,
            Value::DoubleArray(_) => ValueKind::DoubleArray,
            Value::StringArray(_) => ValueKind::StringArray,
            Value::Matrix4d(_) => ValueKind::Matrix4d,
        }
    }

    pub fn from_vec3(v: DVec3) -> Self {
        Value::Double3(v.to_array())
    }

    pub fn from_matrix(m: &DMat4) -> Self {
        Value::Matrix4d(matrix::to_nested(m))
    }

    /// Type a JSON value.
    pub fn from_json(json: &Json) -> Result<Self> {
        match json {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Double)
                    .ok_or_else(|| Error::invalid(format!("Unsupported number: {}", n))),
            },
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Array(items) => Self::from_json_array(items),
            Json::Null => Err(Error::invalid("Null is not a valid attribute value")),
            Json::Object(_) => Err(Error::invalid("Objects are not valid attribute values")),
        }
    }

    fn from_json_array(items: &[Json]) -> Result<Self> {
        if items.iter().all(Json::is_number) {
            let nums: Vec<f64> = items.iter().filter_map(Json::as_f64).collect();
            if nums.len() == 3 {
                return Ok(Value::Double3([nums[0], nums[1], nums[2]]));
            }
            return Ok(Value::DoubleArray(nums));
        }
        if items.iter().all(Json::is_string) {
            return Ok(Value::StringArray(
                items.iter().filter_map(|s| s.as_str().map(str::to_string)).collect(),
            ));
        }
        if items.iter().all(Json::is_array) {
            let rows: Vec<Vec<f64>> = items
                .iter()
                .map(|row| number_row(row))
                .collect::<Result<_>>()?;
            if rows.len() == 4 && rows.iter().all(|r| r.len() == 4) {
                let mut m = [[0.0; 4]; 4];
                for (i, row) in rows.iter().enumerate() {
                    m[i].copy_from_slice(row);
                }
                return Ok(Value::Matrix4d(m));
            }
            if rows.iter().all(|r| r.len() == 3) {
                return Ok(Value::Double3Array(
                    rows.iter().map(|r| [r[0], r[1], r[2]]).collect(),
                ));
            }
        }
        Err(Error::invalid("Unsupported array value"))
    }

    /// Plain JSON rendering, the inverse of [`Value::from_json`].
    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(b) => Json::from(*b),
            Value::Int(i) => Json::from(*i),
            Value::Double(d) => Json::from(*d),
            Value::String(s) | Value::Token(s) => Json::from(s.clone()),
            Value::Double3(v) => Json::from(v.to_vec()),
            Value::Double3Array(vs) => Json::from(vs.iter().map(|v| v.to_vec()).collect::<Vec<_>>()),
            Value::DoubleArray(vs) => Json::from(vs.clone()),
            Value::StringArray(vs) => Json::from(vs.clone()),
            Value::Matrix4d(m) => Json::from(m.iter().map(|r| r.to_vec()).collect::<Vec<_>>()),
        }
    }

    /// Convert to `kind` where the conversion is lossless.
    pub fn coerce(self, kind: ValueKind) -> std::result::Result<Value, Value> {
        if self.kind() == kind {
            return Ok(self);
        }
        match (self, kind) {
            (Value::Int(i), ValueKind::Double) => Ok(Value::Double(i as f64)),
            (Value::Double3(v), ValueKind::Double3Array) => Ok(Value::Double3Array(vec![v])),
            (Value::Double3(v), ValueKind::DoubleArray) => Ok(Value::DoubleArray(v.to_vec())),
            (Value::DoubleArray(v), ValueKind::Double3) if v.len() == 3 => {
                Ok(Value::Double3([v[0], v[1], v[2]]))
            }
            (Value::String(s), ValueKind::Token) => Ok(Value::Token(s)),
            (Value::Token(s), ValueKind::String) => Ok(Value::String(s)),
            (other, _) => Err(other),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<DVec3> {
        match self {
            Value::Double3(v) => Some(DVec3::from_array(*v)),
            Value::DoubleArray(v) if v.len() == 3 => Some(DVec3::new(v[0], v[1], v[2])),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<DMat4> {
        match self {
            Value::Matrix4d(m) => Some(matrix::from_nested(m)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Token(s) => Some(s),
            _ => None,
        }
    }
}

fn number_row(row: &Json) -> Result<Vec<f64>> {
    row.as_array()
        .ok_or_else(|| Error::invalid("Expected a numeric row"))?
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| Error::invalid("Expected a number")))
        .collect()
}

/// Parse a JSON triple `[x, y, z]`.
pub fn vec3_from_json(json: &Json) -> Result<DVec3> {
    let row = number_row(json)?;
    if row.len() < 3 {
        return Err(Error::invalid(format!("Expected 3 numbers, got {}", row.len())));
    }
    Ok(DVec3::new(row[0], row[1], row[2]))
}

/// Parse a 4x4 nested JSON matrix.
pub fn matrix_from_json(json: &Json) -> Result<DMat4> {
    match Value::from_json(json)? {
        Value::Matrix4d(m) => Ok(matrix::from_nested(&m)),
        other => Err(Error::invalid(format!(
            "Expected a 4x4 matrix, got {:?}",
            other.kind()
        ))),
    }
}

/// Time at which a value is authored or read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TimeRepr", into = "TimeRepr")]
pub enum TimeCode {
    #[default]
    Default,
    At(f64),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TimeRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<TimeRepr> for TimeCode {
    type Error = String;

    fn try_from(repr: TimeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            TimeRepr::Number(t) => Ok(TimeCode::At(t)),
            TimeRepr::Text(s) if s == "default" => Ok(TimeCode::Default),
            TimeRepr::Text(s) => s
                .parse::<f64>()
                .map(TimeCode::At)
                .map_err(|_| format!("Invalid time code '{}'", s)),
        }
    }
}

impl From<TimeCode> for TimeRepr {
    fn from(time: TimeCode) -> Self {
        match time {
            TimeCode::Default => TimeRepr::Text("default".to_string()),
            TimeCode::At(t) => TimeRepr::Number(t),
        }
    }
}

/// A single time sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSample {
    pub time: f64,
    pub value: Value,
}

/// A typed attribute opinion: an optional default plus time samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<TimeSample>,
}

impl Attribute {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            default: None,
            samples: Vec::new(),
        }
    }

    /// An attribute typed from, and holding, `value` at `time`.
    pub fn with_value(value: Value, time: TimeCode) -> Self {
        let mut attr = Self::new(value.kind());
        attr.store(value, time);
        attr
    }

    /// Set a value, coercing it to the attribute's type.
    pub fn set(&mut self, value: Value, time: TimeCode) -> Result<()> {
        let value = value.coerce(self.kind).map_err(|v| {
            Error::AttributeFailed(format!(
                "Cannot store {:?} value in {:?} attribute",
                v.kind(),
                self.kind
            ))
        })?;
        self.store(value, time);
        Ok(())
    }

    fn store(&mut self, value: Value, time: TimeCode) {
        match time {
            TimeCode::Default => self.default = Some(value),
            TimeCode::At(t) => match self.samples.iter().position(|s| s.time >= t) {
                Some(i) if self.samples[i].time == t => self.samples[i].value = value,
                Some(i) => self.samples.insert(i, TimeSample { time: t, value }),
                None => self.samples.push(TimeSample { time: t, value }),
            },
        }
    }

    /// Resolve at `time`. Sampled lookups hold the nearest earlier sample;
    /// default-time lookups fall back to the earliest sample.
    pub fn get(&self, time: TimeCode) -> Option<&Value> {
        match time {
            TimeCode::Default => self
                .default
                .as_ref()
                .or_else(|| self.samples.first().map(|s| &s.value)),
            TimeCode::At(t) => {
                if self.samples.is_empty() {
                    return self.default.as_ref();
                }
                let held = self.samples.iter().rev().find(|s| s.time <= t);
                held.or(self.samples.first()).map(|s| &s.value)
            }
        }
    }

    pub fn has_value(&self) -> bool {
        self.default.is_some() || !self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typing_from_json() {
        assert_eq!(Value::from_json(&json!(true)).unwrap(), Value::Bool(true));
        assert_eq!(Value::from_json(&json!(3)).unwrap(), Value::Int(3));
        assert_eq!(Value::from_json(&json!(0.5)).unwrap(), Value::Double(0.5));
        assert_eq!(
            Value::from_json(&json!([1, 2, 3])).unwrap(),
            Value::Double3([1.0, 2.0, 3.0])
        );
        assert_eq!(
            Value::from_json(&json!([[1, 0, 0], [0, 1, 0]])).unwrap().kind(),
            ValueKind::Double3Array
        );
        assert_eq!(
            Value::from_json(&json!(["a", "b"])).unwrap(),
            Value::StringArray(vec!["a".into(), "b".into()])
        );
        assert!(Value::from_json(&json!(null)).is_err());
        assert!(Value::from_json(&json!({"a": 1})).is_err());
    }

    #[test]
    fn test_matrix_from_json() {
        let m = matrix_from_json(&json!([
            [1, 0, 0, 0],
            [0, 1, 0, 0],
            [0, 0, 1, 0],
            [5, 6, 7, 1]
        ]))
        .unwrap();
        assert_eq!(m.w_axis.truncate(), DVec3::new(5.0, 6.0, 7.0));
    }

    #[test]
    fn test_coerce_into_existing_kind() {
        let mut attr = Attribute::new(ValueKind::Double);
        attr.set(Value::Int(2), TimeCode::Default).unwrap();
        assert_eq!(attr.get(TimeCode::Default), Some(&Value::Double(2.0)));
        assert!(attr.set(Value::String("x".into()), TimeCode::Default).is_err());
    }

    #[test]
    fn test_held_sampling() {
        let mut attr = Attribute::new(ValueKind::Double);
        attr.set(Value::Double(1.0), TimeCode::At(10.0)).unwrap();
        attr.set(Value::Double(2.0), TimeCode::At(20.0)).unwrap();
        attr.set(Value::Double(3.0), TimeCode::At(10.0)).unwrap();

        assert_eq!(attr.samples.len(), 2);
        assert_eq!(attr.get(TimeCode::At(5.0)), Some(&Value::Double(3.0)));
        assert_eq!(attr.get(TimeCode::At(15.0)), Some(&Value::Double(3.0)));
        assert_eq!(attr.get(TimeCode::At(25.0)), Some(&Value::Double(2.0)));
        assert_eq!(attr.get(TimeCode::Default), Some(&Value::Double(3.0)));
    }

    #[test]
    fn test_time_code_serde() {
        let t: TimeCode = serde_json::from_value(json!("default")).unwrap();
        assert_eq!(t, TimeCode::Default);
        let t: TimeCode = serde_json::from_value(json!(24)).unwrap();
        assert_eq!(t, TimeCode::At(24.0));
        let t: TimeCode = serde_json::from_value(json!("12.5")).unwrap();
        assert_eq!(t, TimeCode::At(12.5));
        assert!(serde_json::from_value::<TimeCode>(json!("soon")).is_err());
        assert_eq!(serde_json::to_value(TimeCode::Default).unwrap(), json!("default"));
    }
}
