//! JSON as written by producers that emit `Infinity` / `NaN` bare tokens.
//!
//! Non-finite floats are represented as the strings `"inf"`, `"-inf"` and `"nan"`
//! both when reading and when writing.

use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

pub fn from_str(text: &str) -> serde_json::Result<Value> {
    serde_json::from_str(&quote_non_finite(text))
}

fn quote_non_finite(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else {
            let token = [("-Infinity", "\"-inf\""), ("Infinity", "\"inf\""), ("NaN", "\"nan\"")]
                .into_iter()
                .find(|(tok, _)| rest.starts_with(tok));
            if let Some((tok, repl)) = token {
                out.push_str(repl);
                rest = &rest[tok.len()..];
                continue;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

pub fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn to_value(x: f64) -> Value {
    if x.is_finite() {
        serde_json::Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
    } else if x.is_nan() {
        Value::String("nan".into())
    } else if x > 0.0 {
        Value::String("inf".into())
    } else {
        Value::String("-inf".into())
    }
}

/// `#[serde(with = "relaxed_json::opt_f64")]`
pub mod opt_f64 {
    use super::*;

    pub fn serialize<S: Serializer>(v: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(x) => s.serialize_some(&to_value(*x)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let v = Value::deserialize(d)?;
        match v {
            Value::Null => Ok(None),
            other => as_f64(&other).map(Some).ok_or_else(|| serde::de::Error::custom(format!("not a number: {other}"))),
        }
    }
}

/// `#[serde(with = "relaxed_json::vec_f64")]`
pub mod vec_f64 {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(v: &[f64], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for x in v {
            seq.serialize_element(&to_value(*x))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<f64>, D::Error> {
        let items = Vec::<Value>::deserialize(d)?;
        items
            .iter()
            .map(|v| as_f64(v).ok_or_else(|| serde::de::Error::custom(format!("not a number: {v}"))))
            .collect()
    }
}
