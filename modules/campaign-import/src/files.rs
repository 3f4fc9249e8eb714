//! Artifact files of a campaign directory.

use crate::ImportError;
use absdisc_core::relaxed_json;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

pub const CAMPAIGN_CONFIG_FILE: &str = "campaign_config.json";
pub const REPORT_FILE: &str = "report.json";
pub const DISCOVERY_DIR: &str = "discoveries";
pub const WITNESS_DIR: &str = "witnesses";

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignConfig {
    pub predictors: Vec<String>,
    pub abstraction_config: Value,
    #[serde(default)]
    pub termination: Value,
    #[serde(default)]
    pub restrict_to_supported_insns: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Report {
    pub start_date: String,
    #[serde(deserialize_with = "whole_seconds")]
    pub seconds_passed: i64,
    #[serde(default)]
    pub host_pc: String,
    #[serde(default)]
    pub per_batch_stats: Vec<BatchStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchStats {
    pub num_sampled: i64,
    pub num_interesting: i64,
    #[serde(deserialize_with = "whole_seconds")]
    pub batch_time: i64,
    #[serde(default)]
    pub per_interesting_sample_stats: Vec<SampleStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleStats {
    #[serde(default)]
    pub per_generalization_stats: Vec<GeneralizationStats>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralizationStats {
    #[serde(deserialize_with = "identifier")]
    pub id: String,
    pub witness_len: i64,
}

/// `infos.json` of a standalone generalization directory.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneralizationInfos {
    #[serde(default, deserialize_with = "opt_identifier")]
    pub identifier: Option<String>,
    pub witness_len: i64,
    #[serde(default)]
    pub predictors: Vec<String>,
}

// producers write durations both as integers and as floats
fn whole_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    let v = Value::deserialize(d)?;
    relaxed_json::as_f64(&v)
        .filter(|x| x.is_finite())
        .map(|x| x.round() as i64)
        .ok_or_else(|| serde::de::Error::custom(format!("not a duration: {v}")))
}

fn id_text(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn identifier<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Value::deserialize(d)?;
    id_text(v.clone()).ok_or_else(|| serde::de::Error::custom(format!("not an identifier: {v}")))
}

fn opt_identifier<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Value::deserialize(d)? {
        Value::Null => Ok(None),
        v => id_text(v.clone()).map(Some).ok_or_else(|| serde::de::Error::custom(format!("not an identifier: {v}"))),
    }
}

/// Reads a JSON file, accepting bare `Infinity` / `NaN` tokens.
pub fn load_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    relaxed_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn load_json_as<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let v = load_json(path)?;
    serde_json::from_value(v).with_context(|| format!("unexpected content in {}", path.display()))
}

/// Absolute, symlink-free form of `path`. When `path` itself does not exist its
/// parent is resolved and the final component appended.
pub fn canonical_path(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path.canonicalize().with_context(|| format!("resolving {}", path.display()));
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = parent.canonicalize().with_context(|| format!("resolving {}", parent.display()))?;
    Ok(match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    })
}

/// Normalises an ISO 8601 start date. Dates with an offset are rendered as
/// RFC 3339, naive ones as `YYYY-MM-DDTHH:MM:SS[.fff]`.
pub fn parse_start_date(text: &str) -> Result<String> {
    let text = text.trim();
    if let Ok(dt) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(dt.format(&Rfc3339)?);
    }
    let naive_out = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let naive_out_sub = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    let with_sub = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    ];
    for fd in with_sub {
        if let Ok(dt) = PrimitiveDateTime::parse(text, fd) {
            return Ok(dt.format(naive_out_sub)?);
        }
    }
    let plain = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    for fd in plain {
        if let Ok(dt) = PrimitiveDateTime::parse(text, fd) {
            return Ok(dt.format(naive_out)?);
        }
    }
    if let Ok(d) = Date::parse(text, format_description!("[year]-[month]-[day]")) {
        return Ok(d.midnight().format(naive_out)?);
    }
    Err(ImportError::InvalidDate(text.to_string()).into())
}
