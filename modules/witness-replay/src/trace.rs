use crate::ReplayError;
use absdisc_core::json_tree::strip_doc_entries;
use absdisc_core::{relaxed_json, AbstractBlock, Expansion};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Opaque handle on the measurement series recorded for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesRef {
    Id(i64),
    Name(String),
}

impl fmt::Display for SeriesRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesRef::Id(id) => write!(f, "{id}"),
            SeriesRef::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WitnessRecord {
    #[serde(default)]
    pub expansion: Option<Expansion>,
    #[serde(default)]
    pub taken: bool,
    #[serde(default)]
    pub terminate: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub measurements: Option<SeriesRef>,
}

#[derive(Debug, Clone)]
pub struct WitnessTrace {
    pub config: Value,
    pub start: AbstractBlock,
    pub trace: Vec<WitnessRecord>,
}

impl WitnessTrace {
    /// Accepts `{config, start, trace: [..]}` and `{config, trace: {start, trace: [..]}}`.
    pub fn from_json(mut doc: Value) -> Result<Self, ReplayError> {
        strip_doc_entries(&mut doc);
        let config = doc.get("config").cloned().unwrap_or(Value::Null);
        let body = match doc.get("trace") {
            Some(inner @ Value::Object(_)) => inner,
            Some(Value::Array(_)) => &doc,
            Some(_) => return Err(ReplayError::Format("'trace' is neither a list nor an object".into())),
            None => return Err(ReplayError::Format("no 'trace' entry".into())),
        };
        let start = body.get("start").ok_or_else(|| ReplayError::Format("no start block".into()))?;
        let start = AbstractBlock::from_json(start)?;
        let records = body.get("trace").cloned().unwrap_or(Value::Array(Vec::new()));
        let trace: Vec<WitnessRecord> = serde_json::from_value(records).map_err(|e| ReplayError::Format(e.to_string()))?;
        Ok(WitnessTrace { config, start, trace })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let doc = relaxed_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Self::from_json(doc).with_context(|| format!("loading witness {}", path.display()))
    }

    pub fn taken_steps(&self) -> usize {
        self.trace.iter().filter(|r| r.taken && !r.terminate).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn series_refs_are_ids_or_names() {
        let recs: Vec<WitnessRecord> = serde_json::from_value(json!([
            {"expansion": null, "terminate": true, "comment": "budget", "measurements": 7},
            {"expansion": {"feature": {"insn": 0, "name": "mnemonic", "value": "add"}}, "taken": true, "measurements": "run-3"}
        ]))
        .unwrap();
        assert_eq!(recs[0].measurements, Some(SeriesRef::Id(7)));
        assert!(recs[0].expansion.is_none() && !recs[0].taken);
        assert_eq!(recs[1].measurements, Some(SeriesRef::Name("run-3".into())));
        assert_eq!(recs[1].measurements.as_ref().unwrap().to_string(), "run-3");
    }

    #[test]
    fn missing_trace_is_a_format_error() {
        let err = WitnessTrace::from_json(json!({"config": {}, "start": {"abs_insns": []}})).unwrap_err();
        assert!(matches!(err, ReplayError::Format(_)));
        let err = WitnessTrace::from_json(json!({"trace": []})).unwrap_err();
        assert!(matches!(err, ReplayError::Format(_)));
    }
}
