//! `metrics.json`: per-discovery mean interestingness, subsumption and the
//! raw interestingness series, produced before a campaign is imported.

use crate::discovery::own_config;
use crate::files::{load_json, load_json_as, CampaignConfig, CAMPAIGN_CONFIG_FILE, DISCOVERY_DIR};
use crate::ImportError;
use absdisc_core::json_tree::strip_doc_entries;
use absdisc_core::relaxed_json;
use absdisc_core::{AbstractBlock, AbstractionDomain, ToolResults};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const METRICS_FILE: &str = "metrics.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMetrics {
    #[serde(default, with = "relaxed_json::opt_f64")]
    pub mean_interestingness: Option<f64>,
    #[serde(default)]
    pub subsumed_by: Option<String>,
    #[serde(default, with = "relaxed_json::vec_f64")]
    pub interestingness_series: Vec<f64>,
}

pub type MetricsMap = BTreeMap<String, DiscoveryMetrics>;

pub fn metrics_path(campaign_dir: &Path) -> PathBuf {
    campaign_dir.join(METRICS_FILE)
}

/// `None` when the campaign directory has no metrics file.
pub fn load_metrics(campaign_dir: &Path) -> Result<Option<MetricsMap>> {
    let path = metrics_path(campaign_dir);
    if !path.exists() {
        return Ok(None);
    }
    load_json_as(&path).map(Some)
}

pub fn store_metrics(campaign_dir: &Path, metrics: &MetricsMap) -> Result<()> {
    let path = metrics_path(campaign_dir);
    let text = serde_json::to_string_pretty(metrics)?;
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
}

/// Produces `metrics.json` for a campaign directory that lacks one.
pub trait MetricsStep {
    fn ensure(&self, campaign_dir: &Path) -> Result<()>;
}

/// Imports without metrics; discoveries get no interestingness or subsumption.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetrics;

impl MetricsStep for NoMetrics {
    fn ensure(&self, campaign_dir: &Path) -> Result<()> {
        tracing::debug!(dir = %campaign_dir.display(), "no metrics producer configured");
        Ok(())
    }
}

/// Runs an external program with the campaign directory appended to `args`.
#[derive(Debug, Clone)]
pub struct ExternalMetricsCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl MetricsStep for ExternalMetricsCommand {
    fn ensure(&self, campaign_dir: &Path) -> Result<()> {
        tracing::info!(program = %self.program, dir = %campaign_dir.display(), "running metrics command");
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(campaign_dir)
            .status()
            .with_context(|| format!("spawning {}", self.program))?;
        if !status.success() {
            return Err(ImportError::MetricsCommand { program: self.program.clone(), status: status.to_string() }.into());
        }
        Ok(())
    }
}

/// Raw measurement series of a discovery, one tool-result map per series entry.
pub trait SeriesSource {
    fn series(&self, result_ref: &Value) -> Result<Vec<ToolResults>>;
}

/// Series stored in one JSON file: `{ "<result_ref>": [ {"tool": value, ...}, ... ] }`.
#[derive(Debug, Clone, Default)]
pub struct JsonSeriesFile {
    series: BTreeMap<String, Vec<ToolResults>>,
}

fn ref_key(result_ref: &Value) -> String {
    match result_ref {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl JsonSeriesFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw: BTreeMap<String, Vec<BTreeMap<String, Value>>> = load_json_as(path)?;
        let series = raw
            .into_iter()
            .map(|(k, entries)| {
                let entries = entries
                    .into_iter()
                    .map(|e| e.into_iter().map(|(tool, v)| (tool, relaxed_json::as_f64(&v))).collect())
                    .collect();
                (k, entries)
            })
            .collect();
        Ok(JsonSeriesFile { series })
    }

    pub fn from_map(series: BTreeMap<String, Vec<ToolResults>>) -> Self {
        JsonSeriesFile { series }
    }
}

impl SeriesSource for JsonSeriesFile {
    fn series(&self, result_ref: &Value) -> Result<Vec<ToolResults>> {
        let key = ref_key(result_ref);
        match self.series.get(&key) {
            Some(s) => Ok(s.clone()),
            None => {
                tracing::warn!(result_ref = %key, "no measurement series recorded");
                Ok(Vec::new())
            }
        }
    }
}

/// Computes the metrics in process from a [`SeriesSource`].
pub struct NativeMetrics<'a, S> {
    pub domain: &'a dyn AbstractionDomain,
    pub source: S,
}

impl<S: SeriesSource> MetricsStep for NativeMetrics<'_, S> {
    fn ensure(&self, campaign_dir: &Path) -> Result<()> {
        let metrics = compute_campaign_metrics(self.domain, &self.source, campaign_dir)?;
        store_metrics(campaign_dir, &metrics)?;
        tracing::info!(dir = %campaign_dir.display(), discoveries = metrics.len(), "wrote metrics");
        Ok(())
    }
}

/// Geometric mean of the series, or `+inf` when it is empty or holds a
/// non-finite or non-positive value.
pub fn mean_interestingness(series: &[f64]) -> f64 {
    if series.is_empty() || series.iter().any(|x| !x.is_finite() || *x <= 0.0) {
        return f64::INFINITY;
    }
    let log_sum: f64 = series.iter().map(|x| x.ln()).sum();
    (log_sum / series.len() as f64).exp()
}

/// Discovery files of a campaign sorted by identifier.
fn discovery_files(campaign_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let dir = campaign_dir.join(DISCOVERY_DIR);
    let mut out = Vec::new();
    for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.push((stem.to_string(), path.clone()));
        }
    }
    out.sort();
    Ok(out)
}

fn campaign_abstraction_config(campaign_dir: &Path) -> Result<Value> {
    let path = campaign_dir.join(CAMPAIGN_CONFIG_FILE);
    if !path.exists() {
        return Ok(Value::Null);
    }
    Ok(load_json_as::<CampaignConfig>(&path)?.abstraction_config)
}

/// Interestingness series and mean of every discovery; each discovery also
/// marks the earlier, still unsubsumed discoveries it subsumes.
pub fn compute_campaign_metrics(domain: &dyn AbstractionDomain, source: &dyn SeriesSource, campaign_dir: &Path) -> Result<MetricsMap> {
    let mut docs = Vec::new();
    for (id, path) in discovery_files(campaign_dir)? {
        let mut doc = load_json(&path)?;
        strip_doc_entries(&mut doc);
        docs.push((id, doc));
    }
    // the first discovery's config instantiates the context for the whole campaign
    let config = match docs.first().and_then(|(_, doc)| own_config(doc)) {
        Some(c) => c.clone(),
        None => campaign_abstraction_config(campaign_dir)?,
    };
    let ctx = domain.context(&config)?;

    let mut metrics = MetricsMap::new();
    let mut unsubsumed: Vec<(String, AbstractBlock)> = Vec::new();
    for (id, doc) in docs {
        let ab = AbstractBlock::from_json(doc.get("ab").ok_or_else(|| ImportError::MissingAbstractBlock(id.clone()))?)?;

        let series: Vec<f64> = source
            .series(doc.get("result_ref").unwrap_or(&Value::Null))?
            .iter()
            .map(|results| ctx.compute_interestingness(results))
            .collect();
        let mean = mean_interestingness(&series);

        let mut still = Vec::with_capacity(unsubsumed.len() + 1);
        for (prev_id, prev_ab) in unsubsumed {
            if ctx.subsumes(&ab, &prev_ab) {
                if let Some(m) = metrics.get_mut(&prev_id) {
                    m.subsumed_by = Some(id.clone());
                }
                tracing::debug!(subsumed = %prev_id, by = %id, "discovery subsumed");
                continue;
            }
            still.push((prev_id, prev_ab));
        }
        still.push((id.clone(), ab));
        unsubsumed = still;

        metrics.insert(id, DiscoveryMetrics { mean_interestingness: Some(mean), subsumed_by: None, interestingness_series: series });
    }
    Ok(metrics)
}

/// Writes `metrics.json` unless one exists and `overwrite` is unset; returns whether it wrote.
pub fn add_metrics(step: &dyn MetricsStep, campaign_dir: &Path, overwrite: bool) -> Result<bool> {
    if metrics_path(campaign_dir).exists() && !overwrite {
        tracing::info!(dir = %campaign_dir.display(), "metrics.json exists, not overwriting");
        return Ok(false);
    }
    step.ensure(campaign_dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometric_mean_or_infinity() {
        assert!((mean_interestingness(&[1.0, 4.0]) - 2.0).abs() < 1e-12);
        assert_eq!(mean_interestingness(&[]), f64::INFINITY);
        assert_eq!(mean_interestingness(&[1.0, 0.0]), f64::INFINITY);
        assert_eq!(mean_interestingness(&[1.0, f64::INFINITY]), f64::INFINITY);
    }

    #[test]
    fn metrics_file_accepts_non_finite_tokens() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(METRICS_FILE),
            r#"{"a": {"mean_interestingness": Infinity, "subsumed_by": null, "interestingness_series": [0.5, Infinity]},
                "b": {"mean_interestingness": 0.25, "subsumed_by": "a", "interestingness_series": []}}"#,
        )
        .unwrap();
        let m = load_metrics(dir.path()).unwrap().unwrap();
        assert_eq!(m["a"].mean_interestingness, Some(f64::INFINITY));
        assert_eq!(m["a"].interestingness_series, vec![0.5, f64::INFINITY]);
        assert_eq!(m["b"].subsumed_by.as_deref(), Some("a"));

        store_metrics(dir.path(), &m).unwrap();
        assert_eq!(load_metrics(dir.path()).unwrap().unwrap(), m);
    }

    #[test]
    fn missing_metrics_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_metrics(dir.path()).unwrap().is_none());
    }
}
