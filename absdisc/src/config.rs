use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "absdisc.yaml";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct MetricsConfig {
    /// External producer of `metrics.json`: program followed by its arguments.
    pub command: Option<Vec<String>>,
    /// Series file for computing the metrics in process; wins over `command`.
    pub native_series: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct CoverageConfig {
    pub heuristic: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub db: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub isa: Option<String>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub coverage: CoverageConfig,
}

/// An explicit path must load; otherwise `./absdisc.yaml` is used when present.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() { p.to_path_buf() } else { return Ok(Config::default()); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    serde_yaml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))
}
