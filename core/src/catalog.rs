//! Table-driven reference abstraction domain.
//!
//! A catalog lists instruction schemes with their feature values and the
//! concrete encodings (`hex` / `asm` forms) known for each scheme. Feasible
//! schemes, decoding, parsing and coverage checks are all answered from it.

use crate::oracle::{AbstractionContext, AbstractionDomain, BasicBlock, Instruction, Isa, TableMetrics, ToolResults, TOP_DISCOVERIES};
use crate::relaxed_json;
use crate::{AbstractBlock, AliasConstraint, AliasState, DomainError, Features};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub const DEFAULT_MIN_INTERESTINGNESS: f64 = 0.1;

fn default_isa() -> String {
    "x86".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
    #[serde(default = "default_isa")]
    pub isa: String,
    pub schemes: Vec<SchemeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemeEntry {
    pub scheme: String,
    #[serde(default)]
    pub features: BTreeMap<String, String>,
    #[serde(default)]
    pub forms: Vec<Form>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Form {
    pub hex: String,
    pub asm: String,
}

/// Lowercased mnemonic plus operands split on commas.
pub fn split_asm(asm: &str) -> (String, Vec<String>) {
    let text = asm.trim().to_lowercase();
    let (mnemonic, rest) = match text.split_once(char::is_whitespace) {
        Some((m, r)) => (m.to_string(), r),
        None => (text.clone(), ""),
    };
    let operands = rest
        .split(',')
        .map(|op| op.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|op| !op.is_empty())
        .collect();
    (mnemonic, operands)
}

pub fn normalize_asm(asm: &str) -> String {
    let (mnemonic, operands) = split_asm(asm);
    if operands.is_empty() { mnemonic } else { format!("{} {}", mnemonic, operands.join(", ")) }
}

#[derive(Debug)]
pub struct CatalogIsa {
    name: String,
    // longest encoding first
    encodings: Vec<(Vec<u8>, String)>,
    asm_to_scheme: BTreeMap<String, String>,
}

impl CatalogIsa {
    fn build(catalog: &Catalog) -> Result<Self, DomainError> {
        let mut encodings = Vec::new();
        let mut asm_to_scheme = BTreeMap::new();
        for entry in &catalog.schemes {
            for form in &entry.forms {
                let bytes = hex::decode(form.hex.trim()).map_err(|e| DomainError::Decode { hex: form.hex.clone(), reason: e.to_string() })?;
                if bytes.is_empty() {
                    return Err(DomainError::Decode { hex: form.hex.clone(), reason: "empty encoding".into() });
                }
                encodings.push((bytes, form.asm.clone()));
                asm_to_scheme.insert(normalize_asm(&form.asm), entry.scheme.clone());
            }
        }
        encodings.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Ok(CatalogIsa { name: catalog.isa.clone(), encodings, asm_to_scheme })
    }
}

impl Isa for CatalogIsa {
    fn name(&self) -> &str {
        &self.name
    }

    fn hex_to_asm(&self, hex: &str) -> Result<Vec<String>, DomainError> {
        let bytes = hex::decode(hex.trim()).map_err(|e| DomainError::Decode { hex: hex.to_string(), reason: e.to_string() })?;
        let mut pos = 0;
        let mut out = Vec::new();
        while pos < bytes.len() {
            let rest = &bytes[pos..];
            let Some((enc, asm)) = self.encodings.iter().find(|(enc, _)| rest.starts_with(enc)) else {
                return Err(DomainError::Decode { hex: hex.to_string(), reason: format!("no known instruction at byte offset {pos}") });
            };
            out.push(asm.clone());
            pos += enc.len();
        }
        Ok(out)
    }

    fn parse_validated_asm(&self, asm: &[String]) -> Result<Vec<Instruction>, DomainError> {
        asm.iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let text = normalize_asm(line);
                let scheme = self
                    .asm_to_scheme
                    .get(&text)
                    .ok_or_else(|| DomainError::Parse { asm: line.clone(), reason: "not an instruction of the catalog".into() })?;
                let (_, operands) = split_asm(&text);
                Ok(Instruction { asm: text, scheme: scheme.clone(), operands })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct CatalogDomain {
    catalog: Catalog,
    isa: CatalogIsa,
}

impl CatalogDomain {
    pub fn new(catalog: Catalog) -> Result<Self, DomainError> {
        let isa = CatalogIsa::build(&catalog)?;
        Ok(CatalogDomain { catalog, isa })
    }

    /// Accepts YAML or JSON.
    pub fn from_yaml_str(text: &str) -> Result<Self, DomainError> {
        let catalog: Catalog = serde_yaml::from_str(text).map_err(|e| DomainError::Config(e.to_string()))?;
        Self::new(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading catalog {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading catalog {}", path.display()))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl AbstractionDomain for CatalogDomain {
    fn context(&self, config: &Value) -> Result<Box<dyn AbstractionContext + '_>, DomainError> {
        let min = match config.get("interestingness_metric").and_then(|m| m.get("min_interestingness")) {
            None | Some(Value::Null) => DEFAULT_MIN_INTERESTINGNESS,
            Some(v) => relaxed_json::as_f64(v).ok_or_else(|| DomainError::Config(format!("min_interestingness: {v}")))?,
        };
        if !(min >= 0.0) {
            return Err(DomainError::Config(format!("min_interestingness must be non-negative, got {min}")));
        }
        Ok(Box::new(CatalogContext { catalog: &self.catalog, min_interestingness: min }))
    }

    fn isa(&self, name: &str) -> Result<&dyn Isa, DomainError> {
        if name.eq_ignore_ascii_case(&self.isa.name) {
            Ok(&self.isa)
        } else {
            Err(DomainError::UnknownIsa(name.to_string()))
        }
    }
}

pub struct CatalogContext<'c> {
    catalog: &'c Catalog,
    min_interestingness: f64,
}

/// Feasible schemes of every position of a discovery, computed once per sweep.
struct Prepared<'b> {
    positions: Vec<BTreeSet<String>>,
    aliasing: &'b [AliasConstraint],
}

impl Prepared<'_> {
    fn window_matches(&self, bb: &BasicBlock, start: usize) -> bool {
        let schemes_ok = self.positions.iter().enumerate().all(|(i, set)| set.contains(&bb.insns[start + i].scheme));
        schemes_ok
            && self.aliasing.iter().all(|c| {
                let a = bb.insns[start + c.first.0].operands.get(c.first.1);
                let b = bb.insns[start + c.second.0].operands.get(c.second.1);
                match c.state {
                    AliasState::Top => true,
                    AliasState::Must => matches!((a, b), (Some(x), Some(y)) if x == y),
                    AliasState::MustNot => !matches!((a, b), (Some(x), Some(y)) if x == y),
                }
            })
    }

    fn covers(&self, bb: &BasicBlock, heuristic: bool) -> bool {
        let n = self.positions.len();
        if n == 0 {
            return true;
        }
        if heuristic {
            return self.positions.iter().all(|set| bb.insns.iter().any(|i| set.contains(&i.scheme)));
        }
        bb.len() >= n && (0..=bb.len() - n).any(|start| self.window_matches(bb, start))
    }
}

impl AbstractionContext for CatalogContext<'_> {
    fn feasible_schemes(&self, features: &Features) -> BTreeSet<String> {
        self.catalog
            .schemes
            .iter()
            .filter(|s| {
                features
                    .iter()
                    .filter(|(_, v)| !v.is_top())
                    .all(|(name, v)| s.features.get(name).is_some_and(|actual| v.admits(actual)))
            })
            .map(|s| s.scheme.clone())
            .collect()
    }

    /// Relative spread `(max - min) / min` of the tool results; infinite when a
    /// tool has no result or a non-positive one.
    fn compute_interestingness(&self, results: &ToolResults) -> f64 {
        let mut values = Vec::with_capacity(results.len());
        for v in results.values() {
            match v {
                Some(x) if x.is_finite() && *x > 0.0 => values.push(*x),
                _ => return f64::INFINITY,
            }
        }
        if values.is_empty() {
            return f64::INFINITY;
        }
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        (max - min) / min
    }

    fn is_interesting(&self, results: &ToolResults) -> bool {
        self.compute_interestingness(results) >= self.min_interestingness
    }

    fn subsumes(&self, general: &AbstractBlock, specific: &AbstractBlock) -> bool {
        if general.len() != specific.len() {
            return false;
        }
        let schemes_ok = general
            .abs_insns
            .iter()
            .zip(&specific.abs_insns)
            .all(|(g, s)| self.feasible_schemes(&s.features).is_subset(&self.feasible_schemes(&g.features)));
        schemes_ok
            && general
                .aliasing
                .iter()
                .filter(|c| c.state != AliasState::Top)
                .all(|c| specific.alias_state(c.first, c.second) == c.state)
    }

    fn table_metrics(&self, ranked: &[AbstractBlock], interesting: &[&BasicBlock], total: u64, heuristic: bool) -> TableMetrics {
        let prepared: Vec<Prepared<'_>> = ranked
            .iter()
            .map(|ab| Prepared {
                positions: ab.abs_insns.iter().map(|ai| self.feasible_schemes(&ai.features)).collect(),
                aliasing: &ab.aliasing,
            })
            .collect();
        let mut covered = 0u64;
        let mut covered_top = 0u64;
        for bb in interesting {
            // the first hit in rank order decides whether a top-ranked discovery explains the block
            if let Some(rank) = prepared.iter().position(|p| p.covers(bb, heuristic)) {
                covered += 1;
                if rank < TOP_DISCOVERIES {
                    covered_top += 1;
                }
            }
        }
        TableMetrics::from_counts(total, interesting.len() as u64, covered, covered_top)
    }
}
