//! Seams to the abstraction domain: scheme enumeration, interestingness,
//! subsumption, coverage metrics and the ISA decoder.

use crate::{AbstractBlock, DomainError, Features};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Per-tool measurement of one basic block; `None` when the tool produced no result.
pub type ToolResults = BTreeMap<String, Option<f64>>;

/// Number of best-ranked discoveries considered for the top-N coverage figure.
pub const TOP_DISCOVERIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    pub asm: String,
    pub scheme: String,
    pub operands: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasicBlock {
    pub insns: Vec<Instruction>,
}

impl BasicBlock {
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetrics {
    pub num_bbs_interesting: u64,
    pub percent_bbs_interesting: f64,
    pub num_interesting_bbs_covered: u64,
    pub percent_interesting_bbs_covered: f64,
    pub num_interesting_bbs_covered_top10: u64,
    pub percent_interesting_bbs_covered_top10: f64,
}

impl TableMetrics {
    pub fn from_counts(total: u64, interesting: u64, covered: u64, covered_top: u64) -> Self {
        TableMetrics {
            num_bbs_interesting: interesting,
            percent_bbs_interesting: percent(interesting, total),
            num_interesting_bbs_covered: covered,
            percent_interesting_bbs_covered: percent(covered, interesting),
            num_interesting_bbs_covered_top10: covered_top,
            percent_interesting_bbs_covered_top10: percent(covered_top, interesting),
        }
    }
}

/// `100 * part / total`, and `0.0` for an empty total.
pub fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * part as f64 / total as f64
}

/// An abstraction domain instantiated for one abstraction config.
pub trait AbstractionContext {
    fn feasible_schemes(&self, features: &Features) -> BTreeSet<String>;

    fn compute_interestingness(&self, results: &ToolResults) -> f64;

    fn is_interesting(&self, results: &ToolResults) -> bool;

    /// `general` represents a superset of the instruction sequences `specific` represents.
    fn subsumes(&self, general: &AbstractBlock, specific: &AbstractBlock) -> bool;

    /// Coverage of `interesting` by `ranked` (best first) out of `total` blocks.
    fn table_metrics(&self, ranked: &[AbstractBlock], interesting: &[&BasicBlock], total: u64, heuristic: bool) -> TableMetrics;
}

pub trait Isa {
    fn name(&self) -> &str;

    fn hex_to_asm(&self, hex: &str) -> Result<Vec<String>, DomainError>;

    fn parse_validated_asm(&self, asm: &[String]) -> Result<Vec<Instruction>, DomainError>;

    fn make_basic_block(&self, insns: Vec<Instruction>) -> BasicBlock {
        BasicBlock { insns }
    }
}

pub trait AbstractionDomain {
    fn context(&self, config: &Value) -> Result<Box<dyn AbstractionContext + '_>, DomainError>;

    fn isa(&self, name: &str) -> Result<&dyn Isa, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_empty_total_is_zero() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn metrics_percentages_follow_counts() {
        let m = TableMetrics::from_counts(10, 4, 3, 1);
        assert_eq!(m.percent_bbs_interesting, 40.0);
        assert_eq!(m.percent_interesting_bbs_covered, 75.0);
        assert_eq!(m.percent_interesting_bbs_covered_top10, 25.0);
        let none = TableMetrics::from_counts(3, 0, 0, 0);
        assert_eq!(none.percent_interesting_bbs_covered, 0.0);
        assert_eq!(none.percent_interesting_bbs_covered_top10, 0.0);
    }
}
