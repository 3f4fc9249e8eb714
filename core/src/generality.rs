use crate::{AbstractBlock, AbstractionContext};
use std::collections::BTreeSet;
use std::fmt;

/// Minimum number of concrete schemes any abstract instruction of a block represents.
/// A block without abstract instructions is infinitely general.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Generality {
    Finite(u64),
    Infinite,
}

impl Generality {
    /// Stored as a nullable integer column; `NULL` is infinity.
    pub fn to_sql(self) -> Option<i64> {
        match self {
            Generality::Finite(n) => Some(n as i64),
            Generality::Infinite => None,
        }
    }

    pub fn from_sql(v: Option<i64>) -> Self {
        match v {
            Some(n) => Generality::Finite(n.max(0) as u64),
            None => Generality::Infinite,
        }
    }
}

impl fmt::Display for Generality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generality::Finite(n) => write!(f, "{n}"),
            Generality::Infinite => write!(f, "inf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeAnalysis {
    pub generality: Generality,
    /// Union of the feasible schemes of all abstract instructions.
    pub schemes: BTreeSet<String>,
}

pub fn analyze_schemes(ctx: &dyn AbstractionContext, ab: &AbstractBlock) -> SchemeAnalysis {
    let mut generality = Generality::Infinite;
    let mut schemes = BTreeSet::new();
    for ai in &ab.abs_insns {
        let feasible = ctx.feasible_schemes(&ai.features);
        generality = generality.min(Generality::Finite(feasible.len() as u64));
        schemes.extend(feasible);
    }
    SchemeAnalysis { generality, schemes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinity_orders_above_every_count() {
        assert!(Generality::Finite(u64::MAX) < Generality::Infinite);
        assert_eq!(Generality::Finite(3).min(Generality::Infinite), Generality::Finite(3));
    }

    #[test]
    fn sql_representation() {
        assert_eq!(Generality::Infinite.to_sql(), None);
        assert_eq!(Generality::from_sql(Some(7)), Generality::Finite(7));
        assert_eq!(Generality::from_sql(None), Generality::Infinite);
    }
}
