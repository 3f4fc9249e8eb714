//! Abstract blocks: per-feature constraints over a short instruction sequence.
//!
//! A feature is either unconstrained (`Top`) or restricted to a set of admissible
//! values. Pairwise operand aliasing is tracked separately. Expansions move a
//! block strictly down the lattice.

use crate::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum FeatureValue {
    Top,
    OneOf(BTreeSet<String>),
}

impl FeatureValue {
    pub fn pinned(v: impl Into<String>) -> Self {
        FeatureValue::OneOf(BTreeSet::from([v.into()]))
    }

    pub fn is_top(&self) -> bool {
        matches!(self, FeatureValue::Top)
    }

    pub fn admits(&self, v: &str) -> bool {
        match self {
            FeatureValue::Top => true,
            FeatureValue::OneOf(set) => set.contains(v),
        }
    }

    /// `self` is at least as general as `other`.
    pub fn covers(&self, other: &FeatureValue) -> bool {
        match (self, other) {
            (FeatureValue::Top, _) => true,
            (FeatureValue::OneOf(_), FeatureValue::Top) => false,
            (FeatureValue::OneOf(a), FeatureValue::OneOf(b)) => b.is_subset(a),
        }
    }

    pub fn is_refined_by(&self, other: &FeatureValue) -> bool {
        self.covers(other) && self != other
    }
}

impl TryFrom<Value> for FeatureValue {
    type Error = DomainError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        fn scalar(v: &Value) -> Option<String> {
            match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            }
        }
        match v {
            Value::Null => Ok(FeatureValue::Top),
            Value::Array(items) => {
                let mut set = BTreeSet::new();
                for item in &items {
                    let s = scalar(item).ok_or_else(|| DomainError::InvalidFeature(item.to_string()))?;
                    set.insert(s);
                }
                if set.is_empty() {
                    return Err(DomainError::InvalidFeature("empty value set".into()));
                }
                Ok(FeatureValue::OneOf(set))
            }
            other => scalar(&other).map(FeatureValue::pinned).ok_or_else(|| DomainError::InvalidFeature(other.to_string())),
        }
    }
}

impl From<FeatureValue> for Value {
    fn from(v: FeatureValue) -> Self {
        match v {
            FeatureValue::Top => Value::Null,
            FeatureValue::OneOf(set) if set.len() == 1 => Value::String(set.into_iter().next().unwrap_or_default()),
            FeatureValue::OneOf(set) => Value::Array(set.into_iter().map(Value::String).collect()),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Top => write!(f, "TOP"),
            FeatureValue::OneOf(set) if set.len() == 1 => write!(f, "{}", set.iter().next().map(String::as_str).unwrap_or("")),
            FeatureValue::OneOf(set) => write!(f, "{{{}}}", set.iter().cloned().collect::<Vec<_>>().join(", ")),
        }
    }
}

pub type Features = BTreeMap<String, FeatureValue>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractInsn {
    #[serde(default)]
    pub features: Features,
}

impl AbstractInsn {
    pub fn is_top(&self) -> bool {
        self.features.values().all(FeatureValue::is_top)
    }

    pub fn feature(&self, name: &str) -> &FeatureValue {
        self.features.get(name).unwrap_or(&FeatureValue::Top)
    }
}

/// `(instruction index, operand index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperandRef(pub usize, pub usize);

impl fmt::Display for OperandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasState {
    Top,
    Must,
    MustNot,
}

impl fmt::Display for AliasState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AliasState::Top => "TOP",
            AliasState::Must => "must alias",
            AliasState::MustNot => "must not alias",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasConstraint {
    pub first: OperandRef,
    pub second: OperandRef,
    pub state: AliasState,
}

fn ordered(a: OperandRef, b: OperandRef) -> (OperandRef, OperandRef) {
    if a <= b { (a, b) } else { (b, a) }
}

/// One refinement step recorded by the discovery search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expansion {
    Feature { insn: usize, name: String, value: FeatureValue },
    Alias { first: OperandRef, second: OperandRef, state: AliasState },
}

impl fmt::Display for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expansion::Feature { insn, name, value } => write!(f, "insn {insn}: {name} -> {value}"),
            Expansion::Alias { first, second, state } => write!(f, "{first} ~ {second} -> {state}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractBlock {
    pub abs_insns: Vec<AbstractInsn>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliasing: Vec<AliasConstraint>,
}

impl AbstractBlock {
    pub fn top(len: usize) -> Self {
        AbstractBlock { abs_insns: vec![AbstractInsn::default(); len], aliasing: Vec::new() }
    }

    pub fn from_json(v: &Value) -> Result<Self, DomainError> {
        let ab: AbstractBlock = serde_json::from_value(v.clone()).map_err(|e| DomainError::InvalidBlock(e.to_string()))?;
        for c in &ab.aliasing {
            for r in [c.first, c.second] {
                if r.0 >= ab.abs_insns.len() {
                    return Err(DomainError::InvalidBlock(format!("aliasing refers to missing instruction {}", r.0)));
                }
            }
        }
        Ok(ab)
    }

    pub fn len(&self) -> usize {
        self.abs_insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.abs_insns.is_empty()
    }

    pub fn alias_state(&self, a: OperandRef, b: OperandRef) -> AliasState {
        let key = ordered(a, b);
        self.aliasing
            .iter()
            .find(|c| ordered(c.first, c.second) == key)
            .map(|c| c.state)
            .unwrap_or(AliasState::Top)
    }

    /// Apply `exp` in place; it must move the block strictly down the lattice.
    pub fn apply_expansion(&mut self, exp: &Expansion) -> Result<(), DomainError> {
        match exp {
            Expansion::Feature { insn, name, value } => {
                let len = self.abs_insns.len();
                let ai = self
                    .abs_insns
                    .get_mut(*insn)
                    .ok_or_else(|| DomainError::InvalidExpansion(format!("instruction {insn} out of range (block has {len})")))?;
                let current = ai.feature(name);
                if !current.is_refined_by(value) {
                    return Err(DomainError::NonRefiningExpansion(format!("{name}: {current} -> {value}")));
                }
                ai.features.insert(name.clone(), value.clone());
            }
            Expansion::Alias { first, second, state } => {
                for r in [first, second] {
                    if r.0 >= self.abs_insns.len() {
                        return Err(DomainError::InvalidExpansion(format!("operand {r} out of range")));
                    }
                }
                let current = self.alias_state(*first, *second);
                if current != AliasState::Top || *state == AliasState::Top {
                    return Err(DomainError::NonRefiningExpansion(format!("{first} ~ {second}: {current} -> {state}")));
                }
                let (a, b) = ordered(*first, *second);
                self.aliasing.retain(|c| ordered(c.first, c.second) != (a, b));
                self.aliasing.push(AliasConstraint { first: a, second: b, state: *state });
            }
        }
        Ok(())
    }

    /// `self` is at least as general as `other`: every feature and every resolved
    /// aliasing relation of `self` is matched or narrowed in `other`.
    pub fn covers(&self, other: &AbstractBlock) -> bool {
        if self.abs_insns.len() != other.abs_insns.len() {
            return false;
        }
        let features_ok = self.abs_insns.iter().zip(&other.abs_insns).all(|(mine, theirs)| {
            let names: BTreeSet<&String> = mine.features.keys().chain(theirs.features.keys()).collect();
            names.into_iter().all(|n| mine.feature(n).covers(theirs.feature(n)))
        });
        let aliasing_ok = self
            .aliasing
            .iter()
            .filter(|c| c.state != AliasState::Top)
            .all(|c| other.alias_state(c.first, c.second) == c.state);
        features_ok && aliasing_ok
    }

    pub fn is_refined_by(&self, other: &AbstractBlock) -> bool {
        self.covers(other) && !other.covers(self)
    }
}

impl fmt::Display for AbstractBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, ai) in self.abs_insns.iter().enumerate() {
            if ai.is_top() {
                writeln!(f, "{idx}: TOP")?;
                continue;
            }
            let parts: Vec<String> = ai
                .features
                .iter()
                .filter(|(_, v)| !v.is_top())
                .map(|(k, v)| format!("{k}: {v}"))
                .collect();
            writeln!(f, "{idx}: {}", parts.join("; "))?;
        }
        for c in self.aliasing.iter().filter(|c| c.state != AliasState::Top) {
            writeln!(f, "{} ~ {}: {}", c.first, c.second, c.state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block() -> AbstractBlock {
        AbstractBlock::from_json(&json!({
            "abs_insns": [
                {"features": {"mnemonic": null, "width": ["32", "64"]}},
                {"features": {"mnemonic": "add"}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn feature_values_parse_from_json() {
        let ab = block();
        assert!(ab.abs_insns[0].feature("mnemonic").is_top());
        assert!(ab.abs_insns[0].feature("width").admits("64"));
        assert!(!ab.abs_insns[0].feature("width").admits("16"));
        assert_eq!(ab.abs_insns[1].feature("mnemonic"), &FeatureValue::pinned("add"));
        assert!(AbstractBlock::from_json(&json!({"abs_insns": [{"features": {"w": []}}]})).is_err());
    }

    #[test]
    fn feature_expansion_must_narrow() {
        let mut ab = block();
        let parent = ab.clone();
        ab.apply_expansion(&Expansion::Feature { insn: 0, name: "width".into(), value: FeatureValue::pinned("64") }).unwrap();
        assert!(parent.is_refined_by(&ab));

        let widen = Expansion::Feature { insn: 0, name: "width".into(), value: FeatureValue::pinned("16") };
        assert!(matches!(ab.apply_expansion(&widen), Err(DomainError::NonRefiningExpansion(_))));
        let same = Expansion::Feature { insn: 1, name: "mnemonic".into(), value: FeatureValue::pinned("add") };
        assert!(matches!(ab.apply_expansion(&same), Err(DomainError::NonRefiningExpansion(_))));
        let oob = Expansion::Feature { insn: 7, name: "mnemonic".into(), value: FeatureValue::pinned("add") };
        assert!(matches!(ab.apply_expansion(&oob), Err(DomainError::InvalidExpansion(_))));
    }

    #[test]
    fn alias_expansion_resolves_top_once() {
        let mut ab = block();
        let exp = Expansion::Alias { first: OperandRef(1, 0), second: OperandRef(0, 1), state: AliasState::Must };
        ab.apply_expansion(&exp).unwrap();
        assert_eq!(ab.alias_state(OperandRef(0, 1), OperandRef(1, 0)), AliasState::Must);
        assert!(ab.apply_expansion(&exp).is_err());
        assert!(block().is_refined_by(&ab));
    }

    #[test]
    fn expansion_json_shape() {
        let exp: Expansion = serde_json::from_value(json!({"feature": {"insn": 0, "name": "mnemonic", "value": "add"}})).unwrap();
        assert_eq!(exp, Expansion::Feature { insn: 0, name: "mnemonic".into(), value: FeatureValue::pinned("add") });
        let exp: Expansion = serde_json::from_value(json!({"alias": {"first": [0, 0], "second": [1, 1], "state": "must_not"}})).unwrap();
        assert!(matches!(exp, Expansion::Alias { state: AliasState::MustNot, .. }));
    }

    #[test]
    fn display_skips_top_features() {
        let text = block().to_string();
        assert!(text.contains("0: width: {32, 64}"));
        assert!(text.contains("1: mnemonic: add"));
    }
}
