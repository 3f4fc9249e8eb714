use absdisc_core::{AbstractBlock, AbstractionContext, AliasState, Expansion, OperandRef};

fn emphasize(text: String, on: bool) -> String {
    if on {
        format!("**{text}**")
    } else {
        text
    }
}

fn same_pair(a: (OperandRef, OperandRef), b: (OperandRef, OperandRef)) -> bool {
    a == b || (a.1, a.0) == b
}

/// Text of a block with the component touched by `changed` emphasized. Each
/// instruction line ends with the number of schemes it still represents.
pub fn block_label(ctx: &dyn AbstractionContext, ab: &AbstractBlock, changed: Option<&Expansion>) -> String {
    let mut lines = Vec::with_capacity(ab.len() + ab.aliasing.len());
    for (idx, insn) in ab.abs_insns.iter().enumerate() {
        let mut parts: Vec<String> = insn
            .features
            .iter()
            .filter(|(_, v)| !v.is_top())
            .map(|(name, v)| {
                let hit = matches!(changed, Some(Expansion::Feature { insn: i, name: n, .. }) if *i == idx && n == name);
                emphasize(format!("{name}: {v}"), hit)
            })
            .collect();
        if parts.is_empty() {
            parts.push("TOP".to_string());
        }
        let schemes = ctx.feasible_schemes(&insn.features).len();
        lines.push(format!("{idx}: {} ({schemes})", parts.join("; ")));
    }
    for c in ab.aliasing.iter().filter(|c| c.state != AliasState::Top) {
        let hit = matches!(changed, Some(Expansion::Alias { first, second, .. }) if same_pair((*first, *second), (c.first, c.second)));
        lines.push(emphasize(format!("{} ~ {}: {}", c.first, c.second, c.state), hit));
    }
    if lines.is_empty() {
        lines.push("(empty)".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use absdisc_core::catalog::CatalogDomain;
    use absdisc_core::{AbstractionDomain, FeatureValue};
    use serde_json::json;

    const CATALOG: &str = r#"
schemes:
  - scheme: "add R64, R64"
    features: { mnemonic: add, width: "64" }
  - scheme: "add R32, R32"
    features: { mnemonic: add, width: "32" }
  - scheme: "nop"
    features: { mnemonic: nop }
"#;

    #[test]
    fn changed_feature_is_emphasized() {
        let domain = CatalogDomain::from_yaml_str(CATALOG).unwrap();
        let ctx = domain.context(&json!(null)).unwrap();
        let ab = AbstractBlock::from_json(&json!({"abs_insns": [{"features": {"mnemonic": "add", "width": ["32", "64"]}}, {"features": {}}]})).unwrap();
        let exp = Expansion::Feature { insn: 0, name: "mnemonic".into(), value: FeatureValue::pinned("add") };
        assert_eq!(block_label(ctx.as_ref(), &ab, Some(&exp)), "0: **mnemonic: add**; width: {32, 64} (2)\n1: TOP (3)");
        assert_eq!(block_label(ctx.as_ref(), &ab, None), "0: mnemonic: add; width: {32, 64} (2)\n1: TOP (3)");
    }

    #[test]
    fn changed_alias_is_emphasized_in_either_order() {
        let domain = CatalogDomain::from_yaml_str(CATALOG).unwrap();
        let ctx = domain.context(&json!(null)).unwrap();
        let ab = AbstractBlock::from_json(&json!({
            "abs_insns": [{"features": {}}, {"features": {}}],
            "aliasing": [{"first": [0, 0], "second": [1, 1], "state": "must"}]
        }))
        .unwrap();
        let exp = Expansion::Alias { first: OperandRef(1, 1), second: OperandRef(0, 0), state: AliasState::Must };
        assert!(block_label(ctx.as_ref(), &ab, Some(&exp)).ends_with("**(0,0) ~ (1,1): must alias**"));
        assert_eq!(block_label(ctx.as_ref(), &AbstractBlock::default(), None), "(empty)");
    }
}
