use crate::ImportError;
use absdisc_core::json_tree::strip_doc_entries;
use absdisc_core::remarks::render_remarks;
use absdisc_core::{analyze_schemes, AbstractBlock, AbstractionContext, AbstractionDomain, DomainError, SchemeAnalysis};
use anyhow::Result;
use serde_json::Value;

/// A discovery file after doc stripping, with the data derived from its abstract block.
#[derive(Debug, Clone)]
pub struct AnalyzedDiscovery {
    pub blob: Value,
    pub absblock: AbstractBlock,
    pub num_insns: i64,
    pub analysis: SchemeAnalysis,
    pub remarks: Option<String>,
}

/// The abstraction config a discovery was produced under, if it carries one.
pub fn own_config(doc: &Value) -> Option<&Value> {
    doc.get("config").filter(|c| !c.is_null())
}

/// Strips documentation keys, renders the remarks and computes generality and
/// feasible schemes. `fallback` is used unless the file carries its own config.
pub fn analyze_discovery(domain: &dyn AbstractionDomain, fallback: &dyn AbstractionContext, identifier: &str, mut blob: Value) -> Result<AnalyzedDiscovery> {
    let removed = strip_doc_entries(&mut blob);
    tracing::trace!(identifier, removed, "stripped doc entries");

    let ab_json = blob.get("ab").ok_or_else(|| ImportError::MissingAbstractBlock(identifier.to_string()))?;
    let absblock = AbstractBlock::from_json(ab_json)?;

    let remarks = render_remarks(blob.get("remarks")).map_err(|e| match e {
        DomainError::MalformedRemark(reason) => anyhow::Error::from(ImportError::MalformedRemark { discovery: identifier.to_string(), reason }),
        other => other.into(),
    })?;

    let analysis = match own_config(&blob) {
        Some(config) => {
            let ctx = domain.context(config)?;
            analyze_schemes(ctx.as_ref(), &absblock)
        }
        None => analyze_schemes(fallback, &absblock),
    };

    Ok(AnalyzedDiscovery { num_insns: absblock.len() as i64, blob, absblock, analysis, remarks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use absdisc_core::catalog::CatalogDomain;
    use absdisc_core::Generality;
    use serde_json::json;

    const CATALOG: &str = r#"
schemes:
  - { scheme: "add R64, R64", features: { mnemonic: add, width: "64" } }
  - { scheme: "add R32, R32", features: { mnemonic: add, width: "32" } }
  - { scheme: "nop", features: { mnemonic: nop } }
"#;

    #[test]
    fn strips_docs_and_computes_generality() {
        let domain = CatalogDomain::from_yaml_str(CATALOG).unwrap();
        let ctx = domain.context(&json!({})).unwrap();
        let doc = json!({
            "ab": {
                "abs_insns": [
                    {"features": {"mnemonic": "add", "mnemonic.doc": "the opcode"}},
                    {"features": {"mnemonic": "add", "width": "64"}}
                ]
            },
            "ab.doc": "documentation",
            "remarks": ["plain", ["{} of {}", 1, 2]]
        });
        let d = analyze_discovery(&domain, ctx.as_ref(), "d0", doc).unwrap();
        assert!(d.blob.get("ab.doc").is_none());
        assert_eq!(d.num_insns, 2);
        assert_eq!(d.analysis.generality, Generality::Finite(1));
        assert_eq!(d.analysis.schemes.len(), 2);
        assert_eq!(d.remarks.as_deref(), Some("<li>plain</li>\n<li>1 of 2</li>"));
    }

    #[test]
    fn empty_block_is_infinitely_general() {
        let domain = CatalogDomain::from_yaml_str(CATALOG).unwrap();
        let ctx = domain.context(&json!({})).unwrap();
        let d = analyze_discovery(&domain, ctx.as_ref(), "d1", json!({"ab": {"abs_insns": []}})).unwrap();
        assert_eq!(d.analysis.generality, Generality::Infinite);
        assert!(d.analysis.schemes.is_empty());
        assert_eq!(d.remarks, None);
    }

    #[test]
    fn malformed_remark_is_fatal() {
        let domain = CatalogDomain::from_yaml_str(CATALOG).unwrap();
        let ctx = domain.context(&json!({})).unwrap();
        let err = analyze_discovery(&domain, ctx.as_ref(), "d2", json!({"ab": {"abs_insns": []}, "remarks": [["only template"]]})).unwrap_err();
        assert!(matches!(err.downcast_ref::<ImportError>(), Some(ImportError::MalformedRemark { .. })));
    }
}
