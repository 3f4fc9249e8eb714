use crate::discovery::{analyze_discovery, own_config};
use crate::files::{canonical_path, load_json, load_json_as, GeneralizationInfos};
use absdisc_core::AbstractionDomain;
use anyhow::Result;
use results_sqlite::{Db, GeneralizationId, NewGeneralization};
use serde_json::Value;
use std::path::Path;
use tracing::info;

pub const DISCOVERY_FILE: &str = "discovery.json";
pub const INFOS_FILE: &str = "infos.json";
pub const WITNESS_FILE: &str = "witness.json";

/// Imports the result of a single generalization run (no campaign around it).
pub fn import_generalization(db: &Db, domain: &dyn AbstractionDomain, dir: &Path) -> Result<GeneralizationId> {
    let doc = load_json(&dir.join(DISCOVERY_FILE))?;
    let infos: GeneralizationInfos = load_json_as(&dir.join(INFOS_FILE))?;
    let witness_file = canonical_path(&dir.join(WITNESS_FILE))?.to_string_lossy().into_owned();

    let name = infos.identifier.clone().unwrap_or_else(|| dir.display().to_string());
    let ctx = domain.context(own_config(&doc).unwrap_or(&Value::Null))?;
    let analyzed = analyze_discovery(domain, ctx.as_ref(), &name, doc)?;

    let generalization_id = db.transaction(|| {
        let id = db.insert_generalization(&NewGeneralization {
            identifier: infos.identifier.clone(),
            absblock: analyzed.blob.clone(),
            witness_file: witness_file.clone(),
            witness_len: infos.witness_len,
            // only campaign imports carry measured interestingness
            interestingness: None,
            generality: analyzed.analysis.generality,
            remarks: analyzed.remarks.clone(),
            num_insns: analyzed.num_insns,
        })?;
        for tool in &infos.predictors {
            let tool_id = db.upsert_tool(tool)?;
            db.link_generalization_tool(id, tool_id)?;
        }
        Ok(id)
    })?;

    info!(generalization_id, name = %name, generality = %analyzed.analysis.generality, "imported generalization");
    Ok(generalization_id)
}
