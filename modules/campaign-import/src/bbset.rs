use crate::ImportError;
use absdisc_core::{AbstractionDomain, ToolResults};
use anyhow::{Context, Result};
use results_sqlite::{BbsetId, Db, NewEntry};
use std::path::Path;
use tracing::info;

pub const BB_COLUMN: &str = "bb";

/// Empty cells, `None` and anything that is not a float are missing results.
fn parse_measurement(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("none") {
        return None;
    }
    cell.parse::<f64>().ok().filter(|x| !x.is_nan())
}

/// Reads a basic block CSV: a `bb` column of hex encoded blocks and one
/// measurement column per tool.
fn read_entries(domain: &dyn AbstractionDomain, isa: &str, csv_path: &Path) -> Result<(Vec<String>, Vec<NewEntry>)> {
    let isa = domain.isa(isa)?;
    let mut rdr = csv::Reader::from_path(csv_path).with_context(|| format!("opening {}", csv_path.display()))?;
    let headers = rdr.headers()?.clone();
    let bb_idx = headers
        .iter()
        .position(|h| h.trim() == BB_COLUMN)
        .ok_or_else(|| ImportError::MissingBbColumn(csv_path.display().to_string()))?;
    let tools: Vec<(usize, String)> = headers.iter().enumerate().filter(|(i, _)| *i != bb_idx).map(|(i, h)| (i, h.trim().to_string())).collect();

    let mut entries = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let hex = record.get(bb_idx).unwrap_or("").trim().to_string();
        hex::decode(&hex).map_err(|_| ImportError::InvalidHex(hex.clone()))?;
        let asm = isa.hex_to_asm(&hex)?;
        let measurements: ToolResults = tools.iter().map(|(i, name)| (name.clone(), record.get(*i).and_then(parse_measurement))).collect();
        entries.push(NewEntry { hex, asm, measurements });
    }
    Ok((tools.into_iter().map(|(_, name)| name).collect(), entries))
}

/// Imports a labelled basic block corpus in a single transaction.
pub fn import_basic_block_set(db: &Db, domain: &dyn AbstractionDomain, isa: &str, identifier: &str, csv_path: &Path) -> Result<BbsetId> {
    let (tools, entries) = read_entries(domain, isa, csv_path)?;

    let bbset_id = db.transaction(|| {
        let bbset_id = db.insert_bbset(identifier, isa).with_context(|| format!("creating basic block set {identifier}"))?;
        let mut tool_ids = Vec::with_capacity(tools.len());
        for name in &tools {
            let tool_id = db.upsert_tool(name)?;
            db.link_bbset_tool(bbset_id, tool_id)?;
            tool_ids.push((name.as_str(), tool_id));
        }

        db.bulk_insert_entries(bbset_id, &entries)?;
        let stored = db.entries_of_bbset(bbset_id)?;

        let mut rows = Vec::with_capacity(stored.len() * tool_ids.len());
        for (row, new) in stored.iter().zip(&entries) {
            for (name, tool_id) in &tool_ids {
                rows.push((row.entry, *tool_id, new.measurements.get(*name).copied().flatten()));
            }
        }
        db.bulk_insert_bb_measurements(&rows)?;
        Ok(bbset_id)
    })?;

    info!(bbset_id, identifier, isa, entries = entries.len(), tools = tools.len(), "imported basic block set");
    Ok(bbset_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_cells() {
        assert_eq!(parse_measurement("1.5"), Some(1.5));
        assert_eq!(parse_measurement(" 2 "), Some(2.0));
        assert_eq!(parse_measurement(""), None);
        assert_eq!(parse_measurement("None"), None);
        assert_eq!(parse_measurement("nan"), None);
        assert_eq!(parse_measurement("garbage"), None);
    }
}
