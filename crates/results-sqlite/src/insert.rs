use crate::{BbsetId, CampaignId, Db, DiscoveryRef, EntryRef, GeneralizationId, NewBatch, NewCampaign, NewDiscovery, NewEntry, NewGeneralization, SchemeId, ToolId};
use absdisc_core::TableMetrics;
use anyhow::{bail, Result};
use rusqlite::params;
use std::collections::BTreeSet;

/// Longest scheme text the `insn_schemes.text` column accepts.
pub const MAX_SCHEME_LEN: usize = 255;

impl Db {
    pub fn insert_campaign(&self, c: &NewCampaign) -> Result<CampaignId> {
        self.conn.execute(
            "INSERT INTO campaigns(tag,config_json,termination_json,date,host_pc,total_seconds,restrict_to_supported_insns,witness_path) VALUES (?,?,?,?,?,?,?,?)",
            params![c.tag, serde_json::to_string(&c.config)?, serde_json::to_string(&c.termination)?, c.date, c.host_pc, c.total_seconds, c.restrict_to_supported_insns, c.witness_path],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get-or-create against the UNIQUE(full_name) constraint.
    pub fn upsert_tool(&self, name: &str) -> Result<ToolId> {
        self.conn.execute("INSERT INTO tools(full_name) VALUES (?) ON CONFLICT(full_name) DO NOTHING", params![name])?;
        let id: ToolId = self.conn.query_row("SELECT tool_id FROM tools WHERE full_name=?", params![name], |r| r.get(0))?;
        Ok(id)
    }

    pub fn link_campaign_tool(&self, campaign_id: CampaignId, tool_id: ToolId) -> Result<()> {
        self.conn.execute("INSERT OR IGNORE INTO campaign_tools(campaign_id,tool_id) VALUES (?,?)", params![campaign_id, tool_id])?;
        Ok(())
    }

    /// Ids of the new rows are not returned; fetch them with [`Db::batches_of_campaign`].
    pub fn bulk_insert_batches(&self, campaign_id: CampaignId, batches: &[NewBatch]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO discovery_batches(campaign_id,batch_index,num_sampled,num_interesting,batch_time) VALUES (?,?,?,?,?)",
        )?;
        let mut n = 0;
        for b in batches {
            n += stmt.execute(params![campaign_id, b.batch_index, b.num_sampled, b.num_interesting, b.batch_time])?;
        }
        Ok(n)
    }

    /// Ids of the new rows are not returned; fetch them with [`Db::discoveries_of_campaign`].
    pub fn bulk_insert_discoveries(&self, discoveries: &[NewDiscovery]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO discoveries(batch_id,identifier,absblock_json,num_insns,witness_len,interestingness,subsumed_by,generality,remarks) VALUES (?,?,?,?,?,?,?,?,?)",
        )?;
        let mut n = 0;
        for d in discoveries {
            n += stmt.execute(params![
                d.batch.0,
                d.identifier,
                serde_json::to_string(&d.absblock)?,
                d.num_insns,
                d.witness_len,
                d.interestingness,
                d.subsumed_by,
                d.generality.to_sql(),
                d.remarks,
            ])?;
        }
        Ok(n)
    }

    /// Inserts the schemes not yet known; returns how many were new.
    pub fn insert_missing_schemes(&self, schemes: &BTreeSet<String>) -> Result<usize> {
        if let Some(long) = schemes.iter().find(|s| s.len() > MAX_SCHEME_LEN) {
            bail!("instruction scheme longer than {MAX_SCHEME_LEN} characters: {long}");
        }
        let mut stmt = self.conn.prepare_cached("INSERT OR IGNORE INTO insn_schemes(text) VALUES (?)")?;
        let mut n = 0;
        for s in schemes {
            n += stmt.execute(params![s])?;
        }
        Ok(n)
    }

    pub fn bulk_link_discovery_schemes(&self, links: &[(DiscoveryRef, SchemeId)]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("INSERT OR IGNORE INTO discovery_schemes(discovery_id,scheme_id) VALUES (?,?)")?;
        let mut n = 0;
        for (d, s) in links {
            n += stmt.execute(params![d.0, s])?;
        }
        Ok(n)
    }

    pub fn bulk_insert_measurements(&self, rows: &[(DiscoveryRef, f64)]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("INSERT INTO measurements(discovery_id,interestingness) VALUES (?,?)")?;
        let mut n = 0;
        for (d, v) in rows {
            n += stmt.execute(params![d.0, v])?;
        }
        Ok(n)
    }

    pub fn insert_generalization(&self, g: &NewGeneralization) -> Result<GeneralizationId> {
        self.conn.execute(
            "INSERT INTO generalizations(identifier,absblock_json,witness_file,witness_len,interestingness,generality,remarks,num_insns) VALUES (?,?,?,?,?,?,?,?)",
            params![g.identifier, serde_json::to_string(&g.absblock)?, g.witness_file, g.witness_len, g.interestingness, g.generality.to_sql(), g.remarks, g.num_insns],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn link_generalization_tool(&self, generalization_id: GeneralizationId, tool_id: ToolId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO generalization_tools(generalization_id,tool_id) VALUES (?,?)",
            params![generalization_id, tool_id],
        )?;
        Ok(())
    }

    pub fn insert_bbset(&self, identifier: &str, isa: &str) -> Result<BbsetId> {
        self.conn.execute("INSERT INTO bbsets(identifier,isa) VALUES (?,?)", params![identifier, isa])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn link_bbset_tool(&self, bbset_id: BbsetId, tool_id: ToolId) -> Result<()> {
        self.conn.execute("INSERT OR IGNORE INTO bbset_tools(bbset_id,tool_id) VALUES (?,?)", params![bbset_id, tool_id])?;
        Ok(())
    }

    /// Ids of the new rows are not returned; fetch them with [`Db::entries_of_bbset`].
    pub fn bulk_insert_entries(&self, bbset_id: BbsetId, entries: &[NewEntry]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("INSERT INTO bb_entries(bbset_id,hex,asm,measurements_json) VALUES (?,?,?,?)")?;
        let mut n = 0;
        for e in entries {
            n += stmt.execute(params![bbset_id, e.hex, e.asm.join("\n"), serde_json::to_string(&e.measurements)?])?;
        }
        Ok(n)
    }

    pub fn bulk_insert_bb_measurements(&self, rows: &[(EntryRef, ToolId, Option<f64>)]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("INSERT INTO bb_measurements(entry_id,tool_id,result) VALUES (?,?,?)")?;
        let mut n = 0;
        for (e, t, v) in rows {
            n += stmt.execute(params![e.0, t, v])?;
        }
        Ok(n)
    }

    pub fn bulk_mark_interesting(&self, campaign_id: CampaignId, entries: &[EntryRef]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached("INSERT OR IGNORE INTO bb_interesting_for(entry_id,campaign_id) VALUES (?,?)")?;
        let mut n = 0;
        for e in entries {
            n += stmt.execute(params![e.0, campaign_id])?;
        }
        Ok(n)
    }

    /// Returns `false` when a row for the pair already existed; it is left untouched.
    pub fn insert_bbset_metrics(&self, bbset_id: BbsetId, campaign_id: CampaignId, m: &TableMetrics) -> Result<bool> {
        let n = self.conn.execute(
            "INSERT OR IGNORE INTO bbset_metrics(bbset_id,campaign_id,num_bbs_interesting,percent_bbs_interesting,num_interesting_bbs_covered,percent_interesting_bbs_covered,num_interesting_bbs_covered_top10,percent_interesting_bbs_covered_top10)
             VALUES (?,?,?,?,?,?,?,?)",
            params![
                bbset_id,
                campaign_id,
                m.num_bbs_interesting as i64,
                m.percent_bbs_interesting,
                m.num_interesting_bbs_covered as i64,
                m.percent_interesting_bbs_covered,
                m.num_interesting_bbs_covered_top10 as i64,
                m.percent_interesting_bbs_covered_top10,
            ],
        )?;
        Ok(n == 1)
    }
}
