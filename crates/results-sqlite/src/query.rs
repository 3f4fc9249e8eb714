use crate::schema::TABLES;
use crate::{
    BatchRef, BatchRow, BbsetId, BbsetRow, CampaignId, CampaignRow, CampaignSummary, Db, DiscoveryRef, DiscoveryRow, EntryRef, EntryRow,
    GeneralizationId, GeneralizationRow, MetricsRow, SchemeId,
};
use absdisc_core::{Generality, TableMetrics, ToolResults};
use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};
use std::collections::BTreeMap;

const DISCOVERY_COLUMNS: &str = "d.discovery_id,d.batch_id,d.identifier,d.absblock_json,d.num_insns,d.witness_len,d.interestingness,d.subsumed_by,d.generality,d.remarks";

struct RawDiscovery {
    discovery_id: i64,
    batch_id: i64,
    identifier: String,
    absblock_json: String,
    num_insns: i64,
    witness_len: i64,
    interestingness: Option<f64>,
    subsumed_by: Option<String>,
    generality: Option<i64>,
    remarks: Option<String>,
}

impl RawDiscovery {
    fn from_row(r: &Row) -> rusqlite::Result<Self> {
        Ok(RawDiscovery {
            discovery_id: r.get(0)?,
            batch_id: r.get(1)?,
            identifier: r.get(2)?,
            absblock_json: r.get(3)?,
            num_insns: r.get(4)?,
            witness_len: r.get(5)?,
            interestingness: r.get(6)?,
            subsumed_by: r.get(7)?,
            generality: r.get(8)?,
            remarks: r.get(9)?,
        })
    }

    fn into_row(self) -> Result<DiscoveryRow> {
        let absblock = serde_json::from_str(&self.absblock_json).with_context(|| format!("abstract block of discovery {}", self.identifier))?;
        Ok(DiscoveryRow {
            discovery: DiscoveryRef(self.discovery_id),
            batch: BatchRef(self.batch_id),
            identifier: self.identifier,
            absblock,
            num_insns: self.num_insns,
            witness_len: self.witness_len,
            interestingness: self.interestingness,
            subsumed_by: self.subsumed_by,
            generality: Generality::from_sql(self.generality),
            remarks: self.remarks,
        })
    }
}

fn metrics_from_row(r: &Row) -> rusqlite::Result<MetricsRow> {
    Ok(MetricsRow {
        bbset_id: r.get(0)?,
        campaign_id: r.get(1)?,
        metrics: TableMetrics {
            num_bbs_interesting: r.get::<_, i64>(2)? as u64,
            percent_bbs_interesting: r.get(3)?,
            num_interesting_bbs_covered: r.get::<_, i64>(4)? as u64,
            percent_interesting_bbs_covered: r.get(5)?,
            num_interesting_bbs_covered_top10: r.get::<_, i64>(6)? as u64,
            percent_interesting_bbs_covered_top10: r.get(7)?,
        },
    })
}

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    /// Row count of every table, parents first.
    pub fn row_counts(&self) -> Result<BTreeMap<String, i64>> {
        let mut out = BTreeMap::new();
        for t in TABLES {
            let n: i64 = self.conn.query_row(&format!("SELECT COUNT(1) FROM {t}"), [], |r| r.get(0))?;
            out.insert(t.to_string(), n);
        }
        Ok(out)
    }

    pub fn campaign_by_witness_path(&self, witness_path: &str) -> Result<Option<CampaignId>> {
        Ok(self
            .conn
            .query_row("SELECT campaign_id FROM campaigns WHERE witness_path=?", [witness_path], |r| r.get(0))
            .optional()?)
    }

    pub fn campaign_ids(&self) -> Result<Vec<CampaignId>> {
        let mut stmt = self.conn.prepare_cached("SELECT campaign_id FROM campaigns ORDER BY campaign_id")?;
        let ids = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn campaign(&self, campaign_id: CampaignId) -> Result<Option<CampaignRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT campaign_id,tag,config_json,termination_json,date,host_pc,total_seconds,restrict_to_supported_insns,witness_path FROM campaigns WHERE campaign_id=?",
                [campaign_id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, i64>(6)?,
                        r.get::<_, bool>(7)?,
                        r.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;
        let Some((campaign_id, tag, config, termination, date, host_pc, total_seconds, restrict, witness_path)) = raw else {
            return Ok(None);
        };
        Ok(Some(CampaignRow {
            campaign_id,
            tag,
            config: serde_json::from_str(&config).context("campaign abstraction config")?,
            termination: serde_json::from_str(&termination).context("campaign termination condition")?,
            date,
            host_pc,
            total_seconds,
            restrict_to_supported_insns: restrict,
            witness_path,
        }))
    }

    /// Tool names of a campaign, sorted.
    pub fn campaign_tools(&self, campaign_id: CampaignId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT t.full_name FROM campaign_tools ct JOIN tools t ON t.tool_id=ct.tool_id WHERE ct.campaign_id=? ORDER BY t.full_name",
        )?;
        let names = stmt.query_map([campaign_id], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn batches_of_campaign(&self, campaign_id: CampaignId) -> Result<Vec<BatchRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT batch_id,batch_index,num_sampled,num_interesting,batch_time FROM discovery_batches WHERE campaign_id=? ORDER BY batch_index",
        )?;
        let rows = stmt
            .query_map([campaign_id], |r| {
                Ok(BatchRow {
                    batch: BatchRef(r.get(0)?),
                    batch_index: r.get(1)?,
                    num_sampled: r.get(2)?,
                    num_interesting: r.get(3)?,
                    batch_time: r.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All discoveries of a campaign in insertion order.
    pub fn discoveries_of_campaign(&self, campaign_id: CampaignId) -> Result<Vec<DiscoveryRow>> {
        let sql = format!(
            "SELECT {DISCOVERY_COLUMNS} FROM discoveries d JOIN discovery_batches b ON b.batch_id=d.batch_id WHERE b.campaign_id=? ORDER BY d.discovery_id"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let raw = stmt.query_map([campaign_id], RawDiscovery::from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawDiscovery::into_row).collect()
    }

    /// First discovery of the campaign carrying `identifier`.
    pub fn discovery_by_identifier(&self, campaign_id: CampaignId, identifier: &str) -> Result<Option<DiscoveryRow>> {
        let sql = format!(
            "SELECT {DISCOVERY_COLUMNS} FROM discoveries d JOIN discovery_batches b ON b.batch_id=d.batch_id WHERE b.campaign_id=? AND d.identifier=? ORDER BY b.batch_index LIMIT 1"
        );
        let raw = self.conn.query_row(&sql, params![campaign_id, identifier], RawDiscovery::from_row).optional()?;
        raw.map(RawDiscovery::into_row).transpose()
    }

    pub fn measurements_of_discovery(&self, discovery: DiscoveryRef) -> Result<Vec<f64>> {
        let mut stmt = self.conn.prepare_cached("SELECT interestingness FROM measurements WHERE discovery_id=? ORDER BY measurement_id")?;
        let values = stmt.query_map([discovery.0], |r| r.get(0))?.collect::<rusqlite::Result<Vec<f64>>>()?;
        Ok(values)
    }

    /// Every known instruction scheme keyed by its text.
    pub fn all_scheme_ids(&self) -> Result<BTreeMap<String, SchemeId>> {
        let mut stmt = self.conn.prepare_cached("SELECT text,scheme_id FROM insn_schemes")?;
        let map = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?.collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
        Ok(map)
    }

    pub fn schemes_of_discovery(&self, discovery: DiscoveryRef) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.text FROM discovery_schemes ds JOIN insn_schemes s ON s.scheme_id=ds.scheme_id WHERE ds.discovery_id=? ORDER BY s.text",
        )?;
        let names = stmt.query_map([discovery.0], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn generalization(&self, generalization_id: GeneralizationId) -> Result<Option<GeneralizationRow>> {
        let raw = self
            .conn
            .query_row(
                "SELECT generalization_id,identifier,absblock_json,witness_file,witness_len,interestingness,generality,remarks,num_insns FROM generalizations WHERE generalization_id=?",
                [generalization_id],
                |r| {
                    Ok((
                        r.get::<_, i64>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, i64>(4)?,
                        r.get::<_, Option<f64>>(5)?,
                        r.get::<_, Option<i64>>(6)?,
                        r.get::<_, Option<String>>(7)?,
                        r.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()?;
        let Some((generalization_id, identifier, absblock, witness_file, witness_len, interestingness, generality, remarks, num_insns)) = raw else {
            return Ok(None);
        };
        Ok(Some(GeneralizationRow {
            generalization_id,
            identifier,
            absblock: serde_json::from_str(&absblock).context("generalization abstract block")?,
            witness_file,
            witness_len,
            interestingness,
            generality: Generality::from_sql(generality),
            remarks,
            num_insns,
        }))
    }

    pub fn generalization_tools(&self, generalization_id: GeneralizationId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT t.full_name FROM generalization_tools gt JOIN tools t ON t.tool_id=gt.tool_id WHERE gt.generalization_id=? ORDER BY t.full_name",
        )?;
        let names = stmt.query_map([generalization_id], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn bbset_ids(&self) -> Result<Vec<BbsetId>> {
        let mut stmt = self.conn.prepare_cached("SELECT bbset_id FROM bbsets ORDER BY bbset_id")?;
        let ids = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn bbset(&self, bbset_id: BbsetId) -> Result<Option<BbsetRow>> {
        Ok(self
            .conn
            .query_row("SELECT bbset_id,identifier,isa FROM bbsets WHERE bbset_id=?", [bbset_id], |r| {
                Ok(BbsetRow { bbset_id: r.get(0)?, identifier: r.get(1)?, isa: r.get(2)? })
            })
            .optional()?)
    }

    /// Tool names with data in a basic-block set, sorted.
    pub fn bbset_tools(&self, bbset_id: BbsetId) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT t.full_name FROM bbset_tools bt JOIN tools t ON t.tool_id=bt.tool_id WHERE bt.bbset_id=? ORDER BY t.full_name",
        )?;
        let names = stmt.query_map([bbset_id], |r| r.get(0))?.collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Entries in insertion order.
    pub fn entries_of_bbset(&self, bbset_id: BbsetId) -> Result<Vec<EntryRow>> {
        let mut stmt = self.conn.prepare_cached("SELECT entry_id,hex,asm,measurements_json FROM bb_entries WHERE bbset_id=? ORDER BY entry_id")?;
        let raw = stmt
            .query_map([bbset_id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?, r.get::<_, String>(3)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter()
            .map(|(id, hex, asm, measurements)| {
                let measurements: ToolResults = serde_json::from_str(&measurements).with_context(|| format!("measurements of entry {id}"))?;
                let asm = if asm.is_empty() { Vec::new() } else { asm.split('\n').map(str::to_string).collect() };
                Ok(EntryRow { entry: EntryRef(id), hex, asm, measurements })
            })
            .collect()
    }

    /// Stored per-tool results of every entry of a set.
    pub fn bb_measurements_of_bbset(&self, bbset_id: BbsetId) -> Result<BTreeMap<EntryRef, ToolResults>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT m.entry_id,t.full_name,m.result FROM bb_measurements m JOIN bb_entries e ON e.entry_id=m.entry_id JOIN tools t ON t.tool_id=m.tool_id WHERE e.bbset_id=?",
        )?;
        let mut out: BTreeMap<EntryRef, ToolResults> = BTreeMap::new();
        let rows = stmt.query_map([bbset_id], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, Option<f64>>(2)?)))?;
        for row in rows {
            let (entry, tool, result) = row?;
            out.entry(EntryRef(entry)).or_default().insert(tool, result);
        }
        Ok(out)
    }

    pub fn bbset_metrics_exists(&self, bbset_id: BbsetId, campaign_id: CampaignId) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM bbset_metrics WHERE bbset_id=? AND campaign_id=?",
            params![bbset_id, campaign_id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    /// Whether any entry of the set is already marked interesting for the campaign.
    pub fn interesting_exists(&self, bbset_id: BbsetId, campaign_id: CampaignId) -> Result<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM bb_interesting_for i JOIN bb_entries e ON e.entry_id=i.entry_id WHERE e.bbset_id=? AND i.campaign_id=?",
            params![bbset_id, campaign_id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }

    pub fn interesting_entries(&self, bbset_id: BbsetId, campaign_id: CampaignId) -> Result<Vec<EntryRef>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT i.entry_id FROM bb_interesting_for i JOIN bb_entries e ON e.entry_id=i.entry_id WHERE e.bbset_id=? AND i.campaign_id=? ORDER BY i.entry_id",
        )?;
        let ids = stmt.query_map(params![bbset_id, campaign_id], |r| Ok(EntryRef(r.get(0)?)))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    pub fn bbset_metrics(&self, bbset_id: BbsetId, campaign_id: CampaignId) -> Result<Option<MetricsRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT bbset_id,campaign_id,num_bbs_interesting,percent_bbs_interesting,num_interesting_bbs_covered,percent_interesting_bbs_covered,num_interesting_bbs_covered_top10,percent_interesting_bbs_covered_top10
                 FROM bbset_metrics WHERE bbset_id=? AND campaign_id=?",
                params![bbset_id, campaign_id],
                metrics_from_row,
            )
            .optional()?)
    }

    pub fn campaign_summaries(&self) -> Result<Vec<CampaignSummary>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT c.campaign_id,c.tag,c.date,c.host_pc,c.total_seconds,
                    (SELECT COUNT(1) FROM discovery_batches b WHERE b.campaign_id=c.campaign_id),
                    (SELECT COUNT(1) FROM discoveries d JOIN discovery_batches b ON b.batch_id=d.batch_id WHERE b.campaign_id=c.campaign_id),
                    (SELECT b.num_interesting FROM discovery_batches b WHERE b.campaign_id=c.campaign_id ORDER BY b.batch_index LIMIT 1),
                    (SELECT b.num_sampled FROM discovery_batches b WHERE b.campaign_id=c.campaign_id ORDER BY b.batch_index LIMIT 1)
             FROM campaigns c ORDER BY c.campaign_id",
        )?;
        let raw = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)?,
                    r.get::<_, i64>(6)?,
                    r.get::<_, Option<i64>>(7)?,
                    r.get::<_, Option<i64>>(8)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter()
            .map(|(campaign_id, tag, date, host_pc, total_seconds, num_batches, num_discoveries, first_interesting, first_sampled)| {
                let init_interesting_sample_ratio = match (first_interesting, first_sampled) {
                    (Some(i), Some(s)) if s > 0 => Some(i as f64 / s as f64),
                    _ => None,
                };
                Ok(CampaignSummary {
                    campaign_id,
                    tools: self.campaign_tools(campaign_id)?,
                    tag,
                    date,
                    host_pc,
                    num_batches,
                    num_discoveries,
                    init_interesting_sample_ratio,
                    total_seconds,
                })
            })
            .collect()
    }
}
