//! Coverage of labelled basic block corpora by the discoveries of a campaign.

use absdisc_core::{AbstractBlock, AbstractionContext, AbstractionDomain, BasicBlock, Isa, TableMetrics, ToolResults};
use anyhow::{anyhow, Context, Result};
use results_sqlite::{BbsetId, CampaignId, Db, DiscoveryRow, EntryRef, EntryRow};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairOutcome {
    Computed(TableMetrics),
    AlreadyComputed,
    /// The campaign used tools the basic block set has no data for.
    MissingTools { missing: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairReport {
    pub bbset_id: BbsetId,
    pub campaign_id: CampaignId,
    #[serde(flatten)]
    pub outcome: PairOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub pairs: Vec<PairReport>,
}

impl CoverageReport {
    pub fn computed(&self) -> usize {
        self.pairs.iter().filter(|p| matches!(p.outcome, PairOutcome::Computed(_))).count()
    }
}

/// Validated instruction sequences of a basic block set, parsed the first time
/// an entry is needed. Keyed by entry position in the set.
pub struct ParseCache<'i> {
    isa: &'i dyn Isa,
    blocks: BTreeMap<usize, BasicBlock>,
}

impl<'i> ParseCache<'i> {
    pub fn new(isa: &'i dyn Isa) -> Self {
        ParseCache { isa, blocks: BTreeMap::new() }
    }

    pub fn ensure(&mut self, idx: usize, entry: &EntryRow) -> Result<()> {
        if !self.blocks.contains_key(&idx) {
            let insns = self.isa.parse_validated_asm(&entry.asm).with_context(|| format!("basic block {}", entry.hex))?;
            self.blocks.insert(idx, self.isa.make_basic_block(insns));
        }
        Ok(())
    }

    pub fn get(&self, idx: usize) -> Option<&BasicBlock> {
        self.blocks.get(&idx)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Unsubsumed discoveries, fewest instructions first; ties keep insertion order.
pub fn rank_discoveries(discoveries: Vec<DiscoveryRow>) -> Vec<DiscoveryRow> {
    let mut ranked: Vec<DiscoveryRow> = discoveries.into_iter().filter(|d| d.subsumed_by.is_none()).collect();
    ranked.sort_by_key(|d| (d.num_insns, d.discovery));
    ranked
}

fn discovery_block(d: &DiscoveryRow) -> Result<AbstractBlock> {
    let ab = d.absblock.get("ab").ok_or_else(|| anyhow!("discovery {} has no abstract block", d.identifier))?;
    Ok(AbstractBlock::from_json(ab)?)
}

struct CampaignData<'d> {
    campaign_id: CampaignId,
    tools: BTreeSet<String>,
    ctx: Box<dyn AbstractionContext + 'd>,
    ranked: Vec<AbstractBlock>,
}

fn load_campaign<'d>(db: &Db, domain: &'d dyn AbstractionDomain, campaign_id: CampaignId) -> Result<CampaignData<'d>> {
    let row = db.campaign(campaign_id)?.ok_or_else(|| anyhow!("unknown campaign {campaign_id}"))?;
    let ctx = domain.context(&row.config)?;
    let ranked = rank_discoveries(db.discoveries_of_campaign(campaign_id)?).iter().map(discovery_block).collect::<Result<Vec<_>>>()?;
    Ok(CampaignData { campaign_id, tools: db.campaign_tools(campaign_id)?.into_iter().collect(), ctx, ranked })
}

struct BbsetData<'i> {
    bbset_id: BbsetId,
    tools: BTreeSet<String>,
    entries: Vec<EntryRow>,
    results: BTreeMap<EntryRef, ToolResults>,
    cache: ParseCache<'i>,
}

fn load_bbset<'i>(db: &Db, domain: &'i dyn AbstractionDomain, bbset_id: BbsetId) -> Result<BbsetData<'i>> {
    let row = db.bbset(bbset_id)?.ok_or_else(|| anyhow!("unknown basic block set {bbset_id}"))?;
    Ok(BbsetData {
        bbset_id,
        tools: db.bbset_tools(bbset_id)?.into_iter().collect(),
        entries: db.entries_of_bbset(bbset_id)?,
        results: db.bb_measurements_of_bbset(bbset_id)?,
        cache: ParseCache::new(domain.isa(&row.isa)?),
    })
}

/// Classifies, records and measures one pair. Runs inside the caller's transaction.
fn compute_pair(db: &Db, bbset: &mut BbsetData<'_>, campaign: &CampaignData<'_>, heuristic: bool) -> Result<PairOutcome> {
    let (bbset_id, campaign_id) = (bbset.bbset_id, campaign.campaign_id);
    if db.bbset_metrics_exists(bbset_id, campaign_id)? || db.interesting_exists(bbset_id, campaign_id)? {
        debug!(bbset_id, campaign_id, "coverage already computed");
        return Ok(PairOutcome::AlreadyComputed);
    }
    let missing: Vec<String> = campaign.tools.difference(&bbset.tools).cloned().collect();
    if !missing.is_empty() {
        warn!(bbset_id, campaign_id, missing = ?missing, "basic block set lacks measurements for campaign tools");
        return Ok(PairOutcome::MissingTools { missing });
    }

    let mut interesting = Vec::new();
    for (idx, entry) in bbset.entries.iter().enumerate() {
        let stored = bbset.results.get(&entry.entry);
        let results: ToolResults = campaign.tools.iter().map(|t| (t.clone(), stored.and_then(|r| r.get(t).copied().flatten()))).collect();
        if campaign.ctx.is_interesting(&results) {
            bbset.cache.ensure(idx, entry)?;
            interesting.push(idx);
        }
    }
    let refs: Vec<EntryRef> = interesting.iter().map(|i| bbset.entries[*i].entry).collect();
    db.bulk_mark_interesting(campaign_id, &refs)?;

    let blocks: Vec<&BasicBlock> = interesting.iter().filter_map(|i| bbset.cache.get(*i)).collect();
    let metrics = campaign.ctx.table_metrics(&campaign.ranked, &blocks, bbset.entries.len() as u64, heuristic);
    if !db.insert_bbset_metrics(bbset_id, campaign_id, &metrics)? {
        return Ok(PairOutcome::AlreadyComputed);
    }
    info!(
        bbset_id,
        campaign_id,
        interesting = metrics.num_bbs_interesting,
        covered = metrics.num_interesting_bbs_covered,
        covered_top10 = metrics.num_interesting_bbs_covered_top10,
        "computed coverage"
    );
    Ok(PairOutcome::Computed(metrics))
}

/// Computes coverage metrics for every (bbset, campaign) pair not computed
/// before. Empty id lists select everything in the store.
pub fn compute_bbset_coverage(db: &Db, domain: &dyn AbstractionDomain, campaign_ids: &[CampaignId], bbset_ids: &[BbsetId], heuristic: bool) -> Result<CoverageReport> {
    let campaign_ids = if campaign_ids.is_empty() { db.campaign_ids()? } else { campaign_ids.to_vec() };
    let bbset_ids = if bbset_ids.is_empty() { db.bbset_ids()? } else { bbset_ids.to_vec() };

    let campaigns = campaign_ids.iter().map(|id| load_campaign(db, domain, *id)).collect::<Result<Vec<_>>>()?;
    let mut report = CoverageReport::default();
    for bbset_id in bbset_ids {
        let mut bbset = load_bbset(db, domain, bbset_id)?;
        for campaign in &campaigns {
            let outcome = db.transaction(|| compute_pair(db, &mut bbset, campaign, heuristic))?;
            report.pairs.push(PairReport { bbset_id, campaign_id: campaign.campaign_id, outcome });
        }
        debug!(bbset_id, parsed = bbset.cache.len(), "finished basic block set");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use absdisc_core::catalog::CatalogDomain;
    use absdisc_core::{percent, ToolResults};

    const CATALOG: &str = r#"
schemes:
  - scheme: "nop"
    features: { mnemonic: nop }
    forms: [{ hex: "90", asm: "nop" }]
"#;

    fn entry(asm: &[&str]) -> EntryRow {
        let db = Db::open_in_memory().unwrap();
        let b = db.insert_bbset("s", "x86").unwrap();
        db.bulk_insert_entries(b, &[results_sqlite::NewEntry { hex: "90".into(), asm: asm.iter().map(|s| s.to_string()).collect(), measurements: ToolResults::new() }])
            .unwrap();
        db.entries_of_bbset(b).unwrap().remove(0)
    }

    #[test]
    fn cache_parses_on_demand() {
        let domain = CatalogDomain::from_yaml_str(CATALOG).unwrap();
        let mut cache = ParseCache::new(domain.isa("x86").unwrap());
        assert!(cache.is_empty());
        let e = entry(&["nop", "nop"]);
        cache.ensure(3, &e).unwrap();
        cache.ensure(3, &e).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(3).unwrap().len(), 2);
        assert!(cache.get(0).is_none());
        assert!(cache.ensure(4, &entry(&["hlt"])).is_err());
    }

    #[test]
    fn empty_corpus_percentages_are_zero() {
        assert_eq!(percent(0, 0), 0.0);
        let m = TableMetrics::from_counts(0, 0, 0, 0);
        assert_eq!(m.percent_bbs_interesting, 0.0);
        assert_eq!(m.percent_interesting_bbs_covered_top10, 0.0);
    }
}
