use crate::discovery::{analyze_discovery, AnalyzedDiscovery};
use crate::files::{canonical_path, load_json, load_json_as, parse_start_date, CampaignConfig, Report, CAMPAIGN_CONFIG_FILE, DISCOVERY_DIR, REPORT_FILE, WITNESS_DIR};
use crate::metrics::{load_metrics, MetricsMap, MetricsStep};
use absdisc_core::AbstractionDomain;
use anyhow::{Context, Result};
use results_sqlite::{BatchRef, CampaignId, Db, DiscoveryRef, NewBatch, NewCampaign, NewDiscovery};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported { campaign_id: CampaignId, batches: usize, discoveries: usize },
    /// A campaign with the same witness directory is already stored.
    Skipped { existing: CampaignId },
}

struct PendingDiscovery {
    identifier: String,
    witness_len: i64,
    analyzed: AnalyzedDiscovery,
}

/// Imports one campaign directory in a single transaction.
pub fn import_campaign(db: &Db, domain: &dyn AbstractionDomain, metrics_step: &dyn MetricsStep, tag: &str, campaign_dir: &Path) -> Result<ImportOutcome> {
    let config: CampaignConfig = load_json_as(&campaign_dir.join(CAMPAIGN_CONFIG_FILE))?;
    let report: Report = load_json_as(&campaign_dir.join(REPORT_FILE))?;
    let witness_path = canonical_path(&campaign_dir.join(WITNESS_DIR))?.to_string_lossy().into_owned();

    if let Some(existing) = db.campaign_by_witness_path(&witness_path)? {
        info!(campaign_id = existing, witness_path = %witness_path, "campaign already imported, skipping");
        return Ok(ImportOutcome::Skipped { existing });
    }

    let date = parse_start_date(&report.start_date)?;
    let metrics = match load_metrics(campaign_dir)? {
        Some(m) => m,
        None => {
            metrics_step.ensure(campaign_dir).with_context(|| format!("producing metrics for {}", campaign_dir.display()))?;
            load_metrics(campaign_dir)?.unwrap_or_default()
        }
    };

    let outcome = db.transaction(|| {
        // repeated under the write lock so concurrent importers cannot both pass it
        if let Some(existing) = db.campaign_by_witness_path(&witness_path)? {
            return Ok(ImportOutcome::Skipped { existing });
        }

        let campaign_id = db.insert_campaign(&NewCampaign {
            tag: tag.to_string(),
            config: config.abstraction_config.clone(),
            termination: config.termination.clone(),
            date: date.clone(),
            host_pc: report.host_pc.clone(),
            total_seconds: report.seconds_passed,
            restrict_to_supported_insns: config.restrict_to_supported_insns,
            witness_path: witness_path.clone(),
        })?;
        for name in &config.predictors {
            let tool_id = db.upsert_tool(name)?;
            db.link_campaign_tool(campaign_id, tool_id)?;
        }

        let new_batches: Vec<NewBatch> = report
            .per_batch_stats
            .iter()
            .enumerate()
            .map(|(i, b)| NewBatch { batch_index: i as i64, num_sampled: b.num_sampled, num_interesting: b.num_interesting, batch_time: b.batch_time })
            .collect();
        db.bulk_insert_batches(campaign_id, &new_batches)?;
        let batches = db.batches_of_campaign(campaign_id)?;

        let campaign_ctx = domain.context(&config.abstraction_config)?;
        let mut per_batch: Vec<(BatchRef, Vec<PendingDiscovery>)> = Vec::with_capacity(batches.len());
        for (stats, batch) in report.per_batch_stats.iter().zip(&batches) {
            let mut seen = BTreeSet::new();
            let mut pending = Vec::new();
            for gen in stats.per_interesting_sample_stats.iter().flat_map(|s| &s.per_generalization_stats) {
                let path = campaign_dir.join(DISCOVERY_DIR).join(format!("{}.json", gen.id));
                if !path.exists() {
                    debug!(discovery = %gen.id, "discovery file missing, skipping");
                    continue;
                }
                if !seen.insert(gen.id.clone()) {
                    debug!(discovery = %gen.id, batch = batch.batch_index, "discovery listed twice in batch");
                    continue;
                }
                let analyzed = analyze_discovery(domain, campaign_ctx.as_ref(), &gen.id, load_json(&path)?)?;
                pending.push(PendingDiscovery { identifier: gen.id.clone(), witness_len: gen.witness_len, analyzed });
            }
            per_batch.push((batch.batch, pending));
        }

        let discoveries = store_discoveries(db, campaign_id, &per_batch, &metrics)?;
        info!(campaign_id, tag, batches = batches.len(), discoveries, "imported campaign");
        Ok(ImportOutcome::Imported { campaign_id, batches: batches.len(), discoveries })
    })?;
    Ok(outcome)
}

/// Bulk-writes the discoveries, then their schemes and measurements against the re-fetched rows.
fn store_discoveries(db: &Db, campaign_id: CampaignId, per_batch: &[(BatchRef, Vec<PendingDiscovery>)], metrics: &MetricsMap) -> Result<usize> {
    let mut used_schemes = BTreeSet::new();
    let mut schemes_of: BTreeMap<(BatchRef, &str), &BTreeSet<String>> = BTreeMap::new();
    let mut new_discoveries = Vec::new();
    for (batch, pending) in per_batch {
        for p in pending {
            let m = metrics.get(&p.identifier);
            used_schemes.extend(p.analyzed.analysis.schemes.iter().cloned());
            schemes_of.insert((*batch, p.identifier.as_str()), &p.analyzed.analysis.schemes);
            new_discoveries.push(NewDiscovery {
                batch: *batch,
                identifier: p.identifier.clone(),
                absblock: p.analyzed.blob.clone(),
                num_insns: p.analyzed.num_insns,
                witness_len: p.witness_len,
                interestingness: m.and_then(|m| m.mean_interestingness),
                subsumed_by: m.and_then(|m| m.subsumed_by.clone()),
                generality: p.analyzed.analysis.generality,
                remarks: p.analyzed.remarks.clone(),
            });
        }
    }
    db.bulk_insert_discoveries(&new_discoveries)?;
    let stored: Vec<(DiscoveryRef, BatchRef, String)> =
        db.discoveries_of_campaign(campaign_id)?.into_iter().map(|d| (d.discovery, d.batch, d.identifier)).collect();

    let added = db.insert_missing_schemes(&used_schemes)?;
    debug!(campaign_id, used = used_schemes.len(), added, "instruction schemes");
    let scheme_ids = db.all_scheme_ids()?;

    let mut links = Vec::new();
    let mut measurements = Vec::new();
    for (discovery, batch, identifier) in &stored {
        if let Some(schemes) = schemes_of.get(&(*batch, identifier.as_str())) {
            for s in schemes.iter() {
                if let Some(id) = scheme_ids.get(s) {
                    links.push((*discovery, *id));
                }
            }
        }
        if let Some(m) = metrics.get(identifier) {
            measurements.extend(m.interestingness_series.iter().filter(|v| !v.is_nan()).map(|v| (*discovery, *v)));
        }
    }
    db.bulk_link_discovery_schemes(&links)?;
    db.bulk_insert_measurements(&measurements)?;
    Ok(stored.len())
}
