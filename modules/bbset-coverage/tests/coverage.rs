use absdisc_core::catalog::CatalogDomain;
use absdisc_core::{AbstractBlock, AbstractionContext, AbstractionDomain, BasicBlock, DomainError, Features, Generality, Isa, TableMetrics, ToolResults};
use bbset_coverage::{compute_bbset_coverage, rank_discoveries, PairOutcome};
use campaign_import::import_basic_block_set;
use results_sqlite::{CampaignId, Db, NewBatch, NewCampaign, NewDiscovery};
use serde_json::{json, Value};
use std::collections::BTreeSet;

const CATALOG: &str = r#"
isa: x86
schemes:
  - scheme: "add R64, R64"
    features: { mnemonic: add }
    forms: [{ hex: "4801c8", asm: "add rax, rcx" }]
  - scheme: "sub R64, R64"
    features: { mnemonic: sub }
    forms: [{ hex: "4829c8", asm: "sub rax, rcx" }]
  - scheme: "nop"
    features: { mnemonic: nop }
    forms: [{ hex: "90", asm: "nop" }]
"#;

/// Catalog domain whose blocks are interesting exactly when tool A is slower than tool B.
struct SlowerA(CatalogDomain);

struct SlowerACtx<'a>(Box<dyn AbstractionContext + 'a>);

impl AbstractionContext for SlowerACtx<'_> {
    fn feasible_schemes(&self, features: &Features) -> BTreeSet<String> {
        self.0.feasible_schemes(features)
    }

    fn compute_interestingness(&self, results: &ToolResults) -> f64 {
        self.0.compute_interestingness(results)
    }

    fn is_interesting(&self, results: &ToolResults) -> bool {
        matches!((results.get("A"), results.get("B")), (Some(Some(a)), Some(Some(b))) if a > b)
    }

    fn subsumes(&self, general: &AbstractBlock, specific: &AbstractBlock) -> bool {
        self.0.subsumes(general, specific)
    }

    fn table_metrics(&self, ranked: &[AbstractBlock], interesting: &[&BasicBlock], total: u64, heuristic: bool) -> TableMetrics {
        self.0.table_metrics(ranked, interesting, total, heuristic)
    }
}

impl AbstractionDomain for SlowerA {
    fn context(&self, config: &Value) -> Result<Box<dyn AbstractionContext + '_>, DomainError> {
        Ok(Box::new(SlowerACtx(self.0.context(config)?)))
    }

    fn isa(&self, name: &str) -> Result<&dyn Isa, DomainError> {
        self.0.isa(name)
    }
}

fn domain() -> SlowerA {
    SlowerA(CatalogDomain::from_yaml_str(CATALOG).unwrap())
}

fn campaign(db: &Db, witness_path: &str, tools: &[&str], discoveries: &[(&str, Value, Option<&str>)]) -> CampaignId {
    let id = db
        .insert_campaign(&NewCampaign {
            tag: "t".into(),
            config: json!({}),
            termination: json!({}),
            date: "2021-09-01T00:00:00".into(),
            host_pc: "pc".into(),
            total_seconds: 1,
            restrict_to_supported_insns: false,
            witness_path: witness_path.into(),
        })
        .unwrap();
    for t in tools {
        let tool = db.upsert_tool(t).unwrap();
        db.link_campaign_tool(id, tool).unwrap();
    }
    db.bulk_insert_batches(id, &[NewBatch { batch_index: 0, num_sampled: 1, num_interesting: 1, batch_time: 1 }]).unwrap();
    let batch = db.batches_of_campaign(id).unwrap()[0].batch;
    let rows: Vec<NewDiscovery> = discoveries
        .iter()
        .map(|(ident, ab, subsumed_by)| NewDiscovery {
            batch,
            identifier: ident.to_string(),
            num_insns: ab["abs_insns"].as_array().map_or(0, |a| a.len() as i64),
            absblock: json!({ "ab": ab }),
            witness_len: 1,
            interestingness: None,
            subsumed_by: subsumed_by.map(str::to_string),
            generality: Generality::Infinite,
            remarks: None,
        })
        .collect();
    db.bulk_insert_discoveries(&rows).unwrap();
    id
}

fn insn(mnemonic: &str) -> Value {
    json!({"features": {"mnemonic": mnemonic}})
}

/// Three blocks, tools A and B; the first and last are interesting.
fn corpus(db: &Db, d: &SlowerA) -> i64 {
    let tmp = tempfile::tempdir().unwrap();
    let csv = tmp.path().join("bbs.csv");
    std::fs::write(&csv, "bb,A,B\n4801c8,2.0,1.0\n90,1.0,1.0\n4829c8,3.0,1.5\n").unwrap();
    import_basic_block_set(db, d, "x86", "corpus", &csv).unwrap()
}

#[test]
fn three_block_corpus_with_a_slower_than_b() {
    let db = Db::open_in_memory().unwrap();
    let d = domain();
    let bbset = corpus(&db, &d);
    let c = campaign(&db, "/c1", &["A", "B"], &[("d0", json!({"abs_insns": [insn("add")]}), None)]);

    let report = compute_bbset_coverage(&db, &d, &[], &[], false).unwrap();
    assert_eq!(report.pairs.len(), 1);
    let expected = TableMetrics::from_counts(3, 2, 1, 1);
    assert_eq!(report.pairs[0].outcome, PairOutcome::Computed(expected));
    assert!((expected.percent_bbs_interesting - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(expected.percent_interesting_bbs_covered, 50.0);

    let interesting = db.interesting_entries(bbset, c).unwrap();
    let entries = db.entries_of_bbset(bbset).unwrap();
    assert_eq!(interesting, vec![entries[0].entry, entries[2].entry]);
    assert_eq!(db.bbset_metrics(bbset, c).unwrap().unwrap().metrics, expected);
}

#[test]
fn second_sweep_writes_nothing() {
    let db = Db::open_in_memory().unwrap();
    let d = domain();
    corpus(&db, &d);
    campaign(&db, "/c1", &["A", "B"], &[("d0", json!({"abs_insns": [insn("sub")]}), None)]);

    let first = compute_bbset_coverage(&db, &d, &[], &[], false).unwrap();
    assert_eq!(first.computed(), 1);
    let before = db.row_counts().unwrap();
    let second = compute_bbset_coverage(&db, &d, &[], &[], true).unwrap();
    assert_eq!(second.computed(), 0);
    assert_eq!(second.pairs[0].outcome, PairOutcome::AlreadyComputed);
    assert_eq!(db.row_counts().unwrap(), before);
    assert_eq!(before["bbset_metrics"], 1);
}

#[test]
fn campaign_tools_without_data_are_reported() {
    let db = Db::open_in_memory().unwrap();
    let d = domain();
    let bbset = corpus(&db, &d);
    let c = campaign(&db, "/c1", &["A", "C"], &[]);
    let before = db.row_counts().unwrap();

    let report = compute_bbset_coverage(&db, &d, &[c], &[bbset], false).unwrap();
    assert_eq!(report.pairs[0].outcome, PairOutcome::MissingTools { missing: vec!["C".to_string()] });
    assert_eq!(db.row_counts().unwrap(), before);
}

#[test]
fn subsumed_discoveries_do_not_count() {
    let db = Db::open_in_memory().unwrap();
    let d = domain();
    corpus(&db, &d);
    // only the subsumed discovery would cover the `sub` block
    campaign(
        &db,
        "/c1",
        &["A", "B"],
        &[("d0", json!({"abs_insns": [insn("add")]}), None), ("d1", json!({"abs_insns": [insn("sub")]}), Some("d0"))],
    );
    let report = compute_bbset_coverage(&db, &d, &[], &[], false).unwrap();
    assert_eq!(report.pairs[0].outcome, PairOutcome::Computed(TableMetrics::from_counts(3, 2, 1, 1)));
}

#[test]
fn ranking_orders_by_size_and_drops_subsumed() {
    let db = Db::open_in_memory().unwrap();
    let c = campaign(
        &db,
        "/c1",
        &[],
        &[
            ("long", json!({"abs_insns": [insn("add"), insn("sub"), insn("nop")]}), None),
            ("short", json!({"abs_insns": [insn("nop")]}), None),
            ("gone", json!({"abs_insns": []}), Some("short")),
            ("pair", json!({"abs_insns": [insn("add"), insn("sub")]}), None),
            ("short2", json!({"abs_insns": [insn("add")]}), None),
        ],
    );
    let ranked = rank_discoveries(db.discoveries_of_campaign(c).unwrap());
    let names: Vec<&str> = ranked.iter().map(|d| d.identifier.as_str()).collect();
    assert_eq!(names, vec!["short", "short2", "pair", "long"]);
    assert!(ranked.windows(2).all(|w| w[0].num_insns <= w[1].num_insns));
}

#[test]
fn top_ten_only_counts_the_best_ranked() {
    let db = Db::open_in_memory().unwrap();
    let d = domain();
    corpus(&db, &d);
    // ten single `nop` discoveries outrank the two-instruction `add` one
    let mut discoveries: Vec<(String, Value, Option<&str>)> = (0..10).map(|i| (format!("n{i}"), json!({"abs_insns": [insn("nop")]}), None)).collect();
    discoveries.push(("add".into(), json!({"abs_insns": [insn("add"), insn("add")]}), None));
    discoveries.push(("sub".into(), json!({"abs_insns": [insn("sub")]}), None));
    let refs: Vec<(&str, Value, Option<&str>)> = discoveries.iter().map(|(n, v, s)| (n.as_str(), v.clone(), *s)).collect();
    campaign(&db, "/c1", &["A", "B"], &refs);

    let report = compute_bbset_coverage(&db, &d, &[], &[], true).unwrap();
    // heuristic mode: the `add` block is covered by the `add, add` discovery at rank 11
    assert_eq!(report.pairs[0].outcome, PairOutcome::Computed(TableMetrics::from_counts(3, 2, 2, 0)));
}
