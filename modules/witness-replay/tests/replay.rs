use absdisc_core::catalog::CatalogDomain;
use absdisc_core::DomainError;
use serde_json::{json, Value};
use witness_replay::{replay, witnessing_series, NodeKind, ReplayError, SeriesRef, WitnessTrace};

const CATALOG: &str = r#"
schemes:
  - scheme: "add R64, R64"
    features: { mnemonic: add, width: "64" }
  - scheme: "add R32, R32"
    features: { mnemonic: add, width: "32" }
  - scheme: "sub R64, R64"
    features: { mnemonic: sub, width: "64" }
  - scheme: "nop"
    features: { mnemonic: nop }
"#;

fn domain() -> CatalogDomain {
    CatalogDomain::from_yaml_str(CATALOG).unwrap()
}

fn feature(insn: usize, name: &str, value: Value) -> Value {
    json!({"feature": {"insn": insn, "name": name, "value": value}})
}

/// Two accepted refinements, each after one rejected candidate.
fn steps() -> Vec<Value> {
    vec![
        json!({"expansion": feature(0, "mnemonic", json!(["add", "sub"])), "taken": false, "terminate": false, "measurements": 1}),
        json!({"expansion": feature(0, "mnemonic", json!("add")), "taken": true, "terminate": false}),
        json!({"expansion": feature(1, "mnemonic", json!("sub")), "taken": false, "terminate": false, "measurements": "s2"}),
        json!({"expansion": {"alias": {"first": [0, 0], "second": [1, 0], "state": "must"}}, "taken": true, "terminate": false, "measurements": 4}),
    ]
}

fn trace(records: Vec<Value>) -> WitnessTrace {
    WitnessTrace::from_json(json!({
        "config": {"interestingness_metric": {"min_interestingness": 0.1}},
        "start": {"abs_insns": [{"features": {}}, {"features": {}}]},
        "trace": records
    }))
    .unwrap()
}

#[test]
fn two_taken_steps_give_three_rows() {
    let t = trace(steps());
    assert_eq!(t.taken_steps(), 2);
    let g = replay(&domain(), &t).unwrap();
    assert_eq!(g.rows().len(), 3);
    assert_eq!(g.row_boundaries(), t.taken_steps() + 1);
    assert_eq!(g.rows()[0], vec![0]);
    assert_eq!(g.rows()[1], vec![1, 2]);
    assert_eq!(g.rows()[2], vec![3, 4]);
    assert_eq!(g.node(0).unwrap().kind, NodeKind::Start);
    let kinds: Vec<NodeKind> = g.nodes().iter().map(|n| n.kind).collect();
    assert_eq!(kinds[1..], [NodeKind::NotInteresting, NodeKind::Interesting, NodeKind::NotInteresting, NodeKind::Interesting]);
}

#[test]
fn interesting_nodes_refine_their_parent() {
    let g = replay(&domain(), &trace(steps())).unwrap();
    for node in g.nodes().iter().filter(|n| n.kind == NodeKind::Interesting) {
        let parent = g.node(g.parent_of(node.id).unwrap()).unwrap();
        let (before, after) = (parent.block.as_ref().unwrap(), node.block.as_ref().unwrap());
        assert!(before.is_refined_by(after), "node {} does not refine {}", node.id, parent.id);
    }
    // rejected candidates hang off the block they were tried on
    assert_eq!(g.parent_of(1), Some(0));
    assert_eq!(g.parent_of(3), Some(2));
    assert!(g.node(2).unwrap().label.contains("**mnemonic: add**"));
}

#[test]
fn series_links_are_inherited() {
    let t = trace(steps());
    let g = replay(&domain(), &t).unwrap();
    let series: Vec<Option<SeriesRef>> = g.nodes().iter().map(|n| n.series.clone()).collect();
    assert_eq!(
        series,
        vec![None, Some(SeriesRef::Id(1)), Some(SeriesRef::Id(1)), Some(SeriesRef::Name("s2".into())), Some(SeriesRef::Id(4))]
    );
    assert_eq!(witnessing_series(&t), Some(&SeriesRef::Id(4)));
}

#[test]
fn termination_adds_an_end_row() {
    let mut records = steps();
    records.push(json!({"expansion": null, "taken": false, "terminate": true, "comment": "no more expansions"}));
    let g = replay(&domain(), &trace(records)).unwrap();
    assert_eq!(g.rows().len(), 4);
    assert_eq!(g.row_boundaries(), 3);
    let end = g.nodes().last().unwrap();
    assert_eq!(end.kind, NodeKind::End);
    assert_eq!(end.label, "Terminated: no more expansions");
    assert_eq!(end.series, Some(SeriesRef::Id(4)));
    assert_eq!(g.parent_of(end.id), Some(4));
    assert!(end.block.is_none());
}

#[test]
fn non_refining_step_is_rejected() {
    let mut records = steps();
    records.push(json!({"expansion": feature(0, "mnemonic", json!("add")), "taken": true}));
    let err = replay(&domain(), &trace(records)).unwrap_err();
    assert!(matches!(err, ReplayError::Step { step: 4, source: DomainError::NonRefiningExpansion(_) }), "{err}");
}

#[test]
fn trace_without_series_has_no_witness() {
    let t = trace(vec![json!({"expansion": feature(1, "mnemonic", json!("nop")), "taken": true})]);
    assert_eq!(witnessing_series(&t), None);
    assert_eq!(replay(&domain(), &t).unwrap().rows().len(), 2);
}

#[test]
fn nested_trace_file_with_non_finite_config() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("d0.json");
    let records = serde_json::to_string(&steps()).unwrap();
    let text = format!(
        r#"{{"config": {{"interestingness_metric": {{"max_interestingness": Infinity}}}},
            "trace": {{"start": {{"abs_insns": [{{"features": {{}}}}, {{"features": {{}}}}]}}, "trace": {records}}}}}"#
    );
    std::fs::write(&path, text).unwrap();

    let t = WitnessTrace::load(&path).unwrap();
    assert_eq!(t.trace.len(), 4);
    assert_eq!(t.start.len(), 2);
    assert_eq!(t.config["interestingness_metric"]["max_interestingness"], "inf");
    let g = replay(&domain(), &t).unwrap();
    assert!(g.to_text().starts_with("== row 0 ==\n#0 Start"));
}

#[test]
fn labels_count_schemes_under_the_trace_config() {
    let g = replay(&domain(), &trace(steps())).unwrap();
    assert_eq!(g.node(0).unwrap().label, "0: TOP (4)\n1: TOP (4)");
    assert_eq!(g.node(1).unwrap().label, "0: **mnemonic: {add, sub}** (3)\n1: TOP (4)");
    assert!(g.node(2).unwrap().label.starts_with("0: **mnemonic: add** (2)"));

    let bad = WitnessTrace::from_json(json!({
        "config": {"interestingness_metric": {"min_interestingness": -1}},
        "start": {"abs_insns": []},
        "trace": []
    }))
    .unwrap();
    assert!(matches!(replay(&domain(), &bad), Err(ReplayError::Domain(DomainError::Config(_)))));
}
