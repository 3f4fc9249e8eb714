use arrow::datatypes::{DataType, Field, Schema};

pub fn discoveries_schema() -> Schema {
    Schema::new(vec![
        Field::new("discovery_id", DataType::Int64, false),
        Field::new("campaign_id", DataType::Int64, false),
        Field::new("batch_index", DataType::Int64, false),
        Field::new("identifier", DataType::Utf8, false),
        Field::new("num_insns", DataType::Int64, false),
        Field::new("witness_len", DataType::Int64, false),
        Field::new("interestingness", DataType::Float64, true),
        Field::new("subsumed_by", DataType::Utf8, true),
        // null means infinitely general
        Field::new("generality", DataType::Int64, true),
        Field::new("remarks", DataType::Utf8, true),
    ])
}

pub fn bbset_metrics_schema() -> Schema {
    Schema::new(vec![
        Field::new("bbset_id", DataType::Int64, false),
        Field::new("campaign_id", DataType::Int64, false),
        Field::new("num_bbs_interesting", DataType::Int64, false),
        Field::new("percent_bbs_interesting", DataType::Float64, false),
        Field::new("num_interesting_bbs_covered", DataType::Int64, false),
        Field::new("percent_interesting_bbs_covered", DataType::Float64, false),
        Field::new("num_interesting_bbs_covered_top10", DataType::Int64, false),
        Field::new("percent_interesting_bbs_covered_top10", DataType::Float64, false),
    ])
}
