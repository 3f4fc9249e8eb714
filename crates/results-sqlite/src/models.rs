use absdisc_core::{Generality, TableMetrics, ToolResults};
use serde::Serialize;
use serde_json::Value;

pub type CampaignId = i64;
pub type ToolId = i64;
pub type SchemeId = i64;
pub type BbsetId = i64;
pub type GeneralizationId = i64;

// Row references below carry identifiers assigned by the store. They are only
// constructed from query results, so a child row can never be written against a
// parent id that was not yet generated (no forward references).

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BatchRef(pub(crate) i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DiscoveryRef(pub(crate) i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntryRef(pub(crate) i64);

impl BatchRef {
    pub fn id(self) -> i64 { self.0 }
}

impl DiscoveryRef {
    pub fn id(self) -> i64 { self.0 }
}

impl EntryRef {
    pub fn id(self) -> i64 { self.0 }
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub tag: String,
    pub config: Value,
    pub termination: Value,
    pub date: String,
    pub host_pc: String,
    pub total_seconds: i64,
    pub restrict_to_supported_insns: bool,
    pub witness_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignRow {
    pub campaign_id: CampaignId,
    pub tag: String,
    pub config: Value,
    pub termination: Value,
    pub date: String,
    pub host_pc: String,
    pub total_seconds: i64,
    pub restrict_to_supported_insns: bool,
    pub witness_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignSummary {
    pub campaign_id: CampaignId,
    pub tag: String,
    pub date: String,
    pub host_pc: String,
    pub tools: Vec<String>,
    pub num_batches: i64,
    pub num_discoveries: i64,
    /// `num_interesting / num_sampled` of the first batch.
    pub init_interesting_sample_ratio: Option<f64>,
    pub total_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct NewBatch {
    pub batch_index: i64,
    pub num_sampled: i64,
    pub num_interesting: i64,
    pub batch_time: i64,
}

#[derive(Debug, Clone)]
pub struct BatchRow {
    pub batch: BatchRef,
    pub batch_index: i64,
    pub num_sampled: i64,
    pub num_interesting: i64,
    pub batch_time: i64,
}

#[derive(Debug, Clone)]
pub struct NewDiscovery {
    pub batch: BatchRef,
    pub identifier: String,
    pub absblock: Value,
    pub num_insns: i64,
    pub witness_len: i64,
    pub interestingness: Option<f64>,
    pub subsumed_by: Option<String>,
    pub generality: Generality,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryRow {
    pub discovery: DiscoveryRef,
    pub batch: BatchRef,
    pub identifier: String,
    pub absblock: Value,
    pub num_insns: i64,
    pub witness_len: i64,
    pub interestingness: Option<f64>,
    pub subsumed_by: Option<String>,
    pub generality: Generality,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewGeneralization {
    pub identifier: Option<String>,
    pub absblock: Value,
    pub witness_file: String,
    pub witness_len: i64,
    pub interestingness: Option<f64>,
    pub generality: Generality,
    pub remarks: Option<String>,
    pub num_insns: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneralizationRow {
    pub generalization_id: GeneralizationId,
    pub identifier: Option<String>,
    pub absblock: Value,
    pub witness_file: String,
    pub witness_len: i64,
    pub interestingness: Option<f64>,
    #[serde(skip)]
    pub generality: Generality,
    pub remarks: Option<String>,
    pub num_insns: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BbsetRow {
    pub bbset_id: BbsetId,
    pub identifier: String,
    pub isa: String,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub hex: String,
    pub asm: Vec<String>,
    pub measurements: ToolResults,
}

#[derive(Debug, Clone)]
pub struct EntryRow {
    pub entry: EntryRef,
    pub hex: String,
    pub asm: Vec<String>,
    pub measurements: ToolResults,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsRow {
    pub bbset_id: BbsetId,
    pub campaign_id: CampaignId,
    #[serde(flatten)]
    pub metrics: TableMetrics,
}
