//! Import of discovery campaign artifacts into the results store.

mod bbset;
mod campaign;
pub mod discovery;
mod error;
pub mod files;
mod generalization;
pub mod metrics;

pub use bbset::{import_basic_block_set, BB_COLUMN};
pub use campaign::{import_campaign, ImportOutcome};
pub use error::ImportError;
pub use generalization::import_generalization;
pub use metrics::{add_metrics, ExternalMetricsCommand, JsonSeriesFile, MetricsStep, NativeMetrics, NoMetrics, SeriesSource};
