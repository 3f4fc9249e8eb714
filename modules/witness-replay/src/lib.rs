//! Replays the recorded expansion history of a discovery into a row-structured graph.

mod error;
mod graph;
mod render;
mod replay;
mod trace;

pub use error::ReplayError;
pub use graph::{Node, NodeId, NodeKind, WitnessGraph};
pub use render::block_label;
pub use replay::{replay, witnessing_series};
pub use trace::{SeriesRef, WitnessRecord, WitnessTrace};
