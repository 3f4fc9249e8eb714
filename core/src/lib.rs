//! Core domain types shared by the importer, the coverage analyzer and the witness replayer.

pub mod absblock;
pub mod catalog;
pub mod error;
pub mod generality;
pub mod json_tree;
pub mod oracle;
pub mod relaxed_json;
pub mod remarks;

pub use absblock::{AbstractBlock, AbstractInsn, AliasConstraint, AliasState, Expansion, FeatureValue, Features, OperandRef};
pub use error::DomainError;
pub use generality::{analyze_schemes, Generality, SchemeAnalysis};
pub use oracle::{percent, AbstractionContext, AbstractionDomain, BasicBlock, Instruction, Isa, TableMetrics, ToolResults, TOP_DISCOVERIES};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
