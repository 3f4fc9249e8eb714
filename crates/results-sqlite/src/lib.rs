mod open;
mod models;
mod insert;
mod query;
mod schema;
pub mod arrow_schemas;
pub mod export_parquet;

pub use open::Db;
pub use models::*;
pub use schema::TABLES;
pub use insert::MAX_SCHEME_LEN;
