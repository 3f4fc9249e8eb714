use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rusqlite::{Connection, Row};
use std::path::Path;
use std::sync::Arc;

use crate::arrow_schemas;

const CHUNK: usize = 10_000;

/// Tables that can be exported, with the query producing columns in schema order.
pub const EXPORTABLE: &[&str] = &["discoveries", "bbset_metrics"];

fn table_query(table: &str) -> Result<(Schema, &'static str)> {
    Ok(match table {
        "discoveries" => (
            arrow_schemas::discoveries_schema(),
            "SELECT d.discovery_id,b.campaign_id,b.batch_index,d.identifier,d.num_insns,d.witness_len,d.interestingness,d.subsumed_by,d.generality,d.remarks
             FROM discoveries d JOIN discovery_batches b ON b.batch_id=d.batch_id ORDER BY d.discovery_id",
        ),
        "bbset_metrics" => (
            arrow_schemas::bbset_metrics_schema(),
            "SELECT bbset_id,campaign_id,num_bbs_interesting,percent_bbs_interesting,num_interesting_bbs_covered,percent_interesting_bbs_covered,num_interesting_bbs_covered_top10,percent_interesting_bbs_covered_top10
             FROM bbset_metrics ORDER BY bbset_id,campaign_id",
        ),
        other => bail!("unsupported table: {other} (expected one of {})", EXPORTABLE.join(", ")),
    })
}

/// Writes `table` to a ZSTD-compressed parquet file; returns the number of rows.
pub fn export_table_to_parquet(conn: &Connection, table: &str, out: &Path) -> Result<usize> {
    let (schema, sql) = table_query(table)?;
    let schema = Arc::new(schema);
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let file = std::fs::File::create(out).with_context(|| format!("creating {}", out.display()))?;

    let props = WriterProperties::builder().set_compression(Compression::ZSTD(ZstdLevel::default())).build();
    let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;

    let mut total = 0;
    loop {
        let mut batch = ColumnBatch::new(&schema)?;
        let mut count = 0;
        while count < CHUNK {
            let Some(row) = rows.next()? else { break };
            batch.push(row)?;
            count += 1;
        }
        if count == 0 {
            break;
        }
        let rb = RecordBatch::try_new(schema.clone(), batch.finish())?;
        writer.write(&rb)?;
        total += count;
    }

    writer.close()?;
    tracing::info!(table, rows = total, out = %out.display(), "exported parquet");
    Ok(total)
}

enum Column {
    Int(Int64Builder),
    Float(Float64Builder),
    Text(StringBuilder),
}

struct ColumnBatch {
    columns: Vec<Column>,
}

impl ColumnBatch {
    fn new(schema: &Schema) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|f| {
                Ok(match f.data_type() {
                    DataType::Int64 => Column::Int(Int64Builder::new()),
                    DataType::Float64 => Column::Float(Float64Builder::new()),
                    DataType::Utf8 => Column::Text(StringBuilder::new()),
                    other => bail!("column {} has unsupported type {other}", f.name()),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ColumnBatch { columns })
    }

    // nullability is enforced by RecordBatch::try_new against the schema
    fn push(&mut self, row: &Row) -> Result<()> {
        for (i, col) in self.columns.iter_mut().enumerate() {
            match col {
                Column::Int(b) => b.append_option(row.get::<_, Option<i64>>(i)?),
                Column::Float(b) => b.append_option(row.get::<_, Option<f64>>(i)?),
                Column::Text(b) => b.append_option(row.get::<_, Option<String>>(i)?),
            }
        }
        Ok(())
    }

    fn finish(self) -> Vec<ArrayRef> {
        self.columns
            .into_iter()
            .map(|col| -> ArrayRef {
                match col {
                    Column::Int(mut b) => Arc::new(b.finish()),
                    Column::Float(mut b) => Arc::new(b.finish()),
                    Column::Text(mut b) => Arc::new(b.finish()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Db;
    use absdisc_core::TableMetrics;
    use serde_json::json;

    #[test]
    fn exports_metrics_rows() {
        let db = Db::open_in_memory().unwrap();
        let c = db
            .insert_campaign(&crate::NewCampaign {
                tag: "t".into(),
                config: json!({}),
                termination: json!({}),
                date: String::new(),
                host_pc: String::new(),
                total_seconds: 0,
                restrict_to_supported_insns: false,
                witness_path: "/w".into(),
            })
            .unwrap();
        let b = db.insert_bbset("set", "x86").unwrap();
        db.insert_bbset_metrics(b, c, &TableMetrics::from_counts(2, 1, 1, 1)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("m.parquet");
        assert_eq!(export_table_to_parquet(&db.conn, "bbset_metrics", &out).unwrap(), 1);
        assert!(std::fs::metadata(&out).unwrap().len() > 0);
        assert_eq!(export_table_to_parquet(&db.conn, "discoveries", &dir.path().join("d.parquet")).unwrap(), 0);
    }

    #[test]
    fn unknown_table_is_rejected() {
        let db = Db::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(export_table_to_parquet(&db.conn, "tools", &dir.path().join("x.parquet")).is_err());
    }
}
