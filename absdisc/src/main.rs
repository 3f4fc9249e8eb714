use absdisc_core::catalog::CatalogDomain;
use absdisc_core::AbstractionDomain;
use anyhow::{anyhow, bail, Context, Result};
use bbset_coverage::compute_bbset_coverage;
use campaign_import::metrics::MetricsStep;
use campaign_import::{
    add_metrics, import_basic_block_set, import_campaign, import_generalization, ExternalMetricsCommand, ImportOutcome, JsonSeriesFile, NativeMetrics, NoMetrics,
};
use clap::{Parser, Subcommand, ValueEnum};
use results_sqlite::export_parquet::{export_table_to_parquet, EXPORTABLE};
use results_sqlite::{CampaignId, Db};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use witness_replay::{replay, witnessing_series, WitnessTrace};

mod config;

const DEFAULT_DB: &str = "absdisc.sqlite3";
const DEFAULT_ISA: &str = "x86";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Parser)]
#[command(name = "absdisc", version, about = "Import, analyze and replay instruction abstraction discovery campaigns")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./absdisc.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite results database
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Instruction scheme catalog (YAML or JSON)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Import campaign directories (campaign_config.json, report.json, discoveries/)
    ImportCampaign {
        /// Tag stored with every imported campaign
        tag: String,
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Import a CSV of hex encoded basic blocks with one measurement column per tool
    ImportBbset {
        /// ISA name used to decode the blocks
        #[arg(long)]
        isa: Option<String>,
        identifier: String,
        csv: PathBuf,
    },
    /// Import standalone generalization results (discovery.json, infos.json)
    ImportGeneralization {
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Compute coverage metrics for (basic block set, campaign) pairs; all pairs by default
    ComputeCoverage {
        #[arg(long, num_args = 1..)]
        campaigns: Vec<i64>,
        #[arg(long, num_args = 1..)]
        bbsets: Vec<i64>,
        /// Order- and aliasing-insensitive coverage check
        #[arg(long, default_value_t = false)]
        heuristic: bool,
    },
    /// Produce metrics.json for campaign directories
    AddMetrics {
        /// Measurement series file; computes the metrics in process
        #[arg(long, value_name = "FILE")]
        series: Option<PathBuf>,
        /// Recompute even if metrics.json exists
        #[arg(long, default_value_t = false)]
        overwrite: bool,
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },
    /// Replay the witness trace of a discovery
    Witness {
        /// Trace file
        #[arg(conflicts_with_all = ["campaign", "discovery"], required_unless_present = "campaign")]
        trace: Option<PathBuf>,
        /// Campaign of the discovery (requires --discovery)
        #[arg(long, requires = "discovery")]
        campaign: Option<i64>,
        /// Discovery identifier within the campaign
        #[arg(long, requires = "campaign")]
        discovery: Option<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Summaries of all stored campaigns (JSON lines)
    Campaigns,
    /// Export a table to Parquet
    Export {
        #[arg(long, value_parser = EXPORTABLE.to_vec())]
        table: String,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

fn init_logging() {
    // ABSDISC_LOG_FORMAT=json switches to one JSON object per event.
    let log_format = std::env::var("ABSDISC_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "absdisc=info,campaign_import=info,bbset_coverage=info,witness_replay=info".into());
    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Milliseconds since `started`, saturating instead of wrapping.
fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

struct Settings {
    cfg: config::Config,
    db: PathBuf,
    catalog: Option<PathBuf>,
}

impl Settings {
    fn new(cli: &Cli) -> Result<Self> {
        let cfg = config::load_config(cli.config.as_deref())?;
        let db = cli.db.clone().or_else(|| cfg.db.clone()).unwrap_or_else(|| PathBuf::from(DEFAULT_DB));
        let catalog = cli.catalog.clone().or_else(|| cfg.catalog.clone());
        Ok(Settings { cfg, db, catalog })
    }

    fn open_db(&self) -> Result<Db> {
        Db::open_or_create(&self.db).with_context(|| format!("opening database {}", self.db.display()))
    }

    fn domain(&self) -> Result<CatalogDomain> {
        let path = self.catalog.as_ref().ok_or_else(|| anyhow!("no instruction catalog given; pass --catalog or set `catalog` in {}", config::DEFAULT_CONFIG))?;
        CatalogDomain::load(path)
    }

    /// `--series` beats the configured series file, which beats the configured command.
    fn metrics_step<'d>(&self, domain: &'d dyn AbstractionDomain, series: Option<&Path>) -> Result<Box<dyn MetricsStep + 'd>> {
        if let Some(path) = series.or(self.cfg.metrics.native_series.as_deref()) {
            return Ok(Box::new(NativeMetrics { domain, source: JsonSeriesFile::load(path)? }));
        }
        match self.cfg.metrics.command.as_deref() {
            Some([program, args @ ..]) => Ok(Box::new(ExternalMetricsCommand { program: program.clone(), args: args.to_vec() })),
            Some([]) => bail!("metrics.command in the config is empty"),
            None => Ok(Box::new(NoMetrics)),
        }
    }
}

fn witness_file(db: &Db, campaign_id: CampaignId, discovery: &str) -> Result<PathBuf> {
    let campaign = db.campaign(campaign_id)?.ok_or_else(|| anyhow!("unknown campaign {campaign_id}"))?;
    if db.discovery_by_identifier(campaign_id, discovery)?.is_none() {
        bail!("campaign {campaign_id} has no discovery '{discovery}'");
    }
    Ok(Path::new(&campaign.witness_path).join(format!("{discovery}.json")))
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::new(&cli)?;
    match cli.command {
        Commands::Version => {
            println!("absdisc {} (core {})", env!("CARGO_PKG_VERSION"), absdisc_core::version());
        }
        Commands::ImportCampaign { tag, dirs } => {
            let db = settings.open_db()?;
            let domain = settings.domain()?;
            let step = settings.metrics_step(&domain, None)?;
            for dir in dirs {
                let started = Instant::now();
                let obj = match import_campaign(&db, &domain, step.as_ref(), &tag, &dir).with_context(|| format!("importing campaign {}", dir.display()))? {
                    ImportOutcome::Imported { campaign_id, batches, discoveries } => serde_json::json!({
                        "dir": dir, "outcome": "imported", "campaign_id": campaign_id, "batches": batches,
                        "discoveries": discoveries, "elapsed_ms": elapsed_ms(started),
                    }),
                    ImportOutcome::Skipped { existing } => serde_json::json!({ "dir": dir, "outcome": "skipped", "campaign_id": existing }),
                };
                println!("{}", serde_json::to_string(&obj)?);
            }
        }
        Commands::ImportBbset { isa, identifier, csv } => {
            let db = settings.open_db()?;
            let domain = settings.domain()?;
            let isa = isa.or_else(|| settings.cfg.isa.clone()).unwrap_or_else(|| DEFAULT_ISA.to_string());
            let bbset_id = import_basic_block_set(&db, &domain, &isa, &identifier, &csv)?;
            let entries = db.entries_of_bbset(bbset_id)?.len();
            let obj = serde_json::json!({ "bbset_id": bbset_id, "identifier": identifier, "isa": isa, "entries": entries });
            println!("{}", serde_json::to_string(&obj)?);
        }
        Commands::ImportGeneralization { dirs } => {
            let db = settings.open_db()?;
            let domain = settings.domain()?;
            for dir in dirs {
                let id = import_generalization(&db, &domain, &dir).with_context(|| format!("importing generalization {}", dir.display()))?;
                let obj = serde_json::json!({ "dir": dir, "generalization_id": id });
                println!("{}", serde_json::to_string(&obj)?);
            }
        }
        Commands::ComputeCoverage { campaigns, bbsets, heuristic } => {
            let db = settings.open_db()?;
            let domain = settings.domain()?;
            let heuristic = heuristic || settings.cfg.coverage.heuristic.unwrap_or(false);
            let started = Instant::now();
            let report = compute_bbset_coverage(&db, &domain, &campaigns, &bbsets, heuristic)?;
            for pair in &report.pairs {
                println!("{}", serde_json::to_string(pair)?);
            }
            info!(pairs = report.pairs.len(), computed = report.computed(), elapsed_ms = elapsed_ms(started), "coverage sweep done");
        }
        Commands::AddMetrics { series, overwrite, dirs } => {
            let domain = settings.domain()?;
            let step = settings.metrics_step(&domain, series.as_deref())?;
            for dir in dirs {
                let written = add_metrics(step.as_ref(), &dir, overwrite)?;
                let obj = serde_json::json!({ "dir": dir, "written": written });
                println!("{}", serde_json::to_string(&obj)?);
            }
        }
        Commands::Witness { trace, campaign, discovery, format } => {
            let path = match (trace, campaign, discovery) {
                (Some(p), _, _) => p,
                (None, Some(c), Some(d)) => witness_file(&settings.open_db()?, c, &d)?,
                _ => bail!("give a trace file or both --campaign and --discovery"),
            };
            let trace = WitnessTrace::load(&path)?;
            let domain = settings.domain()?;
            let graph = replay(&domain, &trace)?;
            match format {
                OutputFormat::Json => {
                    let obj = serde_json::json!({ "file": path, "witnessing_series": witnessing_series(&trace), "graph": graph });
                    println!("{}", serde_json::to_string_pretty(&obj)?);
                }
                OutputFormat::Text => {
                    print!("{}", graph.to_text());
                    if let Some(series) = witnessing_series(&trace) {
                        println!("witnessing series: {series}");
                    }
                }
            }
        }
        Commands::Campaigns => {
            let db = settings.open_db()?;
            for summary in db.campaign_summaries()? {
                println!("{}", serde_json::to_string(&summary)?);
            }
        }
        Commands::Export { table, out } => {
            let db = settings.open_db()?;
            let rows = export_table_to_parquet(&db.conn, &table, &out)?;
            let obj = serde_json::json!({ "table": table, "rows": rows, "out": out });
            println!("{}", serde_json::to_string(&obj)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn witness_needs_a_source() {
        assert!(Cli::try_parse_from(["absdisc", "witness"]).is_err());
        assert!(Cli::try_parse_from(["absdisc", "witness", "--campaign", "1"]).is_err());
        assert!(Cli::try_parse_from(["absdisc", "witness", "t.json", "--campaign", "1", "--discovery", "d0"]).is_err());
        let cli = Cli::try_parse_from(["absdisc", "witness", "--campaign", "1", "--discovery", "d0", "--format", "json"]).unwrap();
        assert!(matches!(cli.command, Commands::Witness { campaign: Some(1), format: OutputFormat::Json, .. }));
    }

    #[test]
    fn elapsed_time_is_reported_in_whole_milliseconds() {
        let started = Instant::now();
        let first = elapsed_ms(started);
        assert!(elapsed_ms(started) >= first);
        assert!(first < 60_000);
    }

    #[test]
    fn export_rejects_unknown_tables() {
        assert!(Cli::try_parse_from(["absdisc", "export", "--table", "tools", "--out", "x.parquet"]).is_err());
        assert!(Cli::try_parse_from(["absdisc", "export", "--table", "discoveries", "--out", "x.parquet"]).is_ok());
    }

    #[test]
    fn coverage_selection_lists() {
        let cli = Cli::try_parse_from(["absdisc", "--db", "r.sqlite", "compute-coverage", "--campaigns", "1", "2", "--heuristic"]).unwrap();
        assert_eq!(cli.db.as_deref(), Some(Path::new("r.sqlite")));
        let Commands::ComputeCoverage { campaigns, bbsets, heuristic } = cli.command else { panic!("wrong command") };
        assert_eq!(campaigns, vec![1, 2]);
        assert!(bbsets.is_empty() && heuristic);
    }

    #[test]
    fn witness_file_lives_in_the_campaign_witness_dir() {
        let db = Db::open_in_memory().unwrap();
        let id = db
            .insert_campaign(&results_sqlite::NewCampaign {
                tag: "t".into(),
                config: serde_json::json!({}),
                termination: serde_json::json!({}),
                date: "2021-09-01T00:00:00".into(),
                host_pc: "pc".into(),
                total_seconds: 1,
                restrict_to_supported_insns: false,
                witness_path: "/runs/c1/witnesses".into(),
            })
            .unwrap();
        assert!(witness_file(&db, id, "d0").is_err());
        assert!(witness_file(&db, id + 1, "d0").is_err());
    }
}
