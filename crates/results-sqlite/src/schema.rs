pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE tools (
  tool_id         INTEGER PRIMARY KEY AUTOINCREMENT,
  full_name       TEXT NOT NULL UNIQUE
);

CREATE TABLE campaigns (
  campaign_id     INTEGER PRIMARY KEY AUTOINCREMENT,
  tag             TEXT NOT NULL,
  config_json     TEXT NOT NULL,
  termination_json TEXT NOT NULL,
  date            TEXT NOT NULL,
  host_pc         TEXT NOT NULL,
  total_seconds   INTEGER NOT NULL,
  restrict_to_supported_insns INTEGER NOT NULL CHECK (restrict_to_supported_insns IN (0,1)),
  witness_path    TEXT NOT NULL UNIQUE
);

CREATE TABLE campaign_tools (
  campaign_id     INTEGER NOT NULL REFERENCES campaigns(campaign_id) ON DELETE CASCADE,
  tool_id         INTEGER NOT NULL REFERENCES tools(tool_id),
  PRIMARY KEY (campaign_id, tool_id)
);

CREATE TABLE discovery_batches (
  batch_id        INTEGER PRIMARY KEY AUTOINCREMENT,
  campaign_id     INTEGER NOT NULL REFERENCES campaigns(campaign_id) ON DELETE CASCADE,
  batch_index     INTEGER NOT NULL,
  num_sampled     INTEGER NOT NULL,
  num_interesting INTEGER NOT NULL,
  batch_time      INTEGER NOT NULL,
  UNIQUE (campaign_id, batch_index)
);

CREATE TABLE insn_schemes (
  scheme_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  text            TEXT NOT NULL UNIQUE CHECK (length(text) <= 255)
);

CREATE TABLE discoveries (
  discovery_id    INTEGER PRIMARY KEY AUTOINCREMENT,
  batch_id        INTEGER NOT NULL REFERENCES discovery_batches(batch_id) ON DELETE CASCADE,
  identifier      TEXT NOT NULL,
  absblock_json   TEXT NOT NULL,
  num_insns       INTEGER NOT NULL,
  witness_len     INTEGER NOT NULL,
  interestingness REAL,
  subsumed_by     TEXT,
  generality      INTEGER CHECK (generality IS NULL OR generality >= 0),
  remarks         TEXT,
  UNIQUE (batch_id, identifier)
);

CREATE TABLE discovery_schemes (
  discovery_id    INTEGER NOT NULL REFERENCES discoveries(discovery_id) ON DELETE CASCADE,
  scheme_id       INTEGER NOT NULL REFERENCES insn_schemes(scheme_id),
  PRIMARY KEY (discovery_id, scheme_id)
);

CREATE TABLE measurements (
  measurement_id  INTEGER PRIMARY KEY AUTOINCREMENT,
  discovery_id    INTEGER NOT NULL REFERENCES discoveries(discovery_id) ON DELETE CASCADE,
  interestingness REAL NOT NULL
);

CREATE TABLE generalizations (
  generalization_id INTEGER PRIMARY KEY AUTOINCREMENT,
  identifier      TEXT,
  absblock_json   TEXT NOT NULL,
  witness_file    TEXT NOT NULL,
  witness_len     INTEGER NOT NULL,
  interestingness REAL,
  generality      INTEGER CHECK (generality IS NULL OR generality >= 0),
  remarks         TEXT,
  num_insns       INTEGER NOT NULL
);

CREATE TABLE generalization_tools (
  generalization_id INTEGER NOT NULL REFERENCES generalizations(generalization_id) ON DELETE CASCADE,
  tool_id         INTEGER NOT NULL REFERENCES tools(tool_id),
  PRIMARY KEY (generalization_id, tool_id)
);

CREATE TABLE bbsets (
  bbset_id        INTEGER PRIMARY KEY AUTOINCREMENT,
  identifier      TEXT NOT NULL UNIQUE,
  isa             TEXT NOT NULL
);

CREATE TABLE bbset_tools (
  bbset_id        INTEGER NOT NULL REFERENCES bbsets(bbset_id) ON DELETE CASCADE,
  tool_id         INTEGER NOT NULL REFERENCES tools(tool_id),
  PRIMARY KEY (bbset_id, tool_id)
);

CREATE TABLE bb_entries (
  entry_id        INTEGER PRIMARY KEY AUTOINCREMENT,
  bbset_id        INTEGER NOT NULL REFERENCES bbsets(bbset_id) ON DELETE CASCADE,
  hex             TEXT NOT NULL,
  asm             TEXT NOT NULL,
  measurements_json TEXT NOT NULL
);

CREATE TABLE bb_measurements (
  entry_id        INTEGER NOT NULL REFERENCES bb_entries(entry_id) ON DELETE CASCADE,
  tool_id         INTEGER NOT NULL REFERENCES tools(tool_id),
  result          REAL,
  PRIMARY KEY (entry_id, tool_id)
);

CREATE TABLE bb_interesting_for (
  entry_id        INTEGER NOT NULL REFERENCES bb_entries(entry_id) ON DELETE CASCADE,
  campaign_id     INTEGER NOT NULL REFERENCES campaigns(campaign_id) ON DELETE CASCADE,
  PRIMARY KEY (entry_id, campaign_id)
);

CREATE TABLE bbset_metrics (
  metrics_id      INTEGER PRIMARY KEY AUTOINCREMENT,
  bbset_id        INTEGER NOT NULL REFERENCES bbsets(bbset_id) ON DELETE CASCADE,
  campaign_id     INTEGER NOT NULL REFERENCES campaigns(campaign_id) ON DELETE CASCADE,
  num_bbs_interesting INTEGER NOT NULL,
  percent_bbs_interesting REAL NOT NULL,
  num_interesting_bbs_covered INTEGER NOT NULL,
  percent_interesting_bbs_covered REAL NOT NULL,
  num_interesting_bbs_covered_top10 INTEGER NOT NULL,
  percent_interesting_bbs_covered_top10 REAL NOT NULL,
  UNIQUE (bbset_id, campaign_id)
);

CREATE INDEX idx_batches_campaign ON discovery_batches(batch_index, campaign_id);
CREATE INDEX idx_discoveries_batch ON discoveries(batch_id);
CREATE INDEX idx_discoveries_rank ON discoveries(num_insns) WHERE subsumed_by IS NULL;
CREATE INDEX idx_measurements_discovery ON measurements(discovery_id);
CREATE INDEX idx_entries_bbset ON bb_entries(bbset_id);
CREATE INDEX idx_interesting_campaign ON bb_interesting_for(campaign_id);

COMMIT;
"#
;

/// Tables in dependency order, parents first.
pub const TABLES: &[&str] = &[
    "tools",
    "campaigns",
    "campaign_tools",
    "discovery_batches",
    "insn_schemes",
    "discoveries",
    "discovery_schemes",
    "measurements",
    "generalizations",
    "generalization_tools",
    "bbsets",
    "bbset_tools",
    "bb_entries",
    "bb_measurements",
    "bb_interesting_for",
    "bbset_metrics",
];
