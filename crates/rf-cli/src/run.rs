//! `rootframe run`: skim jobs described in YAML or JSON.

use anyhow::{Context, Result};
use rf_frame::{ReadOptions, WriteOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A skim job: read `input` with `read`, write the result to `output` with `write`.
///
/// ```yaml
/// input: events.root
/// output: skimmed.root
/// read:
///   tree_key: events
///   columns: ["jet_{pt,eta}", "n*"]
///   where: "jet_pt > 30"
/// write:
///   tree_key: skimmed
///   mode: w
///   compression: zstd:5
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Input ROOT file; relative paths are resolved against the job file's directory.
    pub input: PathBuf,
    /// Output ROOT file; resolved like `input`.
    pub output: PathBuf,
    #[serde(default)]
    pub read: ReadOptions,
    /// Write options. When `tree_key` is omitted the input tree's name is used.
    #[serde(default)]
    pub write: Option<WriteSection>,
}

/// `write` section of a job; `tree_key` is optional here.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteSection {
    #[serde(default)]
    pub tree_key: Option<String>,
    #[serde(flatten)]
    pub options: WriteOptions,
}

pub fn read_job_config(path: &Path) -> Result<JobConfig> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let mut cfg: JobConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        // Default: YAML (serde_yaml_ng).
        serde_yaml_ng::from_slice(&bytes)?
    };
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    cfg.input = base.join(&cfg.input);
    cfg.output = base.join(&cfg.output);
    Ok(cfg)
}

/// What a skim wrote.
#[derive(Debug, Clone, Serialize)]
pub struct SkimSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub tree: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub compression: String,
}

/// Read `input` with `read`, then write the frame to `output`.
///
/// Without `out_tree` the written tree takes the input tree's name.
pub fn skim(
    input: &Path,
    output: &Path,
    read: &ReadOptions,
    out_tree: Option<String>,
    write: WriteOptions,
) -> Result<SkimSummary> {
    let tree = match out_tree {
        Some(name) => name,
        None => {
            let key = rf_frame::resolve_tree(input, read)?;
            key.rsplit('/').next().unwrap_or(&key).to_string()
        }
    };
    let df = rf_frame::read_root(input, read)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let write = write.with_tree(tree.clone());
    rf_frame::to_root(&df, output, &write)
        .with_context(|| format!("failed to write {}", output.display()))?;
    tracing::info!(
        "skimmed {} rows from {} into {}",
        df.n_rows(),
        input.display(),
        output.display()
    );

    Ok(SkimSummary {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        tree,
        rows: df.n_rows(),
        columns: df.column_names().into_iter().map(String::from).collect(),
        compression: write.compression.to_string(),
    })
}

pub fn cmd_run(config: &Path, output: Option<&PathBuf>) -> Result<()> {
    let cfg = read_job_config(config)?;
    let (out_tree, write) = match cfg.write {
        Some(section) => (section.tree_key, section.options),
        None => (None, WriteOptions::default()),
    };
    let summary = skim(&cfg.input, &cfg.output, &cfg.read, out_tree, write)?;
    crate::write_json(output, serde_json::to_value(&summary)?)
}
