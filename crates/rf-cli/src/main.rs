//! rootframe CLI

mod convert;
mod run;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rf_frame::{Compression, Mode, ReadOptions, WriteOptions};
use rf_root::RootFile;
use std::path::{Path, PathBuf};

use crate::convert::Format;

#[derive(Parser)]
#[command(name = "rootframe")]
#[command(about = "rootframe - read, filter and write ROOT trees as tables")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

/// Which tree, columns and rows to read.
#[derive(Args, Debug, Clone, Default)]
struct Selection {
    /// Tree path inside the file. Optional when the file holds a single tree.
    #[arg(short, long)]
    tree: Option<String>,

    /// Column pattern to read (`*`, `?`, `[...]`, `{a,b}`); repeatable. Default: all.
    #[arg(short = 'c', long = "column")]
    columns: Vec<String>,

    /// Column pattern to leave out; repeatable.
    #[arg(short = 'i', long = "ignore")]
    ignore: Vec<String>,

    /// Row selection, e.g. `"pt > 20 && abs(eta) < 2.4"`.
    #[arg(short = 'w', long = "where")]
    where_: Option<String>,
}

impl Selection {
    fn to_options(&self) -> ReadOptions {
        ReadOptions {
            tree_key: self.tree.clone(),
            columns: self.columns.clone(),
            ignore: self.ignore.clone(),
            where_: self.where_.clone(),
            ..ReadOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the trees in a file with entry and branch counts
    Ls {
        /// Input ROOT file
        file: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List the branches of a tree with their types
    Branches {
        /// Input ROOT file
        file: PathBuf,

        /// Tree path. Optional when the file holds a single tree.
        #[arg(short, long)]
        tree: Option<String>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Read a tree and print it as CSV or JSON
    Dump {
        /// Input ROOT file
        file: PathBuf,

        #[command(flatten)]
        selection: Selection,

        /// Read and print this many entries at a time.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Output format.
        #[arg(long, value_enum, default_value = "csv")]
        format: Format,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Read a tree, select columns and rows, and write the result as a new tree
    Skim {
        /// Input ROOT file
        input: PathBuf,

        /// Output ROOT file
        output: PathBuf,

        #[command(flatten)]
        selection: Selection,

        /// Name of the written tree. Defaults to the input tree's name.
        #[arg(long)]
        out_tree: Option<String>,

        /// `w` replaces the output file, `a` adds the tree to it.
        #[arg(long, default_value = "w")]
        mode: Mode,

        /// Basket compression (`none`, `zlib:1`, `lz4:4`, `zstd:5`, `lzma:2`, or a ROOT setting).
        #[arg(long, default_value = "zlib:1")]
        compression: Compression,

        /// Target basket size in bytes.
        #[arg(long)]
        basket_size: Option<usize>,
    },

    /// Import a CSV file (header row required) as a tree
    FromCsv {
        /// Input CSV file
        csv: PathBuf,

        /// Output ROOT file
        output: PathBuf,

        /// Name of the written tree.
        #[arg(short, long, default_value = "default")]
        tree: String,

        /// `w` replaces the output file, `a` adds the tree to it.
        #[arg(long, default_value = "w")]
        mode: Mode,

        /// Field delimiter.
        #[arg(long, default_value = ",")]
        delimiter: char,
    },

    /// Run a skim job described by a YAML or JSON file
    Run {
        /// Job file
        #[arg(short, long)]
        config: PathBuf,

        /// Output file for the job summary (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Ls { file, json } => cmd_ls(&file, json),
        Commands::Branches { file, tree, json } => cmd_branches(&file, tree, json),
        Commands::Dump { file, selection, chunk_size, format, output } => {
            cmd_dump(&file, &selection, chunk_size, format, output.as_ref())
        }
        Commands::Skim {
            input,
            output,
            selection,
            out_tree,
            mode,
            compression,
            basket_size,
        } => {
            let mut write = WriteOptions::new().with_mode(mode).with_compression(compression);
            if let Some(basket_size) = basket_size {
                write = write.with_basket_size(basket_size);
            }
            let summary = run::skim(&input, &output, &selection.to_options(), out_tree, write)?;
            eprintln!(
                "wrote {} rows x {} columns to {}:{}",
                summary.rows,
                summary.columns.len(),
                output.display(),
                summary.tree
            );
            Ok(())
        }
        Commands::FromCsv { csv, output, tree, mode, delimiter } => {
            cmd_from_csv(&csv, &output, tree, mode, delimiter)
        }
        Commands::Run { config, output } => run::cmd_run(&config, output.as_ref()),
    }
}

fn cmd_ls(path: &Path, json: bool) -> Result<()> {
    let file = RootFile::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for name in file.list_trees()? {
        let tree = file.get_tree(&name)?;
        rows.push(serde_json::json!({
            "name": name,
            "title": tree.title,
            "entries": tree.entries,
            "branches": tree.branches.len(),
        }));
    }
    if json {
        return write_json(None, serde_json::Value::Array(rows));
    }
    for row in &rows {
        println!(
            "{}\t{} entries\t{} branches",
            row["name"].as_str().unwrap_or_default(),
            row["entries"],
            row["branches"]
        );
    }
    Ok(())
}

fn cmd_branches(path: &Path, tree: Option<String>, json: bool) -> Result<()> {
    let opts = ReadOptions { tree_key: tree, ..ReadOptions::default() };
    let key = rf_frame::resolve_tree(path, &opts)?;
    let file = RootFile::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let tree = file.get_tree(&key)?;

    let rows: Vec<serde_json::Value> = tree
        .branches
        .iter()
        .map(|b| {
            serde_json::json!({
                "name": b.name,
                "type": b.leaf_type.map(|t| t.to_string()),
                "class": b.class_name,
                "flat": b.is_flat(),
                "unsupported": b.unsupported_reason(),
            })
        })
        .collect();
    if json {
        return write_json(None, serde_json::Value::Array(rows));
    }
    for b in &tree.branches {
        let ty = b.leaf_type.map_or_else(|| "-".to_string(), |t| t.to_string());
        match b.unsupported_reason() {
            None => println!("{}\t{}", b.name, ty),
            Some(reason) => println!("{}\t{}\t(unsupported: {})", b.name, ty, reason),
        }
    }
    Ok(())
}

fn cmd_dump(
    path: &Path,
    selection: &Selection,
    chunk_size: Option<usize>,
    format: Format,
    output: Option<&PathBuf>,
) -> Result<()> {
    let opts = selection.to_options();
    let mut sink = convert::TableSink::new(format, output)?;
    match chunk_size {
        Some(rows) => {
            let chunks = rf_frame::read_root_chunks(path, &opts.with_chunk_size(rows))
                .with_context(|| format!("failed to read {}", path.display()))?;
            tracing::debug!("dumping {} chunks", chunks.n_chunks());
            for chunk in chunks {
                sink.write_frame(&chunk?)?;
            }
        }
        None => {
            let df = rf_frame::read_root(path, &opts)
                .with_context(|| format!("failed to read {}", path.display()))?;
            sink.write_frame(&df)?;
        }
    }
    sink.finish()
}

fn cmd_from_csv(
    csv_path: &Path,
    output: &Path,
    tree: String,
    mode: Mode,
    delimiter: char,
) -> Result<()> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| anyhow::anyhow!("delimiter must be a single ASCII character"))?;
    let df = convert::read_csv(csv_path, delimiter)?;
    let opts = WriteOptions::new().with_tree(tree).with_mode(mode);
    rf_frame::to_root(&df, output, &opts)
        .with_context(|| format!("failed to write {}", output.display()))?;
    eprintln!("wrote {} rows x {} columns to {}", df.n_rows(), df.n_columns(), output.display());
    Ok(())
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
