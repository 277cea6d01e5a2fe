//! Table text formats: CSV/JSON output of frames and CSV import.

use anyhow::{Context, Result};
use rf_frame::{ColumnData, DataFrame, Series};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Text format of `dump`.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Header row then one line per row; the index (if any) is the first column.
    Csv,
    /// A JSON array of row objects.
    Json,
}

/// Streams frames (e.g. consecutive chunks) to one output as a single table.
pub struct TableSink {
    format: Format,
    out: Box<dyn Write>,
    header: Option<Vec<String>>,
    rows: usize,
}

impl TableSink {
    pub fn new(format: Format, output: Option<&PathBuf>) -> Result<Self> {
        let out: Box<dyn Write> = match output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };
        Ok(Self { format, out, header: None, rows: 0 })
    }

    pub fn write_frame(&mut self, df: &DataFrame) -> Result<()> {
        let series: Vec<&Series> = df.index().into_iter().chain(df.columns()).collect();
        let names: Vec<String> = series.iter().map(|s| s.name.clone()).collect();
        match &self.header {
            Some(header) if *header != names => {
                anyhow::bail!("chunk columns {:?} differ from {:?}", names, header)
            }
            Some(_) => {}
            None => {
                if self.format == Format::Csv {
                    let mut w = csv::Writer::from_writer(&mut self.out);
                    w.write_record(&names)?;
                    w.flush()?;
                } else {
                    self.out.write_all(b"[")?;
                }
                self.header = Some(names.clone());
            }
        }

        match self.format {
            Format::Csv => {
                let mut w = csv::Writer::from_writer(&mut self.out);
                for i in 0..df.n_rows() {
                    let record = series.iter().map(|s| s.data.format_value(i).unwrap_or_default());
                    w.write_record(record)?;
                }
                w.flush()?;
            }
            Format::Json => {
                for i in 0..df.n_rows() {
                    let row: serde_json::Map<String, serde_json::Value> =
                        series.iter().map(|s| (s.name.clone(), cell_json(&s.data, i))).collect();
                    let sep: &[u8] = if self.rows == 0 { b"\n" } else { b",\n" };
                    self.out.write_all(sep)?;
                    serde_json::to_writer(&mut self.out, &row)?;
                    self.rows += 1;
                }
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        if self.format == Format::Json {
            if self.header.is_none() {
                self.out.write_all(b"[")?;
            }
            self.out.write_all(b"\n]\n")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

fn cell_json(data: &ColumnData, i: usize) -> serde_json::Value {
    use serde_json::Value;
    let value = match data {
        ColumnData::Bool(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::I8(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::U8(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::I16(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::U16(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::I32(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::U32(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::I64(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::U64(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::F32(v) => v.get(i).map(|&x| Value::from(x)),
        ColumnData::F64(v) => v.get(i).map(|&x| Value::from(x)),
    };
    value.unwrap_or(Value::Null)
}

/// Column type picked for a CSV column: the narrowest of bool, int64, float64
/// that parses every field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Inferred {
    Bool,
    Int,
    Float,
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn all_parse(fields: &[String], ok: impl Fn(&str) -> bool) -> bool {
    fields.iter().all(|s| ok(s.trim()))
}

fn infer(name: &str, fields: &[String]) -> Result<Inferred> {
    if !fields.is_empty() && all_parse(fields, |s| parse_bool(s).is_some()) {
        return Ok(Inferred::Bool);
    }
    if !fields.is_empty() && all_parse(fields, |s| s.parse::<i64>().is_ok()) {
        return Ok(Inferred::Int);
    }
    if all_parse(fields, |s| s.parse::<f64>().is_ok()) {
        return Ok(Inferred::Float);
    }
    let bad = fields.iter().map(|s| s.trim()).find(|s| s.parse::<f64>().is_err()).unwrap_or("");
    anyhow::bail!("column '{}' is not numeric (value '{}')", name, bad)
}

/// Read a CSV file with a header row into a frame.
///
/// A column named `index` becomes the frame index.
pub fn read_csv(path: &Path, delimiter: u8) -> Result<DataFrame> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers: Vec<String> = rdr
        .headers()
        .context("failed to read CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() {
        anyhow::bail!("CSV file has no columns");
    }

    let mut columns: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (row, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("failed to read CSV row {}", row + 1))?;
        for (j, field) in record.iter().enumerate().take(headers.len()) {
            columns[j].push(field.to_string());
        }
    }

    let mut series = Vec::with_capacity(headers.len());
    for (name, fields) in headers.iter().zip(&columns) {
        let trimmed = fields.iter().map(|s| s.trim());
        let data: ColumnData = match infer(name, fields)? {
            Inferred::Bool => trimmed.filter_map(parse_bool).collect::<Vec<_>>().into(),
            Inferred::Int => {
                trimmed.filter_map(|s| s.parse::<i64>().ok()).collect::<Vec<_>>().into()
            }
            Inferred::Float => {
                trimmed.filter_map(|s| s.parse::<f64>().ok()).collect::<Vec<_>>().into()
            }
        };
        tracing::debug!("column '{}' read as {}", name, data.leaf_type());
        series.push(Series::new(name.clone(), data));
    }

    let mut df = DataFrame::from_columns(series)?;
    if df.column(rf_frame::INDEX).is_some() {
        df.set_index(rf_frame::INDEX)?;
    }
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn inference_picks_narrowest_type() {
        assert_eq!(infer("a", &strings(&["true", "False"])).unwrap(), Inferred::Bool);
        assert_eq!(infer("a", &strings(&["1", " -2 "])).unwrap(), Inferred::Int);
        assert_eq!(infer("a", &strings(&["1", "2.5", "1e3"])).unwrap(), Inferred::Float);
        assert_eq!(infer("a", &[]).unwrap(), Inferred::Float);
        assert!(infer("a", &strings(&["1", "x"])).is_err());
    }

    #[test]
    fn csv_reads_into_typed_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.csv");
        std::fs::write(&path, "index,x,n,ok\n5,1.5,1,true\n6,2,2,false\n").unwrap();
        let df = read_csv(&path, b',').unwrap();
        assert_eq!(df.column_names(), vec!["x", "n", "ok"]);
        assert_eq!(df.index().unwrap().data, ColumnData::from(vec![5i64, 6]));
        assert_eq!(df.column("x").unwrap().data, ColumnData::from(vec![1.5f64, 2.0]));
        assert_eq!(df.column("ok").unwrap().data, ColumnData::from(vec![true, false]));
    }
}
