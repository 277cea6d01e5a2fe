//! Column-oriented tables with an optional index.

use rf_root::{BranchData, LeafType};

use crate::error::{FrameError, Result};

/// Storage of one column; the same typed vectors a flat branch decodes to.
pub type ColumnData = BranchData;

/// Name of the branch that holds a table's index.
pub const INDEX: &str = "index";

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Column name.
    pub name: String,
    /// Values.
    pub data: ColumnData,
}

impl Series {
    /// Create a series from anything convertible to column data (e.g. a `Vec<f64>`).
    pub fn new(name: impl Into<String>, data: impl Into<ColumnData>) -> Self {
        Self { name: name.into(), data: data.into() }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the series has no values.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element type.
    pub fn leaf_type(&self) -> LeafType {
        self.data.leaf_type()
    }
}

/// A table of equally long named columns, optionally carrying an index.
///
/// Column names are unique and never equal to the index name. A frame
/// without an index has the implicit index `0..n_rows`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    index: Option<Series>,
    columns: Vec<Series>,
}

impl DataFrame {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns, checking lengths and names.
    pub fn from_columns(columns: impl IntoIterator<Item = Series>) -> Result<Self> {
        let mut df = Self::new();
        for column in columns {
            df.push_column(column)?;
        }
        Ok(df)
    }

    /// Attach `index`, replacing any existing one.
    pub fn with_index(mut self, index: Series) -> Result<Self> {
        if self.columns.iter().any(|c| c.name == index.name) {
            return Err(FrameError::DuplicateColumn(index.name));
        }
        if let Some(first) = self.columns.first() {
            check_len(&index, first.len())?;
        }
        self.index = Some(index);
        Ok(self)
    }

    /// Turn the named column into the index. The previous index is dropped.
    pub fn set_index(&mut self, column: &str) -> Result<()> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| FrameError::ColumnNotFound(column.to_string()))?;
        self.index = Some(self.columns.remove(pos));
        Ok(())
    }

    /// Move the index back in front of the columns.
    ///
    /// A frame without an index gains an `int64` column `index` holding `0..n_rows`.
    pub fn reset_index(&mut self) -> Result<()> {
        // an explicit index never shares a name with a column
        let index = match self.index.take() {
            Some(index) => index,
            None if self.column(INDEX).is_some() => {
                return Err(FrameError::DuplicateColumn(INDEX.to_string()));
            }
            None => self.range_index(),
        };
        self.columns.insert(0, index);
        Ok(())
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.index.as_ref().or(self.columns.first()).map_or(0, Series::len)
    }

    /// Number of columns (the index is not counted).
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// The explicit index, if any.
    pub fn index(&self) -> Option<&Series> {
        self.index.as_ref()
    }

    /// The index, materializing the implicit `0..n_rows` as `int64` when absent.
    pub fn index_or_range(&self) -> Series {
        self.index.clone().unwrap_or_else(|| self.range_index())
    }

    fn range_index(&self) -> Series {
        Series::new(INDEX, (0..self.n_rows() as i64).collect::<Vec<_>>())
    }

    /// Columns in order.
    pub fn columns(&self) -> &[Series] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Series> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Append a column.
    pub fn push_column(&mut self, column: Series) -> Result<()> {
        if self.columns.iter().any(|c| c.name == column.name)
            || self.index.as_ref().is_some_and(|ix| ix.name == column.name)
        {
            return Err(FrameError::DuplicateColumn(column.name));
        }
        if self.index.is_some() || !self.columns.is_empty() {
            check_len(&column, self.n_rows())?;
        }
        self.columns.push(column);
        Ok(())
    }

    /// Keep the rows whose mask entry is `true`.
    ///
    /// An implicit index is renumbered; an explicit one keeps its labels.
    pub fn filter(&self, mask: &[bool]) -> Result<DataFrame> {
        if mask.len() != self.n_rows() {
            return Err(FrameError::LengthMismatch {
                column: "<mask>".to_string(),
                expected: self.n_rows(),
                found: mask.len(),
            });
        }
        Ok(self.map_columns(|data| data.filter(mask)))
    }

    /// Rows `start..stop`, clamped to the table.
    pub fn slice(&self, start: usize, stop: usize) -> DataFrame {
        self.map_columns(|data| data.slice(start..stop))
    }

    fn map_columns(&self, f: impl Fn(&ColumnData) -> ColumnData) -> DataFrame {
        let apply = |s: &Series| Series { name: s.name.clone(), data: f(&s.data) };
        DataFrame {
            index: self.index.as_ref().map(apply),
            columns: self.columns.iter().map(apply).collect(),
        }
    }

    /// Concatenate frames with identical layouts (e.g. chunks) into one.
    pub fn vstack(frames: impl IntoIterator<Item = DataFrame>) -> Result<DataFrame> {
        let mut frames = frames.into_iter();
        let Some(mut out) = frames.next() else {
            return Ok(DataFrame::new());
        };
        for frame in frames {
            if frame.column_names() != out.column_names()
                || frame.index.as_ref().map(|ix| &ix.name) != out.index.as_ref().map(|ix| &ix.name)
            {
                return Err(FrameError::SchemaMismatch(format!(
                    "cannot stack columns {:?} onto {:?}",
                    frame.column_names(),
                    out.column_names()
                )));
            }
            if let (Some(dst), Some(src)) = (out.index.as_mut(), frame.index.as_ref()) {
                dst.data.extend(&src.data)?;
            }
            for (dst, src) in out.columns.iter_mut().zip(&frame.columns) {
                dst.data.extend(&src.data)?;
            }
        }
        Ok(out)
    }

    /// A frame with only the named columns, in the given order. The index is kept.
    pub fn select(&self, names: &[&str]) -> Result<DataFrame> {
        let mut out = DataFrame { index: self.index.clone(), columns: Vec::new() };
        for &name in names {
            let column =
                self.column(name).ok_or_else(|| FrameError::ColumnNotFound(name.to_string()))?;
            out.push_column(column.clone())?;
        }
        Ok(out)
    }
}

fn check_len(series: &Series, expected: usize) -> Result<()> {
    if series.len() != expected {
        return Err(FrameError::LengthMismatch {
            column: series.name.clone(),
            expected,
            found: series.len(),
        });
    }
    Ok(())
}
