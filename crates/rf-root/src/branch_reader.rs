//! Column-oriented data extraction from flat TTree branches.

use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;

use crate::basket::{basket_values, read_basket};
use crate::cache::BasketCache;
use crate::data::BranchData;
use crate::error::{Result, RootError};
use crate::tree::{BranchInfo, LeafType};

/// Reader for the values of one flat branch.
pub struct BranchReader<'a> {
    file_data: &'a [u8],
    branch: &'a BranchInfo,
    leaf_type: LeafType,
    cache: Option<&'a BasketCache>,
}

impl<'a> BranchReader<'a> {
    /// Create a reader; fails with `UnsupportedBranch` unless the branch is flat.
    pub fn new(
        file_data: &'a [u8],
        branch: &'a BranchInfo,
        cache: Option<&'a BasketCache>,
    ) -> Result<Self> {
        let leaf_type = match (branch.unsupported_reason(), branch.leaf_type) {
            (None, Some(lt)) => lt,
            (reason, _) => {
                return Err(RootError::UnsupportedBranch {
                    branch: branch.name.clone(),
                    reason: reason.unwrap_or_else(|| "unknown leaf type".to_string()),
                });
            }
        };
        Ok(Self { file_data, branch, leaf_type, cache })
    }

    /// Element type of the branch.
    pub fn leaf_type(&self) -> LeafType {
        self.leaf_type
    }

    /// Number of entries in the branch.
    pub fn entries(&self) -> u64 {
        self.branch.entries
    }

    /// Read every entry.
    pub fn read_all(&self) -> Result<BranchData> {
        self.read_range(0..self.branch.entries)
    }

    /// Read entries `range.start..range.end` (clamped to the branch length).
    ///
    /// Only baskets overlapping the range are decompressed, in parallel.
    pub fn read_range(&self, range: Range<u64>) -> Result<BranchData> {
        let lo = range.start.min(self.branch.entries);
        let hi = range.end.clamp(lo, self.branch.entries);

        let parts: Vec<Result<BranchData>> = (0..self.branch.n_baskets)
            .into_par_iter()
            .filter_map(|i| {
                let (start, end) = self.basket_span(i);
                (start < hi && end > lo).then(|| self.decode_basket(i, start, end, lo..hi))
            })
            .collect();

        let mut out = BranchData::with_capacity(self.leaf_type, (hi - lo) as usize);
        for part in parts {
            out.extend(&part?)?;
        }

        if out.len() as u64 != hi - lo {
            return Err(RootError::Deserialization(format!(
                "branch '{}': baskets cover {} of {} requested entries",
                self.branch.name,
                out.len(),
                hi - lo
            )));
        }
        Ok(out)
    }

    /// Read all entries widened to `f64`.
    pub fn as_f64(&self) -> Result<Vec<f64>> {
        Ok(self.read_all()?.to_f64())
    }

    /// Entry span `[start, end)` of basket `i`.
    fn basket_span(&self, i: usize) -> (u64, u64) {
        let entries = &self.branch.basket_entry;
        let start = entries.get(i).copied().unwrap_or(0);
        let end = entries.get(i + 1).copied().unwrap_or(self.branch.entries);
        (start, end.max(start))
    }

    fn payload(&self, i: usize) -> Result<Arc<[u8]>> {
        let seek = *self.branch.basket_seek.get(i).ok_or_else(|| {
            RootError::Deserialization(format!(
                "branch '{}' has no seek for basket {}",
                self.branch.name, i
            ))
        })?;
        let load = || read_basket(self.file_data, seek).map(|(_, payload)| payload);
        match self.cache {
            Some(cache) => cache.get_or_insert(seek, load),
            None => load().map(Arc::from),
        }
    }

    fn decode_basket(
        &self,
        i: usize,
        start: u64,
        end: u64,
        want: Range<u64>,
    ) -> Result<BranchData> {
        let elem = self.leaf_type.byte_size();
        let payload = self.payload(i)?;
        let values = basket_values(&payload, (end - start) as usize, elem)?;

        let from = (want.start.max(start) - start) as usize;
        let to = (want.end.min(end) - start) as usize;
        BranchData::from_be_bytes(self.leaf_type, &values[from * elem..to * elem])
    }
}
