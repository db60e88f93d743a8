use std::fmt;

use crate::directory::Directory;
use crate::error::IndexResult;
use crate::page::BUCKET_CAPACITY;

/// Occupancy report over an index's pages.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSummary {
    pub name: Option<String>,
    pub entries: u64,
    pub global_depth: u8,
    pub directory_pages: usize,
    pub buckets: usize,
    pub overflow_pages: usize,
    pub longest_chain: usize,
    /// Bytes used across all bucket pages over their total capacity.
    pub average_fill: f64,
}

impl IndexSummary {
    pub(crate) fn collect(directory: &Directory, name: Option<&str>) -> IndexResult<Self> {
        let info = directory.header()?;
        let primaries = directory.bucket_pages(&info)?;
        let mut bucket_pages = 0usize;
        let mut longest_chain = 0usize;
        let mut used_bytes = 0usize;
        for primary in &primaries {
            let chain = directory.chain_headers(*primary)?;
            longest_chain = longest_chain.max(chain.len());
            bucket_pages += chain.len();
            used_bytes += chain
                .iter()
                .map(|(_, header)| header.used as usize)
                .sum::<usize>();
        }
        let average_fill = if bucket_pages == 0 {
            0.0
        } else {
            used_bytes as f64 / (bucket_pages * BUCKET_CAPACITY) as f64
        };
        Ok(Self {
            name: name.map(str::to_string),
            entries: info.entry_count,
            global_depth: info.global_depth,
            directory_pages: info.directory_pages.len(),
            buckets: primaries.len(),
            overflow_pages: bucket_pages - primaries.len(),
            longest_chain,
            average_fill,
        })
    }

    /// Header, directory, and bucket pages together.
    pub fn total_pages(&self) -> usize {
        1 + self.directory_pages + self.buckets + self.overflow_pages
    }
}

impl fmt::Display for IndexSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => writeln!(f, "hash index {}", name)?,
            None => writeln!(f, "hash index (temporary)")?,
        }
        writeln!(f, "  {:<17}{}", "entries", self.entries)?;
        writeln!(f, "  {:<17}{}", "global depth", self.global_depth)?;
        writeln!(f, "  {:<17}{}", "directory pages", self.directory_pages)?;
        writeln!(f, "  {:<17}{}", "buckets", self.buckets)?;
        writeln!(f, "  {:<17}{}", "overflow pages", self.overflow_pages)?;
        writeln!(f, "  {:<17}{}", "total pages", self.total_pages())?;
        writeln!(f, "  {:<17}{}", "longest chain", self.longest_chain)?;
        write!(f, "  {:<17}{:.1}%", "average fill", self.average_fill * 100.0)
    }
}
