//! Explicitly configured regions.

use super::{HugepageFileInfo, RegionSource};
use crate::error::{Error, Result};
use crate::protocol::VHOST_MEMORY_MAX_NREGIONS;

/// A fixed list of backing files, used instead of scanning the memory map.
#[derive(Debug, Clone, Default)]
pub struct StaticRegions {
    files: Vec<HugepageFileInfo>,
}

impl StaticRegions {
    /// Use `files` as the memory table, in order.
    pub fn new(files: Vec<HugepageFileInfo>) -> Self {
        Self { files }
    }

    /// Append one backing file.
    pub fn with_file(mut self, file: HugepageFileInfo) -> Self {
        self.files.push(file);
        self
    }
}

impl RegionSource for StaticRegions {
    fn hugepage_files(&self) -> Result<Vec<HugepageFileInfo>> {
        if self.files.len() > VHOST_MEMORY_MAX_NREGIONS {
            return Err(Error::ResourceLimit {
                limit: VHOST_MEMORY_MAX_NREGIONS,
            });
        }
        Ok(self.files.clone())
    }
}
