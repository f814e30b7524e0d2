//! Discovery of the huge-page regions shared with the backend.
//!
//! # Architecture
//!
//! - [`RegionSource`]: where backing files come from
//! - [`ProcMaps`]: scans `/proc/self/maps` for huge-page files (the default)
//! - [`StaticRegions`]: an explicit list, for callers that already know their memory
//! - [`prepare_memory_table`]: opens the files and builds the memory-table payload
//!
//! # Example
//!
//! ```rust,ignore
//! use virtio_user::memory::{ProcMaps, RegionSource, prepare_memory_table};
//!
//! let files = ProcMaps::new().hugepage_files()?;
//! let prepared = prepare_memory_table(&files)?;
//! assert_eq!(prepared.table.len(), prepared.fds.len());
//! ```

mod fixed;
mod maps;

pub use fixed::StaticRegions;
pub use maps::{PROC_SELF_MAPS, ProcMaps, is_hugepage_file, parse_maps_line};

use crate::error::{Error, Result};
use crate::protocol::{MemoryRegion, MemoryTable, VHOST_MEMORY_MAX_NREGIONS};
use rustix::fd::OwnedFd;
use rustix::fs::{Mode, OFlags};
use std::path::PathBuf;

/// A huge-page backing file mapped into this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HugepageFileInfo {
    /// Virtual address of the first mapping of the file.
    pub addr: u64,
    /// File size in bytes.
    pub size: u64,
    /// Path of the backing file.
    pub path: PathBuf,
}

/// Source of the backing files described in a memory table.
pub trait RegionSource {
    /// Return at most [`VHOST_MEMORY_MAX_NREGIONS`] backing files, in region order.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceLimit`] if more files qualify than the cap allows,
    /// [`Error::Discovery`] if the source cannot be read.
    fn hugepage_files(&self) -> Result<Vec<HugepageFileInfo>>;
}

/// A memory table and the descriptors backing its regions, position for position.
#[derive(Debug)]
pub struct PreparedMemory {
    /// Regions in wire order.
    pub table: MemoryTable,
    /// One read-write descriptor per region.
    pub fds: Vec<OwnedFd>,
}

/// Open each backing file read-write and describe it as a region.
///
/// The process-local address doubles as the guest physical address, and
/// every region starts at offset 0 of its file.
///
/// # Errors
///
/// Fails if there are too many files, or if any file cannot be opened.
/// Descriptors opened before the failure are closed.
pub fn prepare_memory_table(files: &[HugepageFileInfo]) -> Result<PreparedMemory> {
    if files.len() > VHOST_MEMORY_MAX_NREGIONS {
        return Err(Error::ResourceLimit {
            limit: VHOST_MEMORY_MAX_NREGIONS,
        });
    }

    let mut regions = Vec::with_capacity(files.len());
    let mut fds = Vec::with_capacity(files.len());
    for file in files {
        let fd = rustix::fs::open(&file.path, OFlags::RDWR | OFlags::CLOEXEC, Mode::empty())
            .map_err(|e| {
                Error::Discovery(format!("cannot open {}: {}", file.path.display(), e))
            })?;
        fds.push(fd);
        regions.push(MemoryRegion {
            guest_phys_addr: file.addr,
            memory_size: file.size,
            userspace_addr: file.addr,
            mmap_offset: 0,
        });
    }

    let table = MemoryTable::new(regions).ok_or(Error::ResourceLimit {
        limit: VHOST_MEMORY_MAX_NREGIONS,
    })?;
    crate::observability::record_memory_regions(table.len());

    Ok(PreparedMemory { table, fds })
}
