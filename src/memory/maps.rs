//! Huge-page discovery from the process memory map.
//!
//! Each line of `/proc/self/maps` looks like:
//!
//! ```text
//! 7f2a00000000-7f2a40000000 rw-s 00000000 00:2f 123456    /dev/hugepages/rtemap_0
//! ```
//!
//! Lines are handled as raw bytes: paths of unrelated mappings need not be
//! UTF-8.
//!
//! Backing files follow the `<prefix>map_<index>` naming convention. A file
//! mapped in several slices shows up on several lines; the first line wins
//! the base address and the size is re-read from the filesystem afterwards.

use super::{HugepageFileInfo, RegionSource};
use crate::error::{Error, Result};
use crate::protocol::VHOST_MEMORY_MAX_NREGIONS;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// The memory map of the calling process.
pub const PROC_SELF_MAPS: &str = "/proc/self/maps";

/// Scans a memory-map listing for huge-page backing files.
#[derive(Debug, Clone)]
pub struct ProcMaps {
    path: PathBuf,
}

impl Default for ProcMaps {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcMaps {
    /// Scan the calling process's own mappings.
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(PROC_SELF_MAPS),
        }
    }

    /// Scan a listing at another path (another process, or a captured file).
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the listing being scanned.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan an already-open listing.
    ///
    /// Sizes are those implied by the first mapped slice; [`RegionSource::hugepage_files`]
    /// corrects them from the filesystem.
    pub fn scan<R: BufRead>(reader: R) -> Result<Vec<HugepageFileInfo>> {
        let mut huges: Vec<HugepageFileInfo> = Vec::new();

        for line in reader.split(b'\n') {
            let line = line.map_err(|e| Error::Discovery(format!("read error: {e}")))?;
            let (start, end, path) = parse_maps_line(&line).ok_or_else(|| {
                let line = String::from_utf8_lossy(&line);
                tracing::error!(line = %line, "failed to parse address");
                Error::Discovery(format!("failed to parse address in {line:?}"))
            })?;

            let Some(path) = path else { continue };
            if !is_hugepage_file(path) {
                continue;
            }
            if huges.iter().any(|h| h.path.as_os_str() == path) {
                continue;
            }
            if huges.len() >= VHOST_MEMORY_MAX_NREGIONS {
                tracing::error!(max = VHOST_MEMORY_MAX_NREGIONS, "exceeded maximum regions");
                return Err(Error::ResourceLimit {
                    limit: VHOST_MEMORY_MAX_NREGIONS,
                });
            }

            huges.push(HugepageFileInfo {
                addr: start,
                size: end.saturating_sub(start),
                path: PathBuf::from(path),
            });
        }

        Ok(huges)
    }
}

impl RegionSource for ProcMaps {
    fn hugepage_files(&self) -> Result<Vec<HugepageFileInfo>> {
        let file = File::open(&self.path).map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "cannot open memory map");
            Error::Discovery(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        let mut huges = Self::scan(BufReader::new(file))?;

        for huge in &mut huges {
            match rustix::fs::stat(&huge.path) {
                Ok(stat) => {
                    huge.size = stat.st_size as u64;
                    tracing::info!(path = %huge.path.display(), size = huge.size, "hugepage file");
                }
                Err(e) => {
                    tracing::error!(path = %huge.path.display(), error = %e, "failed to stat");
                }
            }
        }

        Ok(huges)
    }
}

/// Split a maps line into start address, end address and path.
///
/// The path is `None` for anonymous mappings. Returns `None` only when the
/// address range cannot be parsed.
pub fn parse_maps_line(line: &[u8]) -> Option<(u64, u64, Option<&OsStr>)> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);

    let range = line.split(|&b| b == b' ').next()?;
    let (start, end) = std::str::from_utf8(range).ok()?.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    // address, perms, offset, dev, inode, then the (space-padded) path
    let path = line
        .splitn(6, |&b| b == b' ')
        .nth(5)
        .map(<[u8]>::trim_ascii_start)
        .filter(|rest| !rest.is_empty())
        .map(OsStr::from_bytes);

    Some((start, end, path))
}

/// Whether `path` names a huge-page backing file (`...map_<index>`).
pub fn is_hugepage_file(path: impl AsRef<OsStr>) -> bool {
    let path = path.as_ref().as_bytes();
    let Some(underline) = path.iter().rposition(|&b| b == b'_') else {
        return false;
    };
    if !path[..underline].ends_with(b"map") {
        return false;
    }

    let index = path[underline + 1..].trim_ascii_start();
    let digits = match index {
        [b'+' | b'-', rest @ ..] => rest,
        _ => index,
    };
    digits.first().is_some_and(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_line_with_path() {
        let line = "7f2a00000000-7f2a40000000 rw-s 00000000 00:2f 123456     /dev/hugepages/rtemap_0\n";
        let (start, end, path) = parse_maps_line(line.as_bytes()).unwrap();
        assert_eq!(start, 0x7f2a_0000_0000);
        assert_eq!(end, 0x7f2a_4000_0000);
        assert_eq!(path, Some(OsStr::new("/dev/hugepages/rtemap_0")));
    }

    #[test]
    fn test_parse_anonymous_line() {
        let line = "7ffd1c5e5000-7ffd1c606000 rw-p 00000000 00:00 0";
        let (_, _, path) = parse_maps_line(line.as_bytes()).unwrap();
        assert_eq!(path, None);

        let padded = "7ffd1c5e5000-7ffd1c606000 rw-p 00000000 00:00 0                          ";
        assert_eq!(parse_maps_line(padded.as_bytes()).unwrap().2, None);
    }

    #[test]
    fn test_parse_bad_address() {
        assert!(parse_maps_line(b"garbage line").is_none());
        assert!(parse_maps_line(b"zz-10 rw-p 0 0:0 0").is_none());
        assert!(parse_maps_line(b"\xff0-10 rw-p 0 0:0 0").is_none());
    }

    #[test]
    fn test_hugepage_naming() {
        assert!(is_hugepage_file("/dev/hugepages/rtemap_0"));
        assert!(is_hugepage_file("/mnt/huge/app1map_12"));
        assert!(is_hugepage_file("/dev/hugepages/rtemap_3 (deleted)"));
        assert!(!is_hugepage_file("/usr/lib/libc.so.6"));
        assert!(!is_hugepage_file("/dev/hugepages/rtemap_"));
        assert!(!is_hugepage_file("/dev/hugepages/rtemap_x"));
        assert!(!is_hugepage_file("/tmp/my_file"));
        assert!(!is_hugepage_file("[heap]"));
        assert!(is_hugepage_file(OsStr::from_bytes(b"/mnt/h\xe9/rtemap_1")));
        assert!(!is_hugepage_file(OsStr::from_bytes(b"/tmp/caf\xe9.so")));
    }

    #[test]
    fn test_scan_tolerates_non_utf8_paths() {
        let listing: &[u8] = b"\
1000-2000 r-xp 00000000 08:01 7 /tmp/caf\xe9.so
3000-5000 rw-s 00000000 00:2f 8 /dev/hugepages/rtemap_0
";
        let huges = ProcMaps::scan(Cursor::new(listing)).unwrap();
        assert_eq!(huges.len(), 1);
        assert_eq!(huges[0].path, PathBuf::from("/dev/hugepages/rtemap_0"));
        assert_eq!(huges[0].size, 0x2000);
    }

    #[test]
    fn test_scan_dedups_by_path() {
        let listing = "\
1000-3000 rw-s 00000000 00:2f 1 /dev/hugepages/rtemap_0
5000-6000 rw-p 00000000 00:00 0
8000-9000 rw-s 00200000 00:2f 1 /dev/hugepages/rtemap_0
a000-c000 rw-s 00000000 00:2f 2 /dev/hugepages/rtemap_1
";
        let huges = ProcMaps::scan(Cursor::new(listing)).unwrap();
        assert_eq!(huges.len(), 2);
        assert_eq!(huges[0].addr, 0x1000);
        assert_eq!(huges[0].size, 0x2000);
        assert_eq!(huges[1].path, PathBuf::from("/dev/hugepages/rtemap_1"));
    }

    #[test]
    fn test_scan_over_cap_fails() {
        let listing: String = (0..=VHOST_MEMORY_MAX_NREGIONS)
            .map(|i| {
                format!(
                    "{:x}-{:x} rw-s 00000000 00:2f {} /dev/hugepages/rtemap_{}\n",
                    0x1000 * (i + 1),
                    0x1000 * (i + 2),
                    i,
                    i
                )
            })
            .collect();
        assert!(matches!(
            ProcMaps::scan(Cursor::new(listing)),
            Err(Error::ResourceLimit { limit: 8 })
        ));
    }

    #[test]
    fn test_scan_unparsable_line_fails() {
        let listing = "1000-2000 rw-s 0 0:0 1 /dev/hugepages/rtemap_0\nnot a mapping\n";
        assert!(matches!(
            ProcMaps::scan(Cursor::new(listing)),
            Err(Error::Discovery(_))
        ));
    }

    #[test]
    fn test_missing_listing_fails() {
        let maps = ProcMaps::with_path("/nonexistent/maps");
        assert!(matches!(maps.hugepage_files(), Err(Error::Discovery(_))));
    }

    #[test]
    fn test_own_maps_scan() {
        // The test process has no huge-page files, but the listing must parse.
        let huges = ProcMaps::new().hugepage_files().unwrap();
        assert!(huges.len() <= VHOST_MEMORY_MAX_NREGIONS);
    }
}
