//! # TOC cache on disk
//!
//! Downloading the log and param tables of content takes most of the connection time. The Crazyflie lib can
//! skip the download when it is given a [TocCache] that knows the TOC for the CRC announced by the Crazyflie.
//!
//! [FileTocCache] keeps one JSON file per TOC in a directory, named after the CRC (for example `1F2E3D4C.json`).
//! A missing, unreadable or corrupted file is treated as a cache miss and the TOC is downloaded again. Failing to
//! write the cache is logged and otherwise ignored.

use std::fs;
use std::path::{Path, PathBuf};

use crazyflie_lib::TocCache;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    crc32: u32,
    toc: String,
}

/// TOC cache stored in a directory
#[derive(Debug, Clone)]
pub struct FileTocCache {
    dir: PathBuf,
}

impl FileTocCache {
    /// Open the cache, the directory is created if it does not exist
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, crc32: u32) -> PathBuf {
        self.dir.join(format!("{:08X}.json", crc32))
    }

    fn read(&self, crc32: u32) -> Result<Option<String>> {
        let path = self.path(crc32);
        if !path.exists() {
            return Ok(None);
        }

        let file: CacheFile = serde_json::from_str(&fs::read_to_string(path)?)?;
        if file.crc32 != crc32 {
            return Ok(None);
        }

        Ok(Some(file.toc))
    }

    fn write(&self, crc32: u32, toc: &str) -> Result<()> {
        let file = CacheFile {
            crc32,
            toc: toc.to_owned(),
        };
        fs::write(self.path(crc32), serde_json::to_string(&file)?)?;

        Ok(())
    }
}

impl TocCache for FileTocCache {
    fn get_toc(&self, crc32: u32) -> Option<String> {
        match self.read(crc32) {
            Ok(toc) => toc,
            Err(e) => {
                log::warn!("Ignoring TOC cache entry {:08X}: {}", crc32, e);
                None
            }
        }
    }

    fn store_toc(&self, crc32: u32, toc: &str) {
        if let Err(e) = self.write(crc32, toc) {
            log::warn!("Cannot store TOC {:08X} in cache: {}", crc32, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_toc_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileTocCache::new(dir.path().join("cache")).unwrap();

        assert_eq!(cache.get_toc(0xDEADBEEF), None);
        cache.store_toc(0xDEADBEEF, "{\"stabilizer.roll\":[0,7]}");

        assert!(dir.path().join("cache").join("DEADBEEF.json").exists());
        assert_eq!(
            cache.get_toc(0xDEADBEEF).as_deref(),
            Some("{\"stabilizer.roll\":[0,7]}")
        );
        assert_eq!(cache.get_toc(0x1234), None);
    }

    #[test]
    fn corrupted_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileTocCache::new(dir.path()).unwrap();

        fs::write(dir.path().join("00000042.json"), "not json").unwrap();
        assert_eq!(cache.get_toc(0x42), None);
    }
}
