//! Content-addressed AST cache
//!
//! One file per program under the cache directory, named by the hex SHA-256
//! of the raw source bytes. Writes go through `<hash>.ast.tmp` + fsync +
//! rename, so readers either see the old entry or the new one, never a torn
//! write; stale `.tmp` files from a crash are swept on open. Writers
//! serialize on an exclusive `lock` file; readers do not lock at all. Read
//! problems of any kind degrade to a miss so the caller rebuilds.

pub mod codec;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

pub use codec::{CacheEntry, CacheHeader, CodecError};

/// Hex SHA-256 over raw source bytes, before any normalization.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub files: usize,
    pub total_bytes: u64,
}

#[derive(Debug)]
pub struct CacheManager {
    dir: PathBuf,
}

impl CacheManager {
    /// Open (creating if needed) and sweep leftover temp files.
    pub fn open(dir: &Path) -> std::io::Result<CacheManager> {
        fs::create_dir_all(dir)?;
        for entry in fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "tmp") {
                debug!(path = %path.display(), "removing stale cache temp file");
                let _ = fs::remove_file(&path);
            }
        }
        Ok(CacheManager {
            dir: dir.to_path_buf(),
        })
    }

    pub fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.ast"))
    }

    /// A populated entry when the file exists, decodes, and its recorded hash
    /// matches; anything else is a miss.
    pub fn get(&self, hash: &str) -> Option<CacheEntry> {
        let path = self.entry_path(hash);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(_) => return None,
        };
        match codec::decode(&bytes) {
            Ok(entry) if entry.header.source_hash == hash => Some(entry),
            Ok(_) => {
                debug!(hash, "cache entry hash mismatch, treating as miss");
                None
            }
            Err(e) => {
                debug!(hash, error = %e, "cache entry unreadable, treating as miss");
                None
            }
        }
    }

    /// Atomic write: temp file, fsync, rename. Holds the writer lock.
    pub fn put(&self, hash: &str, entry: &CacheEntry) -> std::io::Result<()> {
        let _lock = self.writer_lock()?;
        let bytes = codec::encode(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = self.dir.join(format!("{hash}.ast.tmp"));
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, self.entry_path(hash))?;
        Ok(())
    }

    pub fn delete(&self, hash: &str) -> std::io::Result<bool> {
        match fs::remove_file(self.entry_path(hash)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn clear(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for (path, _, _) in self.entries()? {
            fs::remove_file(&path)?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn stats(&self) -> std::io::Result<CacheStats> {
        let mut stats = CacheStats::default();
        for (_, len, _) in self.entries()? {
            stats.files += 1;
            stats.total_bytes += len;
        }
        Ok(stats)
    }

    /// Evict least-recently-used entries (by mtime, larger first on ties)
    /// until total size fits. Returns how many were evicted.
    pub fn enforce_quota(&self, max_bytes: u64) -> std::io::Result<usize> {
        let mut entries = self.entries()?;
        let mut total: u64 = entries.iter().map(|(_, len, _)| len).sum();
        if total <= max_bytes {
            return Ok(0);
        }
        entries.sort_by(|a, b| a.2.cmp(&b.2).then(b.1.cmp(&a.1)));
        let mut evicted = 0;
        for (path, len, _) in entries {
            if total <= max_bytes {
                break;
            }
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "cache eviction failed");
                continue;
            }
            total = total.saturating_sub(len);
            evicted += 1;
        }
        Ok(evicted)
    }

    fn entries(&self) -> std::io::Result<Vec<(PathBuf, u64, std::time::SystemTime)>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "ast") {
                if let Ok(meta) = entry.metadata() {
                    let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                    out.push((path, meta.len(), mtime));
                }
            }
        }
        Ok(out)
    }

    fn writer_lock(&self) -> std::io::Result<WriterLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join("lock"))?;
        file.lock_exclusive()?;
        Ok(WriterLock { file })
    }
}

/// Exclusive writer lock, released on drop.
struct WriterLock {
    file: File,
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        let h = content_hash(b"hello");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
