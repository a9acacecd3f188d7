//! Cache file writing
//!
//! A new cache file is written in full to a temporary file next to the
//! target, fsynced, then renamed over the target and the directory fsynced.
//! Any failure removes the temporary file and leaves the existing cache file
//! untouched.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::header::CacheFileHeader;
use super::{CacheFileError, CacheFileInfo, CacheFileResult};
use super::CacheContents;
use crate::codec::{
    compute_checksum, encode_content_type, encode_node, format_checksum, CURRENT_SCHEMA_VERSION,
};
use crate::content::truncate_millis;
use crate::store::Generation;

/// fsync a directory so that a rename inside it is durable.
fn fsync_dir(path: &Path) -> CacheFileResult<()> {
    let dir = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| CacheFileError::io(format!("open directory {}", path.display()), e))?;
    dir.sync_all()
        .map_err(|e| CacheFileError::io(format!("fsync directory {}", path.display()), e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// A fully written and synced temporary cache file awaiting its rename.
///
/// Dropping it without calling [`PendingCacheFile::commit`] removes the
/// temporary file.
#[derive(Debug)]
pub struct PendingCacheFile {
    temp: PathBuf,
    target: PathBuf,
    info: CacheFileInfo,
    committed: bool,
}

impl PendingCacheFile {
    pub fn info(&self) -> &CacheFileInfo {
        &self.info
    }

    /// Renames the temporary file over the target.
    pub fn commit(mut self) -> CacheFileResult<CacheFileInfo> {
        fs::rename(&self.temp, &self.target).map_err(|e| {
            CacheFileError::io(
                format!(
                    "rename {} to {}",
                    self.temp.display(),
                    self.target.display()
                ),
                e,
            )
        })?;
        self.committed = true;

        if let Some(parent) = self.target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fsync_dir(parent)?;
        }
        Ok(self.info.clone())
    }
}

impl Drop for PendingCacheFile {
    fn drop(&mut self) {
        if !self.committed {
            // Best effort, already on a failure path.
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Writes `contents` at `generation` to a temporary file beside `path`.
///
/// Content types are written first, then the nodes in the order given,
/// which must be parents first as returned by `ContentStore::all`. A record
/// too large to encode fails the write with `Codec`.
pub fn write_temp_file(
    path: &Path,
    generation: Generation,
    contents: &CacheContents,
) -> CacheFileResult<PendingCacheFile> {
    let nodes = &contents.nodes;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| CacheFileError::io(format!("create directory {}", parent.display()), e))?;
    }

    let temp = temp_path(path);
    let header = CacheFileHeader {
        schema_version: CURRENT_SCHEMA_VERSION,
        generation: generation.value(),
        node_count: nodes.len() as u64,
        created_at: truncate_millis(Utc::now()),
    };

    // The guard removes the temp file if anything below fails.
    let mut pending = PendingCacheFile {
        temp: temp.clone(),
        target: path.to_path_buf(),
        info: CacheFileInfo {
            path: path.display().to_string(),
            schema_version: header.schema_version,
            generation: header.generation,
            node_count: header.node_count,
            created_at: header.created_at,
            size_bytes: 0,
            checksum: String::new(),
        },
        committed: false,
    };

    let file = File::create(&temp)
        .map_err(|e| CacheFileError::io(format!("create {}", temp.display()), e))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = crc32fast::Hasher::new();
    let mut size = 0u64;

    let mut emit = |writer: &mut BufWriter<File>, bytes: &[u8]| -> CacheFileResult<()> {
        hasher.update(bytes);
        size += bytes.len() as u64;
        writer
            .write_all(bytes)
            .map_err(|e| CacheFileError::io(format!("write {}", temp.display()), e))
    };

    emit(&mut writer, &header.encode())?;
    for content_type in &contents.content_types {
        let record = encode_content_type(content_type).map_err(CacheFileError::Encode)?;
        emit(&mut writer, &record)?;
    }
    for node in nodes {
        let record = encode_node(node).map_err(CacheFileError::Encode)?;
        emit(&mut writer, &record)?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| CacheFileError::io(format!("flush {}", temp.display()), e.into_error()))?;
    file.sync_all()
        .map_err(|e| CacheFileError::io(format!("fsync {}", temp.display()), e))?;

    pending.info.size_bytes = size;
    pending.info.checksum = format_checksum(hasher.finalize());
    Ok(pending)
}

/// Writes and installs a cache file in one step.
pub fn write_cache_file(
    path: &Path,
    generation: Generation,
    contents: &CacheContents,
) -> CacheFileResult<CacheFileInfo> {
    write_temp_file(path, generation, contents)?.commit()
}

/// Checksum of a whole file, formatted for reports.
pub(crate) fn file_checksum(data: &[u8]) -> String {
    format_checksum(compute_checksum(data))
}
