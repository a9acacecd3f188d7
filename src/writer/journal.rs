//! Change journal
//!
//! Every committed write batch is appended to the journal before its
//! generation is published. The journal holds the batches committed since
//! the cache file was last written; a reload replays them on top of the file.
//!
//! The file is a plain concatenation of encoded batches. A crash mid-append
//! leaves a torn tail: a final record that runs past the end of the file.
//! Replay skips a torn tail and the next append cuts it off. Any other
//! decode failure is corruption and fails the replay; replay never changes
//! the file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::codec::{decode_batch, CodecError, DecodedBatch};
use crate::observability::Event;

/// Result type for journal replay
pub type JournalResult<T> = Result<T, JournalError>;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal i/o error: {0}")]
    Io(#[from] io::Error),

    /// A complete batch failed to decode; batches after it cannot be trusted.
    #[error("journal corrupt at byte {offset}: {source}")]
    Corrupt { offset: u64, source: CodecError },
}

/// Batches recovered from a journal.
#[derive(Debug, Default)]
pub struct JournalReplay {
    pub batches: Vec<DecodedBatch>,
    /// Bytes of the journal that decoded cleanly
    pub valid_bytes: u64,
    /// True if the journal ends in a partially written batch
    pub torn_tail: bool,
}

/// Durable log of committed batches.
pub trait ChangeJournal: Send + Sync {
    /// Appends one encoded batch. Returns only once the bytes are durable.
    fn append(&self, batch: &[u8]) -> io::Result<()>;

    /// Reads back every complete batch in append order without modifying
    /// the journal.
    fn replay(&self) -> JournalResult<JournalReplay>;

    /// Discards every batch. Called once a new cache file covers them.
    fn reset(&self) -> io::Result<()>;

    /// Current journal size in bytes.
    fn size_bytes(&self) -> u64 {
        0
    }
}

/// Journal that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullJournal;

impl ChangeJournal for NullJournal {
    fn append(&self, _batch: &[u8]) -> io::Result<()> {
        Ok(())
    }

    fn replay(&self) -> JournalResult<JournalReplay> {
        Ok(JournalReplay::default())
    }

    fn reset(&self) -> io::Result<()> {
        Ok(())
    }
}

struct JournalFile {
    file: File,
    /// End of the last complete batch, once a replay has found a torn tail
    torn_at: Option<u64>,
}

/// Append-only journal file, fsynced after every batch.
pub struct FileJournal {
    path: PathBuf,
    inner: Mutex<JournalFile>,
}

impl FileJournal {
    /// Opens or creates the journal at `path`, creating parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(JournalFile { file, torn_at: None }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, JournalFile> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChangeJournal for FileJournal {
    fn append(&self, batch: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        let mut len = inner.file.metadata()?.len();
        if let Some(torn_at) = inner.torn_at.filter(|at| *at < len) {
            inner.file.set_len(torn_at)?;
            inner.file.sync_data()?;
            len = torn_at;
        }
        inner.torn_at = None;

        let file = &mut inner.file;
        let written = file.write_all(batch).and_then(|_| file.sync_data());
        if let Err(e) = written {
            // Cut off whatever part of the batch reached the file.
            let _ = file.set_len(len);
            return Err(e);
        }
        Ok(())
    }

    fn replay(&self) -> JournalResult<JournalReplay> {
        let mut inner = self.lock();
        let data = fs::read(&self.path)?;

        let mut replay = JournalReplay::default();
        let mut offset = 0usize;
        while offset < data.len() {
            match decode_batch(&data[offset..]) {
                Ok((batch, consumed)) => {
                    replay.batches.push(batch);
                    offset += consumed;
                }
                Err(e) if e.is_truncation() => {
                    crate::log_event!(
                        Event::JournalTornTail,
                        path = %self.path.display(),
                        offset,
                        discarded_bytes = data.len() - offset,
                        reason = %e
                    );
                    replay.torn_tail = true;
                    inner.torn_at = Some(offset as u64);
                    break;
                }
                Err(source) => {
                    return Err(JournalError::Corrupt {
                        offset: offset as u64,
                        source,
                    });
                }
            }
        }
        replay.valid_bytes = offset as u64;
        Ok(replay)
    }

    fn reset(&self) -> io::Result<()> {
        let mut inner = self.lock();
        inner.file.set_len(0)?;
        inner.file.sync_all()?;
        inner.torn_at = None;
        crate::log_event!(Event::JournalReset, path = %self.path.display());
        Ok(())
    }

    fn size_bytes(&self) -> u64 {
        self.lock().file.metadata().map(|m| m.len()).unwrap_or(0)
    }
}
