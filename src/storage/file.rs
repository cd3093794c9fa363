//! Append-only file store.
//!
//! Every successful `put` is appended to a JSON-lines log and the log is
//! replayed into a [`UrlTable`] on open. Retirement and ownership live in
//! memory only and are gone after a restart.
//!
//! A failed append cuts the log back to its last complete line and closes
//! the writer: later writes fail instead of resurrecting the lost record.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::Store;
use super::memory::UrlTable;
use super::models::{PutOutcome, ResolvedUrl, StoreCapabilities, UrlRecord};
use crate::errors::{Result, ShortenerError};

/// One line of the log.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub short_url: String,
    pub original_url: String,
}

/// Where log lines end up. A [`File`] outside of tests.
trait LogSink: Write + Send + Sync {
    /// Cuts the sink back to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Table and writer share one lock so the log and the maps never diverge.
struct FileState {
    table: UrlTable,
    writer: Option<BufWriter<Box<dyn LogSink>>>,
    /// 日志中完整记录的字节数
    committed: u64,
}

pub struct FileStore {
    path: PathBuf,
    state: RwLock<FileState>,
}

impl FileStore {
    /// Opens (creating if needed) the log at `path` and replays it.
    pub fn open(path: impl AsRef<Path>, seed: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(ShortenerError::file_operation(
                "File storage path is empty",
            ));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let mut table = UrlTable::new(seed);
        let replayed = Self::replay(&path, &mut table)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ShortenerError::file_operation(format!(
                    "Failed to open link log {}: {}",
                    path.display(),
                    e
                ))
            })?;
        let committed = file.metadata()?.len();

        info!(
            "Replayed {} records from {} ({} mappings loaded)",
            replayed,
            path.display(),
            table.len()
        );

        Ok(Self::with_sink(path, table, Box::new(file), committed))
    }

    fn with_sink(path: PathBuf, table: UrlTable, sink: Box<dyn LogSink>, committed: u64) -> Self {
        Self {
            path,
            state: RwLock::new(FileState {
                table,
                writer: Some(BufWriter::new(sink)),
                committed,
            }),
        }
    }

    /// Reads the log in file order. Malformed lines are skipped.
    fn replay(path: &Path, table: &mut UrlTable) -> Result<usize> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Link log {} not found, starting empty", path.display());
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LogLine>(line) {
                Ok(record) => {
                    table.restore(&record.short_url, &record.original_url);
                    count += 1;
                }
                Err(e) => warn!(
                    "Skipping malformed line {} in {}: {}",
                    index + 1,
                    path.display(),
                    e
                ),
            }
        }
        Ok(count)
    }

    /// Appends `line` and flushes it. On failure the unwritten bytes are
    /// discarded, the sink is truncated to the last complete line and the
    /// writer is closed.
    fn append(&self, state: &mut FileState, line: &LogLine) -> Result<()> {
        let writer = state
            .writer
            .as_mut()
            .ok_or_else(|| ShortenerError::file_operation("File store is shut down"))?;

        let err = match write_line(writer, line) {
            Ok(written) => {
                state.committed += written;
                return Ok(());
            }
            Err(e) => e,
        };

        if let Some(writer) = state.writer.take() {
            // into_parts 不会再次 flush，缓冲区里的残留直接丢弃
            let (mut sink, _unwritten) = writer.into_parts();
            if let Err(e) = sink.truncate(state.committed) {
                warn!(
                    "Failed to truncate link log {} to {} bytes: {}",
                    self.path.display(),
                    state.committed,
                    e
                );
            }
        }
        error!(
            "Append to link log {} failed, file store is closed for writes: {}",
            self.path.display(),
            err
        );
        Err(err)
    }
}

fn write_line<W: Write>(writer: &mut BufWriter<W>, line: &LogLine) -> Result<u64> {
    let mut bytes = serde_json::to_vec(line)?;
    bytes.push(b'\n');
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(bytes.len() as u64)
}

#[async_trait]
impl Store for FileStore {
    async fn put(&self, short_key: &str, original_url: &str, owner_id: i64) -> Result<PutOutcome> {
        let mut state = self.state.write();

        if let Some(existing) = state.table.short_for(original_url) {
            return Ok(PutOutcome::Conflict(existing.to_string()));
        }

        let line = LogLine {
            short_url: short_key.to_string(),
            original_url: original_url.to_string(),
        };
        self.append(&mut *state, &line)?;

        Ok(state.table.insert(short_key, original_url, owner_id))
    }

    async fn resolve_short(&self, short_key: &str) -> Result<Option<ResolvedUrl>> {
        Ok(self.state.read().table.resolve(short_key))
    }

    async fn resolve_long(&self, original_url: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .read()
            .table
            .short_for(original_url)
            .map(str::to_string))
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<UrlRecord>> {
        Ok(self.state.read().table.list_by_owner(owner_id))
    }

    async fn retire_batch(&self, short_keys: &[String], owner_id: i64) -> Result<u64> {
        let changed = self.state.write().table.retire(short_keys, owner_id);
        debug!(
            "Retired {} of {} keys for owner {} (not persisted)",
            changed,
            short_keys.len(),
            owner_id
        );
        Ok(changed)
    }

    async fn health_check(&self) -> Result<()> {
        if self.state.read().writer.is_some() {
            Ok(())
        } else {
            Err(ShortenerError::backend_unreachable(format!(
                "Link log {} is closed",
                self.path.display()
            )))
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let writer = self.state.write().writer.take();
        if let Some(writer) = writer {
            let mut sink = writer.into_inner().map_err(|e| {
                ShortenerError::file_operation(format!("Failed to flush link log: {}", e))
            })?;
            sink.sync()?;
            info!("Link log {} flushed and closed", self.path.display());
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            persistent: true,
            persists_retirement: false,
            persists_owner: false,
        }
    }
}
