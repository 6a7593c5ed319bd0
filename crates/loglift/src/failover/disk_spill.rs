//! 💾 Disk spill: failed items, one NDJSON line each, appended to a file you can replay later.
//!
//! Line shape: `{"index":"logs","id":"abc","source":"{...}"}`. `source` stays an escaped string,
//! byte-for-byte what the producer gave us. `id` is omitted when absent.
//!
//! 💾 Every `deliver` reaches the OS before it returns `Ok`, so a dropped policy or a killed
//! process never takes acknowledged items with it. `flush` adds an fsync on top.
//! A write that fails halfway is cut back off the file, so the next line starts clean.
//!
//! ⚠️ `max_bytes` is a hard cap on the file. An item that would push past it is refused with
//! `CapacityExceeded`. The file doesn't rotate. Rotation is logrotate's job, and logrotate
//! has been doing it since before some of us were born. 🦆

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::common::BatchItem;
use crate::error::FailoverError;
use crate::failover::FailoverPolicy;

/// 📁 The spill file's name inside the configured directory.
pub const SPILL_FILE_NAME: &str = "failed-items.ndjson";

#[derive(Debug)]
struct SpillState {
    file: File,
    used_bytes: u64,
}

/// 💾 Append-only NDJSON spill file with an optional size cap.
#[derive(Debug)]
pub struct DiskSpillFailover {
    name: String,
    path: PathBuf,
    max_bytes: Option<u64>,
    state: Mutex<SpillState>,
}

impl DiskSpillFailover {
    /// 📂 Creates the directory if needed and opens (or continues) the spill file.
    /// Existing bytes count against `max_bytes`.
    pub async fn open(directory: &Path, max_bytes: Option<u64>) -> Result<Self, FailoverError> {
        fs::create_dir_all(directory).await?;
        let path = directory.join(SPILL_FILE_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        let mut used_bytes = file.metadata().await?.len();
        if ends_mid_line(&mut file, used_bytes).await? {
            // 🩹 a previous run died mid-write; close the fragment so it can't swallow the next item
            warn!("🩹 Spill file {} ends in a torn line; sealing it off", path.display());
            file.write_all(b"\n").await?;
            file.flush().await?;
            used_bytes += 1;
        }
        debug!(
            "💾 Spill file {} open, {} bytes already used{}",
            path.display(),
            used_bytes,
            max_bytes.map(|max| format!(" of {max}")).unwrap_or_default()
        );
        Ok(Self {
            name: format!("disk spill ({})", path.display()),
            path,
            max_bytes,
            state: Mutex::new(SpillState {
                file,
                used_bytes,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn used_bytes(&self) -> u64 {
        self.state.lock().await.used_bytes
    }

    /// 📖 Reads every spilled item back, oldest first, for replay.
    ///
    /// Flushes pending writes first. Lines that don't parse are logged and skipped: a
    /// half-written last line after a crash should not hold the rest of the file hostage.
    pub async fn read_spilled(&self) -> Result<Vec<BatchItem>, FailoverError> {
        self.flush().await?;
        let raw = fs::read(&self.path).await?;
        let mut items = Vec::new();
        let mut start = 0;
        for end in memchr::memchr_iter(b'\n', &raw).chain(std::iter::once(raw.len())) {
            let line = &raw[start..end];
            start = end + 1;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<BatchItem>(line) {
                Ok(item) => items.push(item),
                Err(e) => warn!("🗑️ Skipping unreadable spill line in {}: {}", self.path.display(), e),
            }
        }
        Ok(items)
    }
}

/// ✍️ One line, all the way to the OS. tokio's `File` buffers internally until flushed.
async fn append_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

/// 🔍 True when a non-empty file's last byte isn't a newline.
async fn ends_mid_line(file: &mut File, len: u64) -> std::io::Result<bool> {
    if len == 0 {
        return Ok(false);
    }
    file.seek(std::io::SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

#[async_trait]
impl FailoverPolicy for DiskSpillFailover {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, item: BatchItem) -> Result<(), FailoverError> {
        let mut line = serde_json::to_vec(&item)?;
        line.push(b'\n');
        let incoming = line.len() as u64;

        let mut state = self.state.lock().await;
        if let Some(max) = self.max_bytes
            && state.used_bytes + incoming > max
        {
            return Err(FailoverError::CapacityExceeded {
                used: state.used_bytes,
                incoming,
                max,
            });
        }
        let used_bytes = state.used_bytes;
        if let Err(e) = append_line(&mut state.file, &line).await {
            if let Err(truncate_err) = state.file.set_len(used_bytes).await {
                warn!(
                    "💀 Could not cut a half-written line off {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(e.into());
        }
        state.used_bytes += incoming;
        Ok(())
    }

    async fn flush(&self) -> Result<(), FailoverError> {
        let mut state = self.state.lock().await;
        state.file.flush().await?;
        state.file.sync_data().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_spilled_items_come_back_intact_and_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let spill = DiskSpillFailover::open(&dir.path().join("nested/spill"), None)
            .await
            .unwrap();

        let first = BatchItem::new("logs", r#"{"msg":"tab\there","n":1}"#).with_id("a");
        let second = BatchItem::new("audit", r#"{"msg":"quote \" inside"}"#);
        spill.deliver(first.clone()).await.unwrap();
        spill.deliver(second.clone()).await.unwrap();

        assert_eq!(spill.read_spilled().await.unwrap(), vec![first, second]);

        let raw = fs::read_to_string(spill.path()).await.unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(!raw.lines().nth(1).unwrap().contains("\"id\""));
    }

    #[tokio::test]
    async fn the_one_where_the_cap_refuses_the_item_that_would_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let item = BatchItem::new("logs", r#"{"n":1}"#);
        let line_len = serde_json::to_vec(&item).unwrap().len() as u64 + 1;
        let spill = DiskSpillFailover::open(dir.path(), Some(line_len * 2)).await.unwrap();

        spill.deliver(item.clone()).await.unwrap();
        spill.deliver(item.clone()).await.unwrap();
        let err = spill.deliver(item).await.unwrap_err();

        assert!(matches!(err, FailoverError::CapacityExceeded { .. }));
        assert_eq!(spill.used_bytes().await, line_len * 2);
    }

    #[tokio::test]
    async fn the_one_where_reopening_continues_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let spill = DiskSpillFailover::open(dir.path(), None).await.unwrap();
            spill.deliver(BatchItem::new("logs", "{}")).await.unwrap();
            spill.flush().await.unwrap();
        }
        let spill = DiskSpillFailover::open(dir.path(), None).await.unwrap();
        assert!(spill.used_bytes().await > 0);
        spill.deliver(BatchItem::new("logs", r#"{"again":true}"#)).await.unwrap();
        assert_eq!(spill.read_spilled().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn the_one_where_a_torn_last_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SPILL_FILE_NAME);
        fs::write(&path, "{\"index\":\"logs\",\"source\":\"{}\"}\n{\"index\":\"lo").await.unwrap();

        let spill = DiskSpillFailover::open(dir.path(), None).await.unwrap();
        let items = spill.read_spilled().await.unwrap();
        assert_eq!(items, vec![BatchItem::new("logs", "{}")]);
    }

    #[tokio::test]
    async fn the_one_where_the_policy_is_dropped_without_a_flush_and_nothing_is_lost() {
        let dir = tempfile::tempdir().unwrap();
        let first = BatchItem::new("logs", r#"{"n":1}"#);
        let second = BatchItem::new("logs", r#"{"n":2}"#).with_id("b");
        {
            let spill = DiskSpillFailover::open(dir.path(), None).await.unwrap();
            spill.deliver(first.clone()).await.unwrap();
            spill.deliver(second.clone()).await.unwrap();
        }

        let reopened = DiskSpillFailover::open(dir.path(), None).await.unwrap();
        assert_eq!(reopened.read_spilled().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn the_one_where_a_torn_tail_is_sealed_before_the_next_item_lands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SPILL_FILE_NAME);
        let torn = "{\"index\":\"logs\",\"source\":\"{}\"}\n{\"index\":\"lo";
        fs::write(&path, torn).await.unwrap();

        let spill = DiskSpillFailover::open(dir.path(), None).await.unwrap();
        assert_eq!(spill.used_bytes().await, torn.len() as u64 + 1);
        let fresh = BatchItem::new("audit", r#"{"after":"crash"}"#);
        spill.deliver(fresh.clone()).await.unwrap();

        assert_eq!(
            spill.read_spilled().await.unwrap(),
            vec![BatchItem::new("logs", "{}"), fresh]
        );
    }
}
