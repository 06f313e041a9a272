// src/monitor/tail.rs

//! Incremental reader for a growing log file.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Remembers how far into the log file we have read.
///
/// Bytes after the last newline are held back until the line is complete,
/// so a line split across two polls is parsed once, whole.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    offset: u64,
    carry: Vec<u8>,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            carry: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read everything appended since the previous call.
    ///
    /// Returns `Ok(None)` when the file has not grown (or does not exist
    /// yet), otherwise the complete lines that became available, which may be
    /// empty if only a partial line was appended.
    pub async fn read_new_lines(&mut self) -> Result<Option<Vec<String>>> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("stat log file {:?}", self.path));
            }
        };

        if len < self.offset {
            debug!(path = ?self.path, "log file shrank; reading from the start");
            self.offset = 0;
            self.carry.clear();
        }
        if len == self.offset {
            return Ok(None);
        }

        let mut file = File::open(&self.path)
            .await
            .with_context(|| format!("opening log file {:?}", self.path))?;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.take(len - self.offset)
            .read_to_end(&mut buf)
            .await
            .with_context(|| format!("reading log file {:?}", self.path))?;
        self.offset += buf.len() as u64;

        self.carry.extend_from_slice(&buf);
        let lines = match self.carry.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => {
                let rest = self.carry.split_off(last_newline + 1);
                let complete = std::mem::replace(&mut self.carry, rest);
                split_lines(&complete)
            }
            None => Vec::new(),
        };

        Ok(Some(lines))
    }

    /// Take the trailing partial line, if any. Used once the writer is gone.
    pub fn flush(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.carry);
        let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
        Some(line)
    }
}

fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}
